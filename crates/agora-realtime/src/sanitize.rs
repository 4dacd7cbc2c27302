//! Input bounds and markup escaping for user-authored text.

use crate::{Error, Result};

/// Longest chat message accepted, in characters.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1000;

/// Longest announcement accepted, in characters.
pub const MAX_ANNOUNCEMENT_CHARS: usize = 2000;

/// Check that `content` is present and at most `max_chars` characters, then
/// return its escaped form. The bound applies to the text as submitted.
pub fn bounded_content(field: &str, content: &str, max_chars: usize) -> Result<String> {
  if content.trim().is_empty() {
    return Err(Error::validation(format!("`{field}` is required")));
  }
  let len = content.chars().count();
  if len > max_chars {
    return Err(Error::validation(format!(
      "`{field}` is {len} characters; the limit is {max_chars}"
    )));
  }
  Ok(escape_markup(content))
}

/// Replace the five HTML-significant characters with entities.
pub fn escape_markup(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  for c in input.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#x27;"),
      c => out.push(c),
    }
  }
  out
}
