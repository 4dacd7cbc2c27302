//! Error types for `agora-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("identifier `{0}` must not be empty")]
  EmptyIdentifier(&'static str),

  #[error("expected a `{expected}` item, found {found:?}")]
  UnexpectedKind {
    expected: &'static str,
    found:    Option<String>,
  },

  #[error("entity did not serialise to a JSON object")]
  NotAnObject,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
