//! Typed entity ⇄ physical item conversion.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
  Error, Result,
  item::{Item, TYPE_ATTR},
  keys::ItemKeys,
};

/// A logical entity stored in the shared table.
///
/// Implementors declare their discriminant and derive their keys through
/// [`crate::keys`]; the attribute encoding is the entity's serde form.
pub trait Entity: Serialize + DeserializeOwned {
  /// Value of the `type` attribute; must be unique per entity kind.
  const KIND: &'static str;

  fn keys(&self) -> Result<ItemKeys>;

  /// Absolute expiry in epoch seconds, if the entity is time-limited.
  fn expires_at(&self) -> Option<i64> { None }

  fn to_item(&self) -> Result<Item> {
    let mut item = Item::new(self.keys()?);
    item.expires_at = self.expires_at();
    item.attrs = match serde_json::to_value(self)? {
      Value::Object(map) => map,
      _ => return Err(Error::NotAnObject),
    };
    item
      .attrs
      .insert(TYPE_ATTR.to_owned(), Value::String(Self::KIND.to_owned()));
    Ok(item)
  }

  fn from_item(item: &Item) -> Result<Self> {
    if item.kind() != Some(Self::KIND) {
      return Err(Error::UnexpectedKind {
        expected: Self::KIND,
        found:    item.kind().map(str::to_owned),
      });
    }
    Ok(serde_json::from_value(Value::Object(item.attrs.clone()))?)
  }
}
