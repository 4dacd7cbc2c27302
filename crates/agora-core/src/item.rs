//! The physical item: one row of the shared table.
//!
//! An item is a primary key, up to two secondary-index projections, an
//! optional absolute expiry, and a bag of JSON attributes. Typed entities are
//! converted to and from items through [`crate::entity::Entity`].

use serde_json::{Map, Value};

use crate::keys::{IndexName, ItemKeys, Key};

/// Attribute holding the entity discriminant.
pub const TYPE_ATTR: &str = "type";

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
  pub key:        Key,
  pub gsi1:       Option<Key>,
  pub gsi2:       Option<Key>,
  /// Absolute expiry in epoch seconds. Readers treat the item as absent once
  /// `now >= expires_at`, whether or not it has been purged.
  pub expires_at: Option<i64>,
  pub attrs:      Map<String, Value>,
}

impl Item {
  /// An empty item carrying the given keys.
  pub fn new(keys: ItemKeys) -> Self {
    Self {
      key:        keys.primary,
      gsi1:       keys.gsi1,
      gsi2:       keys.gsi2,
      expires_at: None,
      attrs:      Map::new(),
    }
  }

  /// The entity discriminant, if present.
  pub fn kind(&self) -> Option<&str> {
    self.attrs.get(TYPE_ATTR).and_then(Value::as_str)
  }

  pub fn index_key(&self, index: IndexName) -> Option<&Key> {
    match index {
      IndexName::Gsi1 => self.gsi1.as_ref(),
      IndexName::Gsi2 => self.gsi2.as_ref(),
    }
  }

  pub fn is_expired_at(&self, now_secs: i64) -> bool {
    self.expires_at.is_some_and(|exp| exp <= now_secs)
  }
}
