//! Encoding and decoding helpers between [`Item`] and the plain-text columns
//! stored in SQLite.
//!
//! Attributes are stored as a compact JSON object. Index projections are
//! stored as nullable column pairs; both halves are present or both are NULL.

use agora_core::{
  item::Item,
  keys::{IndexName, Key},
  store::Mutation,
};
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Shared SELECT list; must match [`RawItem::from_row`].
pub const ITEM_COLUMNS: &str =
  "pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, expires_at, attrs";

/// `(partition column, sort column)` for the primary key or an index.
pub fn key_columns(index: Option<IndexName>) -> (&'static str, &'static str) {
  match index {
    None => ("pk", "sk"),
    Some(IndexName::Gsi1) => ("gsi1pk", "gsi1sk"),
    Some(IndexName::Gsi2) => ("gsi2pk", "gsi2sk"),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `items` row.
pub struct RawItem {
  pub pk:         String,
  pub sk:         String,
  pub gsi1pk:     Option<String>,
  pub gsi1sk:     Option<String>,
  pub gsi2pk:     Option<String>,
  pub gsi2sk:     Option<String>,
  pub expires_at: Option<i64>,
  pub attrs:      String,
}

impl RawItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(RawItem {
      pk:         row.get(0)?,
      sk:         row.get(1)?,
      gsi1pk:     row.get(2)?,
      gsi1sk:     row.get(3)?,
      gsi2pk:     row.get(4)?,
      gsi2sk:     row.get(5)?,
      expires_at: row.get(6)?,
      attrs:      row.get(7)?,
    })
  }

  pub fn into_item(self) -> Result<Item> {
    let attrs = match serde_json::from_str(&self.attrs)? {
      Value::Object(map) => map,
      other => {
        return Err(Error::Core(agora_core::Error::UnexpectedKind {
          expected: "object",
          found:    Some(other.to_string()),
        }));
      }
    };

    Ok(Item {
      key: Key::new(self.pk, self.sk),
      gsi1: decode_projection(self.gsi1pk, self.gsi1sk)?,
      gsi2: decode_projection(self.gsi2pk, self.gsi2sk)?,
      expires_at: self.expires_at,
      attrs,
    })
  }
}

fn decode_projection(pk: Option<String>, sk: Option<String>) -> Result<Option<Key>> {
  match (pk, sk) {
    (Some(pk), Some(sk)) => Ok(Some(Key::new(pk, sk))),
    (None, None) => Ok(None),
    (pk, sk) => Err(Error::CorruptIndex(format!("{pk:?} / {sk:?}"))),
  }
}

/// Owned column values ready to bind into an INSERT.
pub struct EncodedItem {
  pub pk:         String,
  pub sk:         String,
  pub gsi1pk:     Option<String>,
  pub gsi1sk:     Option<String>,
  pub gsi2pk:     Option<String>,
  pub gsi2sk:     Option<String>,
  pub item_type:  Option<String>,
  pub expires_at: Option<i64>,
  pub attrs:      String,
}

impl EncodedItem {
  pub fn encode(item: &Item) -> Result<Self> {
    let (gsi1pk, gsi1sk) = split_projection(item.gsi1.as_ref());
    let (gsi2pk, gsi2sk) = split_projection(item.gsi2.as_ref());
    Ok(EncodedItem {
      pk: item.key.partition.clone(),
      sk: item.key.sort.clone(),
      gsi1pk,
      gsi1sk,
      gsi2pk,
      gsi2sk,
      item_type: item.kind().map(str::to_owned),
      expires_at: item.expires_at,
      attrs: serde_json::to_string(&item.attrs)?,
    })
  }

  /// Insert-or-replace this row. Usable on a connection or a transaction.
  pub fn upsert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute(
      "INSERT OR REPLACE INTO items (
         pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, item_type, expires_at, attrs
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      rusqlite::params![
        self.pk,
        self.sk,
        self.gsi1pk,
        self.gsi1sk,
        self.gsi2pk,
        self.gsi2sk,
        self.item_type,
        self.expires_at,
        self.attrs,
      ],
    )
  }
}

fn split_projection(key: Option<&Key>) -> (Option<String>, Option<String>) {
  match key {
    Some(k) => (Some(k.partition.clone()), Some(k.sort.clone())),
    None => (None, None),
  }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// Apply `mutations` in order to an attribute map.
pub fn apply_mutations(attrs: &mut Map<String, Value>, mutations: &[Mutation]) -> Result<()> {
  for mutation in mutations {
    match mutation {
      Mutation::Set { attr, value } => {
        attrs.insert(attr.clone(), value.clone());
      }
      Mutation::Remove { attr } => {
        attrs.remove(attr);
      }
      Mutation::Increment { attr, by } => {
        let current = match attrs.get(attr) {
          None | Some(Value::Null) => 0,
          Some(v) => v.as_i64().ok_or_else(|| Error::NotAnInteger(attr.clone()))?,
        };
        attrs.insert(attr.clone(), Value::from(current + by));
      }
    }
  }
  Ok(())
}
