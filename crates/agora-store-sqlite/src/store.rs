//! [`SqliteTable`], the SQLite implementation of [`Table`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use agora_core::{
  item::Item,
  keys::Key,
  store::{Mutation, Query, Table},
};

use crate::{
  Error, Result,
  encode::{EncodedItem, ITEM_COLUMNS, RawItem, apply_mutations, key_columns},
  schema::SCHEMA,
};

/// SQL fragment admitting only rows that have not expired as of `?1`.
const LIVE: &str = "(expires_at IS NULL OR expires_at > ?1)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// The shared Agora table backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteTable {
  conn: tokio_rusqlite::Connection,
}

impl SqliteTable {
  /// Open (or create) a table at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let table = Self { conn };
    table.init_schema().await?;
    Ok(table)
  }

  /// Open an in-memory table for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let table = Self { conn };
    table.init_schema().await?;
    Ok(table)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Physically delete every expired row. Returns the number removed.
  ///
  /// Readers already ignore expired rows; this only reclaims space.
  pub async fn purge_expired(&self) -> Result<usize> {
    let now = Utc::now().timestamp();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM items WHERE expires_at IS NOT NULL AND expires_at <= ?1",
          rusqlite::params![now],
        )?)
      })
      .await?;
    if removed > 0 {
      tracing::debug!(removed, "purged expired items");
    }
    Ok(removed)
  }
}

/// Carry a crate error through `tokio_rusqlite`'s closure boundary.
fn smuggle(e: Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

/// Undo [`smuggle`] so callers see the original variant.
fn unsmuggle(e: tokio_rusqlite::Error) -> Error {
  match e {
    tokio_rusqlite::Error::Other(inner) => match inner.downcast::<Error>() {
      Ok(ours) => *ours,
      Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
    },
    e => Error::Database(e),
  }
}

// ─── Table impl ──────────────────────────────────────────────────────────────

impl Table for SqliteTable {
  type Error = Error;

  async fn put_item(&self, item: Item) -> Result<()> {
    let encoded = EncodedItem::encode(&item)?;
    self
      .conn
      .call(move |conn| {
        encoded.upsert(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_item(&self, key: Key) -> Result<Option<Item>> {
    let now = Utc::now().timestamp();
    let raw: Option<RawItem> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE pk = ?2 AND sk = ?3 AND {LIVE}"
              ),
              rusqlite::params![now, key.partition, key.sort],
              RawItem::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawItem::into_item).transpose()
  }

  async fn query<'a>(&'a self, query: &'a Query) -> Result<Vec<Item>> {
    let now = Utc::now().timestamp();
    let (pk_col, sk_col) = key_columns(query.index);
    let direction = if query.descending { "DESC" } else { "ASC" };
    let sql = format!(
      "SELECT {ITEM_COLUMNS} FROM items
       WHERE {pk_col} = ?2
         AND (?3 IS NULL OR substr({sk_col}, 1, length(?3)) = ?3)
         AND {LIVE}
       ORDER BY {sk_col} {direction}
       LIMIT ?4"
    );
    let partition = query.partition.clone();
    let prefix = query.sort_prefix.clone();
    let limit = query
      .limit
      .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

    let raws: Vec<RawItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![now, partition, prefix, limit],
            RawItem::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawItem::into_item).collect()
  }

  async fn update_item(&self, key: Key, mutations: Vec<Mutation>) -> Result<Item> {
    let now = Utc::now().timestamp();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing = tx
          .query_row(
            &format!(
              "SELECT {ITEM_COLUMNS} FROM items WHERE pk = ?2 AND sk = ?3 AND {LIVE}"
            ),
            rusqlite::params![now, key.partition, key.sort],
            RawItem::from_row,
          )
          .optional()?;

        // An expired row is replaced wholesale, keeping none of its state.
        let mut item = match existing {
          Some(raw) => raw.into_item().map_err(smuggle)?,
          None => Item {
            key,
            gsi1: None,
            gsi2: None,
            expires_at: None,
            attrs: Default::default(),
          },
        };
        apply_mutations(&mut item.attrs, &mutations).map_err(smuggle)?;

        EncodedItem::encode(&item).map_err(smuggle)?.upsert(&tx)?;
        tx.commit()?;
        Ok(item)
      })
      .await
      .map_err(unsmuggle)
  }

  async fn delete_item(&self, key: Key) -> Result<bool> {
    let now = Utc::now().timestamp();
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let live = tx
          .query_row(
            &format!("SELECT 1 FROM items WHERE pk = ?2 AND sk = ?3 AND {LIVE}"),
            rusqlite::params![now, key.partition, key.sort],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        tx.execute(
          "DELETE FROM items WHERE pk = ?1 AND sk = ?2",
          rusqlite::params![key.partition, key.sort],
        )?;
        tx.commit()?;
        Ok(live)
      })
      .await?;
    Ok(removed)
  }

  async fn transact_write(&self, items: Vec<Item>) -> Result<()> {
    let encoded = items
      .iter()
      .map(EncodedItem::encode)
      .collect::<Result<Vec<_>>>()?;
    let count = encoded.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &encoded {
          row.upsert(&tx)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::trace!(count, "transaction committed");
    Ok(())
  }
}
