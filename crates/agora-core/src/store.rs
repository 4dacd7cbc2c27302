//! The `Table` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `agora-store-sqlite`).
//! Higher layers (`agora-realtime`, `agora-api`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use serde_json::Value;

use crate::{
  item::Item,
  keys::{IndexName, Key},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Backend errors must say whether retrying could succeed.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` for contention or temporary unavailability; `false` for anything
  /// a retry cannot fix.
  fn is_transient(&self) -> bool;
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`Table::query`].
#[derive(Debug, Clone)]
pub struct Query {
  /// Query a secondary index instead of the primary key.
  pub index:       Option<IndexName>,
  /// Exact match on the partition component.
  pub partition:   String,
  /// "Begins-with" match on the sort component.
  pub sort_prefix: Option<String>,
  /// Return items in descending sort-key order.
  pub descending:  bool,
  pub limit:       Option<usize>,
}

impl Query {
  pub fn partition(partition: impl Into<String>) -> Self {
    Self {
      index:       None,
      partition:   partition.into(),
      sort_prefix: None,
      descending:  false,
      limit:       None,
    }
  }

  pub fn on(mut self, index: IndexName) -> Self {
    self.index = Some(index);
    self
  }

  pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
    self.sort_prefix = Some(prefix.into());
    self
  }

  pub fn descending(mut self) -> Self {
    self.descending = true;
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// A single attribute change applied by [`Table::update_item`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Set { attr: String, value: Value },
  Remove { attr: String },
  /// Add `by` to an integer attribute, treating an absent attribute as zero.
  Increment { attr: String, by: i64 },
}

impl Mutation {
  pub fn set(attr: &str, value: impl Into<Value>) -> Self {
    Self::Set { attr: attr.to_owned(), value: value.into() }
  }

  pub fn remove(attr: &str) -> Self { Self::Remove { attr: attr.to_owned() } }

  pub fn increment(attr: &str, by: i64) -> Self {
    Self::Increment { attr: attr.to_owned(), by }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the single physical key-value table.
///
/// Every read treats an item whose `expires_at` has passed as absent, whether
/// or not it has been physically purged.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait Table: Send + Sync {
  type Error: StoreError;

  /// Insert or wholly overwrite the item at `item.key`.
  fn put_item(
    &self,
    item: Item,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Point lookup. An absent (or expired) item is `None`, not an error.
  fn get_item(
    &self,
    key: Key,
  ) -> impl Future<Output = Result<Option<Item>, Self::Error>> + Send + '_;

  /// Items in one partition of the primary key or of a secondary index,
  /// ordered by sort component.
  fn query<'a>(
    &'a self,
    query: &'a Query,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + 'a;

  /// Apply `mutations` atomically to a single item and return it as written.
  /// An absent item is created from `key` first (upsert).
  fn update_item(
    &self,
    key: Key,
    mutations: Vec<Mutation>,
  ) -> impl Future<Output = Result<Item, Self::Error>> + Send + '_;

  /// Remove the item at `key`. Returns whether a live item was removed;
  /// deleting an absent item is not an error.
  fn delete_item(
    &self,
    key: Key,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Put every item or none of them.
  fn transact_write(
    &self,
    items: Vec<Item>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
