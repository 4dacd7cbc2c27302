//! Fakes shared by the unit tests in this crate.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use agora_core::{
  community::{JoinPolicy, NewCommunity},
  connection::Identity,
  item::Item,
  keys::Key,
  store::{Mutation, Query, StoreError, Table},
};
use agora_store_sqlite::SqliteTable;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
  directory::Directory,
  fanout::FanoutConfig,
  gateway::Gateway,
  registry::DEFAULT_CONNECTION_TTL_SECS,
  transport::{Delivery, DeliveryError},
};

pub async fn sqlite() -> Arc<SqliteTable> {
  Arc::new(SqliteTable::open_in_memory().await.expect("in-memory table"))
}

pub fn user(id: &str) -> Identity { Identity::new(id, id.to_uppercase()) }

pub fn open_community(name: &str) -> NewCommunity {
  NewCommunity { name: name.into(), join_policy: JoinPolicy::Open, ..Default::default() }
}

// ─── Delivery fake ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum Script {
  Gone,
  Transient,
  /// Never completes within any reasonable timeout.
  Stall,
  /// Signals [`Recorder::in_flight`], waits for [`Recorder::release`], then
  /// reports the handle gone.
  GoneOnRelease,
}

/// Records every successful delivery; recipients can be scripted to fail.
#[derive(Default)]
pub struct Recorder {
  inbox:     Mutex<Vec<(Uuid, Value)>>,
  scripts:   Mutex<HashMap<Uuid, Script>>,
  in_flight: Notify,
  release:   Notify,
}

impl Recorder {
  pub fn script(&self, connection_id: Uuid, script: Script) {
    self.scripts.lock().unwrap().insert(connection_id, script);
  }

  pub fn received(&self, connection_id: Uuid) -> Vec<Value> {
    self
      .inbox
      .lock()
      .unwrap()
      .iter()
      .filter(|(id, _)| *id == connection_id)
      .map(|(_, frame)| frame.clone())
      .collect()
  }

  pub fn total(&self) -> usize { self.inbox.lock().unwrap().len() }

  /// Resolves once a `GoneOnRelease` delivery has started.
  pub async fn in_flight(&self) { self.in_flight.notified().await }

  pub fn release(&self) { self.release.notify_one() }
}

impl Delivery for Recorder {
  async fn deliver(&self, connection_id: Uuid, payload: Arc<str>) -> Result<(), DeliveryError> {
    let script = self.scripts.lock().unwrap().get(&connection_id).copied();
    match script {
      Some(Script::Gone) => Err(DeliveryError::Gone),
      Some(Script::Transient) => Err(DeliveryError::Transient("buffer full".into())),
      Some(Script::Stall) => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
      }
      Some(Script::GoneOnRelease) => {
        self.in_flight.notify_one();
        self.release.notified().await;
        Err(DeliveryError::Gone)
      }
      None => {
        let frame = serde_json::from_str(&payload).expect("frames are JSON");
        self.inbox.lock().unwrap().push((connection_id, frame));
        Ok(())
      }
    }
  }
}

// ─── Table fake ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FlakyError {
  #[error("injected busy failure")]
  Busy,
  #[error(transparent)]
  Inner(#[from] agora_store_sqlite::Error),
}

impl StoreError for FlakyError {
  fn is_transient(&self) -> bool {
    match self {
      FlakyError::Busy => true,
      FlakyError::Inner(e) => e.is_transient(),
    }
  }
}

/// Wraps a real table and injects transient failures on demand.
pub struct Flaky {
  inner:         SqliteTable,
  read_failures: AtomicUsize,
  fail_writes:   AtomicBool,
  pub reads:     AtomicUsize,
}

impl Flaky {
  pub async fn new() -> Self {
    Self {
      inner:         SqliteTable::open_in_memory().await.expect("in-memory table"),
      read_failures: AtomicUsize::new(0),
      fail_writes:   AtomicBool::new(false),
      reads:         AtomicUsize::new(0),
    }
  }

  /// Fail the next `n` reads.
  pub fn fail_reads(&self, n: usize) { self.read_failures.store(n, Ordering::SeqCst); }

  pub fn fail_writes(&self, on: bool) { self.fail_writes.store(on, Ordering::SeqCst); }

  fn read_gate(&self) -> Result<(), FlakyError> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    let injected = self
      .read_failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected { Err(FlakyError::Busy) } else { Ok(()) }
  }

  fn write_gate(&self) -> Result<(), FlakyError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      Err(FlakyError::Busy)
    } else {
      Ok(())
    }
  }
}

impl Table for Flaky {
  type Error = FlakyError;

  async fn put_item(&self, item: Item) -> Result<(), FlakyError> {
    self.write_gate()?;
    Ok(self.inner.put_item(item).await?)
  }

  async fn get_item(&self, key: Key) -> Result<Option<Item>, FlakyError> {
    self.read_gate()?;
    Ok(self.inner.get_item(key).await?)
  }

  async fn query<'a>(&'a self, query: &'a Query) -> Result<Vec<Item>, FlakyError> {
    self.read_gate()?;
    Ok(self.inner.query(query).await?)
  }

  async fn update_item(&self, key: Key, mutations: Vec<Mutation>) -> Result<Item, FlakyError> {
    self.write_gate()?;
    Ok(self.inner.update_item(key, mutations).await?)
  }

  async fn delete_item(&self, key: Key) -> Result<bool, FlakyError> {
    self.write_gate()?;
    Ok(self.inner.delete_item(key).await?)
  }

  async fn transact_write(&self, items: Vec<Item>) -> Result<(), FlakyError> {
    self.write_gate()?;
    Ok(self.inner.transact_write(items).await?)
  }
}

// ─── A small world ───────────────────────────────────────────────────────────

pub struct World<T> {
  pub table:     Arc<T>,
  pub recorder:  Arc<Recorder>,
  pub directory: Directory<T>,
  pub gateway:   Gateway<T, Recorder>,
}

impl<T: Table> World<T> {
  pub fn new(table: Arc<T>, config: FanoutConfig) -> Self {
    let recorder = Arc::new(Recorder::default());
    Self {
      directory: Directory::new(Arc::clone(&table)),
      gateway: Gateway::new(
        Arc::clone(&table),
        Arc::clone(&recorder),
        chrono::Duration::seconds(DEFAULT_CONNECTION_TTL_SECS),
        config,
      ),
      table,
      recorder,
    }
  }

  /// Open a session for `identity` and join it to `community_id`.
  pub async fn joined_session(&self, identity: &Identity, community_id: Uuid) -> Uuid {
    let connection = self.gateway.open(Uuid::new_v4(), identity).await.unwrap();
    self
      .gateway
      .registry()
      .join(connection.connection_id, community_id)
      .await
      .unwrap();
    connection.connection_id
  }
}

pub async fn world() -> World<SqliteTable> {
  World::new(sqlite().await, FanoutConfig::default())
}
