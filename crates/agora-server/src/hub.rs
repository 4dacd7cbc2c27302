//! In-process delivery hub: one bounded outbound channel per open socket.
//!
//! The hub is this process's transport handle table. The registry in the
//! shared table says *who* is joined where; the hub says which of those
//! sessions this process can actually write to. Each hub has its own
//! instance id, stamped on the rows it opens, so fan-out never judges a
//! session held by another instance.

use std::sync::Arc;

use agora_realtime::transport::{Delivery, DeliveryError};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Frames buffered per session before deliveries start failing.
pub const OUTBOUND_BUFFER: usize = 64;

pub type Outbound = mpsc::Sender<Arc<str>>;

pub struct Hub {
  instance_id: Uuid,
  sessions:    DashMap<Uuid, Outbound>,
}

impl Default for Hub {
  fn default() -> Self { Self::new() }
}

impl Hub {
  pub fn new() -> Self { Self { instance_id: Uuid::new_v4(), sessions: DashMap::new() } }

  /// Create the outbound channel for a session. The returned sender is for
  /// the session's own replies; the receiver feeds its socket writer.
  pub fn register(&self, connection_id: Uuid) -> (Outbound, mpsc::Receiver<Arc<str>>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    self.sessions.insert(connection_id, tx.clone());
    (tx, rx)
  }

  pub fn remove(&self, connection_id: Uuid) { self.sessions.remove(&connection_id); }

  pub fn len(&self) -> usize { self.sessions.len() }

  pub fn is_empty(&self) -> bool { self.sessions.is_empty() }
}

impl Delivery for Hub {
  async fn deliver(&self, connection_id: Uuid, payload: Arc<str>) -> Result<(), DeliveryError> {
    let Some(tx) = self.sessions.get(&connection_id).map(|e| e.value().clone()) else {
      return Err(DeliveryError::Gone);
    };
    match tx.try_send(payload) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => {
        Err(DeliveryError::Transient("outbound buffer full".into()))
      }
      Err(TrySendError::Closed(_)) => {
        self.sessions.remove(&connection_id);
        Err(DeliveryError::Gone)
      }
    }
  }

  fn instance_id(&self) -> Option<Uuid> { Some(self.instance_id) }
}
