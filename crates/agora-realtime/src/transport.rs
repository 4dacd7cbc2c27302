//! The contract between fan-out and whatever holds the live sockets.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use uuid::Uuid;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
  /// The handle no longer refers to a live session. The registry row is stale
  /// and may be pruned.
  #[error("recipient gone")]
  Gone,

  /// The recipient may still be alive; do not prune.
  #[error("transient delivery failure: {0}")]
  Transient(String),
}

/// Pushes an encoded frame to one session.
pub trait Delivery: Send + Sync {
  fn deliver(
    &self,
    connection_id: Uuid,
    payload: Arc<str>,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send + '_;

  /// The server instance this transport serves. Rows opened through it are
  /// stamped with this id, and fan-out only attempts rows it holds. `None`
  /// means every row is reachable.
  fn instance_id(&self) -> Option<Uuid> { None }
}
