//! Error type for `agora-realtime`.
//!
//! Storage failures are folded into [`Error::Transient`] or [`Error::Fatal`]
//! through [`StoreError::is_transient`]; everything else is a typed outcome
//! the caller is expected to handle.

use std::future::Future;

use agora_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing input. Raised before any storage access.
  #[error("invalid request: {0}")]
  Validation(String),

  /// Credential missing or rejected.
  #[error("unauthorized")]
  Unauthorized,

  /// Authenticated, but not allowed to act on the target.
  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("{0} not found")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Storage or transport temporarily unavailable; the caller may retry.
  #[error("temporarily unavailable: {0}")]
  Transient(String),

  #[error("internal error: {0}")]
  Fatal(String),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

  pub fn forbidden(msg: impl Into<String>) -> Self { Self::Forbidden(msg.into()) }

  pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }

  pub fn conflict(msg: impl Into<String>) -> Self { Self::Conflict(msg.into()) }

  /// Classify a backend failure.
  pub fn store<E: StoreError>(err: E) -> Self {
    if err.is_transient() {
      Self::Transient(err.to_string())
    } else {
      tracing::error!(error = %err, "storage failure");
      Self::Fatal(err.to_string())
    }
  }
}

impl From<agora_core::Error> for Error {
  fn from(err: agora_core::Error) -> Self {
    match err {
      agora_core::Error::EmptyIdentifier(field) => {
        Self::Validation(format!("`{field}` must not be empty"))
      }
      other => Self::Fatal(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Run an idempotent read, retrying once immediately on a transient failure.
pub(crate) async fn read<T, E, F, Fut>(mut op: F) -> Result<T>
where
  E: StoreError,
  F: FnMut() -> Fut,
  Fut: Future<Output = std::result::Result<T, E>>,
{
  match op().await {
    Ok(value) => Ok(value),
    Err(err) if err.is_transient() => {
      tracing::debug!(error = %err, "transient read failure, retrying once");
      op().await.map_err(Error::store)
    }
    Err(err) => Err(Error::store(err)),
  }
}
