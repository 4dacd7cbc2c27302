//! Error type for `agora-store-sqlite`.

use agora_core::store::StoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] agora_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("attribute `{0}` is not an integer")]
  NotAnInteger(String),

  #[error("unknown index column set: {0}")]
  CorruptIndex(String),
}

impl StoreError for Error {
  fn is_transient(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(
        e.code,
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
      ),
      Error::Database(tokio_rusqlite::Error::Other(inner)) => inner
        .downcast_ref::<Error>()
        .is_some_and(StoreError::is_transient),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
