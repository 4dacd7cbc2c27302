//! Handlers for chat history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/communities/{id}/messages` | `?limit=` (default 50, max 200); active members only |
//! | `GET`  | `/me/messages` | Messages written by the caller |

use std::sync::Arc;

use agora_core::{connection::Identity, message::ChatMessage, store::Table};
use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  ApiState,
  error::{ApiError, Result},
};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<usize>,
}

impl HistoryParams {
  fn limit(&self) -> Result<usize> {
    match self.limit {
      None => Ok(DEFAULT_LIMIT),
      Some(0) => Err(ApiError::BadRequest("`limit` must be positive".into())),
      Some(n) => Ok(n.min(MAX_LIMIT)),
    }
  }
}

/// `GET /communities/{id}/messages[?limit=N]`
pub async fn history<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatMessage>>> {
  let limit = params.limit()?;
  Ok(Json(state.directory.history(id, &caller, limit).await?))
}

/// `GET /me/messages[?limit=N]`
pub async fn mine<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatMessage>>> {
  let limit = params.limit()?;
  Ok(Json(state.directory.messages_by(&caller.subject, limit).await?))
}
