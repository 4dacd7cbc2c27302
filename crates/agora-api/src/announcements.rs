//! Handlers for `/communities/{id}/announcements`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/communities/{id}/announcements` | Optional `?as_of=` (RFC 3339) |
//! | `POST` | `/communities/{id}/announcements` | Admins only; returns 201 |
//! | `POST` | `/communities/{id}/announcements/{aid}/reactions` | Body: `{"kind":"like","action":"add"}` |

use std::sync::Arc;

use agora_core::{
  announcement::{Announcement, NewAnnouncement, ReactionAction},
  connection::Identity,
  store::Table,
};
use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Evaluate expiry at this instant instead of now.
  pub as_of: Option<DateTime<Utc>>,
}

/// `GET /communities/{id}/announcements[?as_of=...]`
pub async fn list<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Announcement>>, ApiError> {
  Ok(Json(state.announcements.list(id, &caller, params.as_of).await?))
}

/// `POST /communities/{id}/announcements`
pub async fn create<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewAnnouncement>,
) -> Result<impl IntoResponse, ApiError> {
  let announcement = state.announcements.create(id, &caller, body).await?;
  Ok((StatusCode::CREATED, Json(announcement)))
}

#[derive(Debug, Deserialize)]
pub struct ReactBody {
  pub kind:   String,
  pub action: ReactionAction,
}

/// `POST /communities/{id}/announcements/{aid}/reactions`
pub async fn react<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path((id, announcement_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<ReactBody>,
) -> Result<Json<Announcement>, ApiError> {
  let announcement = state
    .announcements
    .react(id, announcement_id, &caller, &body.kind, body.action)
    .await?;
  Ok(Json(announcement))
}
