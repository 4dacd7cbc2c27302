//! Handlers for `/communities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/communities` | Communities of the caller |
//! | `POST` | `/communities` | Body: [`NewCommunity`]; returns 201 |
//! | `GET`  | `/communities/{id}` | 404 if not found |
//! | `POST` | `/communities/{id}/join` | Active or pending by join policy |
//! | `POST` | `/communities/{id}/leave` | 204 |
//! | `GET`  | `/communities/{id}/members` | Active members only |
//! | `POST` | `/communities/{id}/members/{user_id}/approve` | Admins only |

use std::sync::Arc;

use agora_core::{
  community::{Community, Membership, NewCommunity, UserCommunity},
  connection::Identity,
  store::Table,
};
use axum::{
  Extension, Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Communities ─────────────────────────────────────────────────────────────

/// `GET /communities`
pub async fn list_mine<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
) -> Result<Json<Vec<UserCommunity>>, ApiError> {
  Ok(Json(state.directory.communities_of(&caller.subject).await?))
}

/// `POST /communities`
pub async fn create<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Json(body): Json<NewCommunity>,
) -> Result<impl IntoResponse, ApiError> {
  let community = state.directory.create(&caller, body).await?;
  Ok((StatusCode::CREATED, Json(community)))
}

/// `GET /communities/{id}`
pub async fn get_one<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Community>, ApiError> {
  Ok(Json(state.directory.get(id).await?))
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// `POST /communities/{id}/join`
pub async fn join<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let membership = state.directory.join(id, &caller).await?;
  Ok((StatusCode::CREATED, Json(membership)))
}

/// `POST /communities/{id}/leave`
pub async fn leave<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state.directory.leave(id, &caller).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /communities/{id}/members`
pub async fn members<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Membership>>, ApiError> {
  Ok(Json(state.directory.members(id, &caller).await?))
}

/// `POST /communities/{id}/members/{user_id}/approve`
pub async fn approve<T: Table>(
  State(state): State<Arc<ApiState<T>>>,
  Extension(caller): Extension<Identity>,
  Path((id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<Membership>, ApiError> {
  Ok(Json(state.directory.approve(id, &caller, &user_id).await?))
}
