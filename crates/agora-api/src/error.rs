//! API error type and [`axum::response::IntoResponse`] implementation.

use agora_realtime::Error;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Realtime(#[from] Error),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Realtime(e) => match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ApiError::Realtime(Error::Fatal(_)) => "internal error".to_owned(),
      other => other.to_string(),
    };
    if status.is_server_error() {
      tracing::warn!(error = %self, %status, "request failed");
    }
    (status, Json(json!({ "error": message }))).into_response()
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
