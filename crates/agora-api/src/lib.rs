//! JSON REST API for Agora.
//!
//! Exposes an axum [`Router`] backed by any [`agora_core::store::Table`].
//! Every handler expects the caller's verified
//! [`agora_core::connection::Identity`] in the request extensions; inserting
//! it is the mounting server's job.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", agora_api::api_router(table.clone()).layer(auth_layer))
//! ```

pub mod announcements;
pub mod communities;
pub mod error;
pub mod messages;

use std::sync::Arc;

use agora_core::store::Table;
use agora_realtime::{announcements::AnnouncementStore, directory::Directory};
use axum::{
  Router,
  routing::{get, post},
};

pub use error::ApiError;

/// Services shared by every handler.
pub struct ApiState<T> {
  pub directory:     Directory<T>,
  pub announcements: AnnouncementStore<T>,
}

impl<T: Table> ApiState<T> {
  pub fn new(table: Arc<T>) -> Self {
    Self {
      directory:     Directory::new(Arc::clone(&table)),
      announcements: AnnouncementStore::new(table),
    }
  }
}

/// Build a fully-materialised API router for `table`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<T>(table: Arc<T>) -> Router<()>
where
  T: Table + 'static,
{
  let state = Arc::new(ApiState::new(table));
  Router::new()
    // Communities
    .route(
      "/communities",
      get(communities::list_mine::<T>).post(communities::create::<T>),
    )
    .route("/communities/{id}", get(communities::get_one::<T>))
    .route("/communities/{id}/join", post(communities::join::<T>))
    .route("/communities/{id}/leave", post(communities::leave::<T>))
    .route("/communities/{id}/members", get(communities::members::<T>))
    .route(
      "/communities/{id}/members/{user_id}/approve",
      post(communities::approve::<T>),
    )
    // Announcements
    .route(
      "/communities/{id}/announcements",
      get(announcements::list::<T>).post(announcements::create::<T>),
    )
    .route(
      "/communities/{id}/announcements/{announcement_id}/reactions",
      post(announcements::react::<T>),
    )
    // Messages
    .route("/communities/{id}/messages", get(messages::history::<T>))
    .route("/me/messages", get(messages::mine::<T>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
