//! Agora server: configuration, authentication and the WebSocket transport
//! around the real-time core.
//!
//! Exposes an axum [`Router`] serving `/health`, the `/ws` session endpoint
//! and the REST API under `/api`, all backed by any [`Table`].

pub mod auth;
pub mod error;
pub mod hub;
pub mod ws;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use agora_api::api_router;
use agora_core::store::Table;
use agora_realtime::{
  fanout::FanoutConfig,
  gateway::Gateway,
  registry::DEFAULT_CONNECTION_TTL_SECS,
  sanitize::DEFAULT_MAX_MESSAGE_CHARS,
};
use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{TokenVerifier, require_identity};
use hub::Hub;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `AGORA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  pub jwt_secret:          String,
  #[serde(default)]
  pub jwt_issuer:          Option<String>,
  #[serde(default)]
  pub jwt_audience:        Option<String>,
  #[serde(default = "default_max_message_chars")]
  pub max_message_chars:   usize,
  #[serde(default = "default_delivery_timeout_ms")]
  pub delivery_timeout_ms: u64,
  #[serde(default = "default_connection_ttl_secs")]
  pub connection_ttl_secs: i64,
  #[serde(default = "default_purge_interval_secs")]
  pub purge_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("agora.db") }
fn default_max_message_chars() -> usize { DEFAULT_MAX_MESSAGE_CHARS }
fn default_delivery_timeout_ms() -> u64 { 2000 }
fn default_connection_ttl_secs() -> i64 { DEFAULT_CONNECTION_TTL_SECS }
fn default_purge_interval_secs() -> u64 { 300 }

impl ServerConfig {
  pub fn fanout(&self) -> FanoutConfig {
    FanoutConfig {
      max_message_chars: self.max_message_chars,
      delivery_timeout:  Duration::from_millis(self.delivery_timeout_ms),
    }
  }

  pub fn connection_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.connection_ttl_secs)
  }

  pub fn purge_interval(&self) -> Duration { Duration::from_secs(self.purge_interval_secs.max(1)) }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the transport handlers.
pub struct AppState<T> {
  pub table:    Arc<T>,
  pub gateway:  Arc<Gateway<T, Hub>>,
  pub hub:      Arc<Hub>,
  pub verifier: Arc<dyn TokenVerifier>,
  pub config:   Arc<ServerConfig>,
}

impl<T> Clone for AppState<T> {
  fn clone(&self) -> Self {
    Self {
      table:    Arc::clone(&self.table),
      gateway:  Arc::clone(&self.gateway),
      hub:      Arc::clone(&self.hub),
      verifier: Arc::clone(&self.verifier),
      config:   Arc::clone(&self.config),
    }
  }
}

impl<T: Table> AppState<T> {
  pub fn new(table: Arc<T>, verifier: Arc<dyn TokenVerifier>, config: ServerConfig) -> Self {
    let hub = Arc::new(Hub::new());
    let gateway = Gateway::new(
      Arc::clone(&table),
      Arc::clone(&hub),
      config.connection_ttl(),
      config.fanout(),
    );
    Self {
      table,
      gateway: Arc::new(gateway),
      hub,
      verifier,
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the server's axum [`Router`].
pub fn router<T>(state: AppState<T>) -> Router
where
  T: Table + 'static,
{
  let api = api_router(Arc::clone(&state.table)).layer(middleware::from_fn_with_state(
    Arc::clone(&state.verifier),
    require_identity,
  ));

  Router::new()
    .route("/health", get(health))
    .route("/ws",     get(ws::upgrade::<T>))
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }
