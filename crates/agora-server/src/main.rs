//! agora-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `AGORA_*` environment variables, opens the SQLite table, and serves the
//! WebSocket and REST endpoints until interrupted.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use agora_server::{AppState, ServerConfig, auth::JwtVerifier};
use agora_store_sqlite::SqliteTable;
use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Agora community messaging server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("AGORA"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let table = Arc::new(
    SqliteTable::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  let verifier = Arc::new(JwtVerifier::new(
    &server_cfg.jwt_secret,
    server_cfg.jwt_issuer.as_deref(),
    server_cfg.jwt_audience.as_deref(),
  ));

  spawn_purge(Arc::clone(&table), server_cfg.purge_interval());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState::new(table, verifier, server_cfg);
  let app = agora_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

/// Physically remove expired rows on a fixed interval. Reads already treat
/// them as absent; this only reclaims space.
fn spawn_purge(table: Arc<SqliteTable>, every: std::time::Duration) {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    loop {
      ticker.tick().await;
      match table.purge_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(removed = n, "purged expired items"),
        Err(e) => tracing::warn!(error = %e, "purge failed"),
      }
    }
  });
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
