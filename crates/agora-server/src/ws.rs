//! The WebSocket transport boundary.
//!
//! `GET /ws` verifies the caller before upgrading. Each upgraded socket gets
//! a fresh connection id, an outbound channel in the [`Hub`], and a registry
//! row; a writer task drains the channel into the socket while the read loop
//! feeds text frames through the [`Gateway`](agora_realtime::gateway::Gateway).

use agora_core::{connection::Identity, store::Table};
use agora_realtime::protocol::ServerFrame;
use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
  },
  http::{HeaderMap, Uri},
  response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::{AppState, auth::authenticate};

/// `GET /ws[?token=...]`
pub async fn upgrade<T: Table + 'static>(
  State(state): State<AppState<T>>,
  headers: HeaderMap,
  uri: Uri,
  ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
  // No registry row exists until the token has been accepted.
  let identity = match authenticate(state.verifier.as_ref(), &headers, &uri) {
    Ok(identity) => identity,
    Err(e) => return e.into_response(),
  };
  match ws {
    Ok(ws) => ws.on_upgrade(move |socket| session(state, identity, socket)),
    Err(rejection) => rejection.into_response(),
  }
}

async fn session<T: Table + 'static>(state: AppState<T>, identity: Identity, socket: WebSocket) {
  let connection_id = Uuid::new_v4();

  // The hub entry must exist before the registry row, or a concurrent
  // broadcast would find the row, fail to deliver, and prune it.
  let (reply, mut outbound) = state.hub.register(connection_id);
  if let Err(e) = state.gateway.open(connection_id, &identity).await {
    tracing::error!(%connection_id, error = %e, "failed to register session");
    state.hub.remove(connection_id);
    return;
  }
  tracing::info!(%connection_id, user = %identity.subject, "session opened");

  let (mut sink, mut stream) = socket.split();

  let writer = tokio::spawn(async move {
    while let Some(payload) = outbound.recv().await {
      if sink.send(Message::Text(payload.to_string().into())).await.is_err() {
        break;
      }
    }
  });

  while let Some(msg) = stream.next().await {
    let frame = match msg {
      Ok(Message::Text(text)) => state.gateway.handle(connection_id, text.as_str()).await,
      Ok(Message::Binary(_)) => ServerFrame::from(&agora_realtime::Error::validation(
        "binary frames are not supported",
      )),
      Ok(Message::Close(_)) => break,
      Ok(_) => continue,
      Err(e) => {
        tracing::debug!(%connection_id, error = %e, "socket read failed");
        break;
      }
    };
    match frame.encode() {
      Ok(payload) => {
        if reply.send(payload).await.is_err() {
          break;
        }
      }
      Err(e) => tracing::error!(%connection_id, error = %e, "failed to encode reply"),
    }
  }

  // Row first, handle second: while the row exists the handle stays
  // reachable, so no broadcast can prune it out from under the close.
  match state.gateway.close(connection_id).await {
    Ok(_) => tracing::info!(%connection_id, "session closed"),
    Err(e) => tracing::warn!(%connection_id, error = %e, "failed to close session"),
  }
  state.hub.remove(connection_id);
  writer.abort();
}
