//! Session-level dispatch: turns client frames into registry and fan-out
//! calls, and every outcome into exactly one reply frame.

use std::sync::Arc;

use agora_core::{
  connection::{Connection, Identity},
  store::Table,
};
use uuid::Uuid;

use crate::{
  Result,
  fanout::{FanoutConfig, MessageFanout},
  protocol::{ClientFrame, ServerFrame},
  registry::ConnectionRegistry,
  transport::Delivery,
};

pub struct Gateway<T, D> {
  registry: ConnectionRegistry<T>,
  fanout:   MessageFanout<T, D>,
}

impl<T: Table, D: Delivery> Gateway<T, D> {
  pub fn new(
    table: Arc<T>,
    delivery: Arc<D>,
    connection_ttl: chrono::Duration,
    config: FanoutConfig,
  ) -> Self {
    let registry = ConnectionRegistry::new(Arc::clone(&table), connection_ttl)
      .with_instance(delivery.instance_id());
    let fanout = MessageFanout::new(table, registry.clone(), delivery, config);
    Self { registry, fanout }
  }

  pub fn registry(&self) -> &ConnectionRegistry<T> { &self.registry }

  pub fn fanout(&self) -> &MessageFanout<T, D> { &self.fanout }

  /// Register a session for a verified identity. The transport must be
  /// able to reach `connection_id` before this is called.
  pub async fn open(&self, connection_id: Uuid, identity: &Identity) -> Result<Connection> {
    self.registry.open(connection_id, identity).await
  }

  /// Handle one inbound text frame. Never fails: errors become frames.
  pub async fn handle(&self, connection_id: Uuid, text: &str) -> ServerFrame {
    match self.dispatch(connection_id, text).await {
      Ok(frame) => frame,
      Err(err) => {
        tracing::debug!(%connection_id, error = %err, "frame rejected");
        ServerFrame::from(&err)
      }
    }
  }

  async fn dispatch(&self, connection_id: Uuid, text: &str) -> Result<ServerFrame> {
    match ClientFrame::parse(text)? {
      ClientFrame::JoinCommunity { community_id } => {
        self.registry.join(connection_id, community_id).await?;
        Ok(ServerFrame::Ok)
      }
      ClientFrame::LeaveCommunity {} => {
        self.registry.leave(connection_id).await?;
        Ok(ServerFrame::Ok)
      }
      ClientFrame::SendMessage { community_id, content } => {
        let report = self
          .fanout
          .send_from(connection_id, community_id, &content)
          .await?;
        Ok(ServerFrame::MessageAccepted { message_id: report.message_id() })
      }
    }
  }

  /// Tear down a session. Safe to call more than once.
  pub async fn close(&self, connection_id: Uuid) -> Result<bool> {
    self.registry.close(connection_id).await
  }
}
