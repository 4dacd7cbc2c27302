//! Chat messages. Immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, entity::Entity, keys, keys::ItemKeys};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
  pub message_id:   Uuid,
  pub community_id: Uuid,
  pub author_id:    String,
  pub author_name:  String,
  /// Markup-escaped content.
  pub content:      String,
  pub timestamp:    DateTime<Utc>,
}

impl Entity for ChatMessage {
  const KIND: &'static str = "message";

  fn keys(&self) -> Result<ItemKeys> {
    keys::message(
      self.community_id,
      &self.author_id,
      self.timestamp,
      self.message_id,
    )
  }
}
