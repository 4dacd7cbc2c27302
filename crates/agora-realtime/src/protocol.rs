//! JSON frames exchanged over a real-time session.
//!
//! Client frames are selected by their `action` field, server frames by
//! `type`.
//!
//! ```json
//! {"action":"sendMessage","communityId":"…","content":"hello"}
//! {"type":"messageAccepted","messageId":"…"}
//! ```

use std::sync::Arc;

use agora_core::message::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Client → server ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
  JoinCommunity { community_id: Uuid },
  LeaveCommunity {},
  SendMessage { community_id: Uuid, content: String },
}

impl ClientFrame {
  /// Parse a text frame. Anything unparseable is a validation error.
  pub fn parse(text: &str) -> Result<Self> {
    serde_json::from_str(text).map_err(|e| Error::validation(e.to_string()))
  }
}

// ─── Server → client ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
  Validation,
  NotFound,
  Unauthorized,
  Conflict,
  Unavailable,
  Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerFrame {
  Ok,
  Forbidden { message: String },
  MessageAccepted { message_id: Uuid },
  /// A chat message pushed to every session joined to its community.
  Message(ChatMessage),
  Error { code: ErrorCode, message: String },
}

impl ServerFrame {
  pub fn encode(&self) -> Result<Arc<str>> {
    serde_json::to_string(self)
      .map(Arc::from)
      .map_err(|e| Error::Fatal(e.to_string()))
  }
}

impl From<&Error> for ServerFrame {
  fn from(err: &Error) -> Self {
    let code = match err {
      Error::Forbidden(message) => {
        return ServerFrame::Forbidden { message: message.clone() };
      }
      Error::Validation(_) => ErrorCode::Validation,
      Error::NotFound(_) => ErrorCode::NotFound,
      Error::Unauthorized => ErrorCode::Unauthorized,
      Error::Conflict(_) => ErrorCode::Conflict,
      Error::Transient(_) => ErrorCode::Unavailable,
      Error::Fatal(_) => ErrorCode::Internal,
    };
    let message = match err {
      // Internal detail stays in the logs.
      Error::Fatal(_) => "internal error".to_owned(),
      other => other.to_string(),
    };
    ServerFrame::Error { code, message }
  }
}
