//! Real-time sessions and user presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, entity::Entity, keys, keys::ItemKeys};

/// A verified caller, as produced by the external token verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  /// Stable subject identifier issued by the identity provider.
  pub subject: String,
  /// Human-readable name.
  pub name:    String,
}

impl Identity {
  pub fn new(subject: impl Into<String>, name: impl Into<String>) -> Self {
    Self { subject: subject.into(), name: name.into() }
  }
}

/// A registry row. Exists only while the session is open, and never past
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
  pub connection_id: Uuid,
  pub user_id:       String,
  pub username:      String,
  /// The community this session is currently joined to, if any.
  pub community_id:  Option<Uuid>,
  /// The server instance holding the socket, when known. Only that instance
  /// can tell whether the session is still reachable.
  #[serde(default)]
  pub instance_id:   Option<Uuid>,
  pub connected_at:  DateTime<Utc>,
  pub last_seen:     DateTime<Utc>,
  pub expires_at:    DateTime<Utc>,
}

impl Connection {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }

  pub fn identity(&self) -> Identity {
    Identity::new(self.user_id.clone(), self.username.clone())
  }
}

impl Entity for Connection {
  const KIND: &'static str = "connection";

  fn keys(&self) -> Result<ItemKeys> {
    Ok(keys::connection(self.connection_id, self.community_id))
  }

  fn expires_at(&self) -> Option<i64> { Some(self.expires_at.timestamp()) }
}

/// Presence attributes on the user's profile row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub user_id:       String,
  pub connection_id: Option<Uuid>,
  pub last_seen:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_online:     bool,
}

impl Entity for Profile {
  const KIND: &'static str = "profile";

  fn keys(&self) -> Result<ItemKeys> { keys::profile(&self.user_id) }
}
