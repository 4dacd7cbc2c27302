//! The keyspace codec, the single source of truth for key shape.
//!
//! Every logical entity (community, membership, announcement, chat message,
//! connection, profile) shares one physical table. Each function here takes
//! typed fields and returns the item's primary key plus any secondary-index
//! keys it must populate. Writers never assemble key strings themselves.
//!
//! | Entity | Partition | Sort | GSI1 | GSI2 |
//! |---|---|---|---|---|
//! | community | `COMMUNITY:<id>` | `METADATA:<id>` | | |
//! | membership | `COMMUNITY:<id>` | `MEMBER:<user>` | | |
//! | user mirror | `USER:<user>` | `COMMUNITY:<id>` | | |
//! | announcement | `COMMUNITY:<id>` | `ANNOUNCEMENT:<ts>:<id>` | | |
//! | message | `COMMUNITY:<id>` | `MESSAGE:<ts>:<id>` | community | author |
//! | connection | `<connectionId>` | `CONNECTION` | `COMMUNITY:<id>` when joined | |
//! | profile | `USER:<user>` | `PROFILE:<user>` | | |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Prefixes ────────────────────────────────────────────────────────────────

pub const COMMUNITY_PREFIX: &str = "COMMUNITY:";
pub const METADATA_PREFIX: &str = "METADATA:";
pub const MEMBER_PREFIX: &str = "MEMBER:";
pub const USER_PREFIX: &str = "USER:";
pub const PROFILE_PREFIX: &str = "PROFILE:";
pub const ANNOUNCEMENT_PREFIX: &str = "ANNOUNCEMENT:";
pub const MESSAGE_PREFIX: &str = "MESSAGE:";
pub const CONNECTION_PREFIX: &str = "CONNECTION:";

/// Fixed sort component of a connection row.
pub const CONNECTION_SORT: &str = "CONNECTION";

// ─── Key types ───────────────────────────────────────────────────────────────

/// A partition + sort pair. Used both for the primary key and for each
/// secondary-index projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
  pub partition: String,
  pub sort:      String,
}

impl Key {
  pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
    Self { partition: partition.into(), sort: sort.into() }
  }
}

/// The secondary indexes defined over the physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexName {
  /// Community-scoped projection: chat history and joined connections.
  Gsi1,
  /// Author-scoped projection: a user's chat history.
  Gsi2,
}

impl IndexName {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Gsi1 => "GSI1",
      Self::Gsi2 => "GSI2",
    }
  }
}

/// All keys an item must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKeys {
  pub primary: Key,
  pub gsi1:    Option<Key>,
  pub gsi2:    Option<Key>,
}

impl ItemKeys {
  fn primary(primary: Key) -> Self { Self { primary, gsi1: None, gsi2: None } }
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

/// Reject empty (or whitespace-only) user identifiers.
pub fn validate_user_id(user_id: &str) -> Result<&str> {
  let trimmed = user_id.trim();
  if trimmed.is_empty() {
    return Err(Error::EmptyIdentifier("user_id"));
  }
  Ok(trimmed)
}

/// Fixed-width RFC 3339 (microseconds, `Z` suffix) so that lexicographic order
/// of sort keys equals chronological order.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_id(id: Uuid) -> String { id.hyphenated().to_string() }

// ─── Partitions ──────────────────────────────────────────────────────────────

pub fn community_partition(community_id: Uuid) -> String {
  format!("{COMMUNITY_PREFIX}{}", encode_id(community_id))
}

pub fn user_partition(user_id: &str) -> Result<String> {
  Ok(format!("{USER_PREFIX}{}", validate_user_id(user_id)?))
}

pub fn connection_partition(connection_id: Uuid) -> String {
  encode_id(connection_id)
}

// ─── Entities ────────────────────────────────────────────────────────────────

pub fn community(community_id: Uuid) -> ItemKeys {
  ItemKeys::primary(Key::new(
    community_partition(community_id),
    format!("{METADATA_PREFIX}{}", encode_id(community_id)),
  ))
}

pub fn membership(community_id: Uuid, user_id: &str) -> Result<ItemKeys> {
  let user_id = validate_user_id(user_id)?;
  Ok(ItemKeys::primary(Key::new(
    community_partition(community_id),
    format!("{MEMBER_PREFIX}{user_id}"),
  )))
}

/// The `USER:` mirror of a membership, backing "communities of a user".
pub fn user_community(user_id: &str, community_id: Uuid) -> Result<ItemKeys> {
  Ok(ItemKeys::primary(Key::new(
    user_partition(user_id)?,
    community_partition(community_id),
  )))
}

pub fn announcement(
  community_id:    Uuid,
  created_at:      DateTime<Utc>,
  announcement_id: Uuid,
) -> ItemKeys {
  ItemKeys::primary(Key::new(
    community_partition(community_id),
    format!(
      "{ANNOUNCEMENT_PREFIX}{}:{}",
      encode_timestamp(created_at),
      encode_id(announcement_id)
    ),
  ))
}

/// Sort component shared by a message's primary key and both projections;
/// `timestamp:id` gives a total order even when timestamps collide.
pub fn message_sort(timestamp: DateTime<Utc>, message_id: Uuid) -> String {
  format!(
    "{MESSAGE_PREFIX}{}:{}",
    encode_timestamp(timestamp),
    encode_id(message_id)
  )
}

pub fn message(
  community_id: Uuid,
  author_id:    &str,
  timestamp:    DateTime<Utc>,
  message_id:   Uuid,
) -> Result<ItemKeys> {
  let sort = message_sort(timestamp, message_id);
  let community = community_partition(community_id);
  Ok(ItemKeys {
    primary: Key::new(community.clone(), sort.clone()),
    gsi1:    Some(Key::new(community, sort.clone())),
    gsi2:    Some(Key::new(user_partition(author_id)?, sort)),
  })
}

/// A connection row; tagged into GSI1 only while joined to a community.
pub fn connection(connection_id: Uuid, joined: Option<Uuid>) -> ItemKeys {
  ItemKeys {
    primary: Key::new(connection_partition(connection_id), CONNECTION_SORT),
    gsi1:    joined.map(|community_id| {
      Key::new(
        community_partition(community_id),
        format!("{CONNECTION_PREFIX}{}", encode_id(connection_id)),
      )
    }),
    gsi2:    None,
  }
}

pub fn profile(user_id: &str) -> Result<ItemKeys> {
  let user_id = validate_user_id(user_id)?;
  Ok(ItemKeys::primary(Key::new(
    format!("{USER_PREFIX}{user_id}"),
    format!("{PROFILE_PREFIX}{user_id}"),
  )))
}
