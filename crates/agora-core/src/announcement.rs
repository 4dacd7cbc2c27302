//! Announcements: community-scoped, time-limited notices with reactions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, entity::Entity, keys, keys::ItemKeys};

/// Announcements expire this many days after creation.
pub const ANNOUNCEMENT_TTL_DAYS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementKind {
  #[default]
  Text,
  Image,
  Video,
}

// ─── Reactions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
  Add,
  Remove,
}

/// Reaction kind → set of user ids. A kind with no users is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, BTreeSet<String>>);

impl Reactions {
  /// Add or remove `user_id` under `kind`. Returns whether the map changed.
  pub fn apply(&mut self, kind: &str, user_id: &str, action: ReactionAction) -> bool {
    match action {
      ReactionAction::Add => self
        .0
        .entry(kind.to_owned())
        .or_default()
        .insert(user_id.to_owned()),
      ReactionAction::Remove => {
        let Some(users) = self.0.get_mut(kind) else {
          return false;
        };
        let removed = users.remove(user_id);
        if users.is_empty() {
          self.0.remove(kind);
        }
        removed
      }
    }
  }

  pub fn users(&self, kind: &str) -> Option<&BTreeSet<String>> { self.0.get(kind) }

  pub fn count(&self, kind: &str) -> usize { self.0.get(kind).map_or(0, BTreeSet::len) }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

// ─── Announcement ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
  pub announcement_id: Uuid,
  pub community_id:    Uuid,
  /// Markup-escaped content.
  pub content:         String,
  /// Stored as `contentType`; `type` is reserved for the item discriminant.
  #[serde(rename = "contentType")]
  pub kind:            AnnouncementKind,
  pub media_url:       Option<String>,
  pub created_at:      DateTime<Utc>,
  /// Display name of the author.
  pub created_by:      String,
  pub created_by_id:   String,
  pub expires_at:      DateTime<Utc>,
  #[serde(default)]
  pub reactions:       Reactions,
}

impl Announcement {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

impl Entity for Announcement {
  const KIND: &'static str = "announcement";

  fn keys(&self) -> Result<ItemKeys> {
    Ok(keys::announcement(
      self.community_id,
      self.created_at,
      self.announcement_id,
    ))
  }

  fn expires_at(&self) -> Option<i64> { Some(self.expires_at.timestamp()) }
}

/// Input to announcement creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
  pub content:   String,
  #[serde(default, rename = "type", alias = "contentType")]
  pub kind:      AnnouncementKind,
  pub media_url: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_is_idempotent() {
    let mut r = Reactions::default();
    assert!(r.apply("like", "alice", ReactionAction::Add));
    assert!(!r.apply("like", "alice", ReactionAction::Add));
    assert_eq!(r.count("like"), 1);
  }

  #[test]
  fn removing_last_user_prunes_kind() {
    let mut r = Reactions::default();
    r.apply("like", "alice", ReactionAction::Add);
    r.apply("like", "alice", ReactionAction::Remove);
    assert!(r.users("like").is_none());
    assert!(r.is_empty());
  }

  #[test]
  fn removing_absent_user_is_noop() {
    let mut r = Reactions::default();
    r.apply("like", "alice", ReactionAction::Add);
    let before = r.clone();
    assert!(!r.apply("like", "bob", ReactionAction::Remove));
    assert!(!r.apply("heart", "bob", ReactionAction::Remove));
    assert_eq!(r, before);
  }

  #[test]
  fn reactions_serialise_as_map_of_arrays() {
    let mut r = Reactions::default();
    r.apply("like", "bob", ReactionAction::Add);
    r.apply("like", "alice", ReactionAction::Add);
    let json = serde_json::to_value(&r).unwrap();
    assert_eq!(json, serde_json::json!({ "like": ["alice", "bob"] }));
  }
}
