//! Communities and memberships.
//!
//! A membership is stored twice: once under the community partition (for
//! authorization and member listing) and once under the user partition (for
//! "communities of a user"). Both rows are always written and removed
//! together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, entity::Entity, keys, keys::ItemKeys};

// ─── Community ───────────────────────────────────────────────────────────────

/// How new members are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
  /// Anyone may join and becomes active immediately.
  #[default]
  Open,
  /// Joiners start as pending until an admin approves them.
  Invite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
  pub community_id: Uuid,
  pub name:         String,
  pub description:  String,
  pub join_policy:  JoinPolicy,
  #[serde(default)]
  pub tags:         Vec<String>,
  pub member_count: i64,
  pub created_by:   String,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl Entity for Community {
  const KIND: &'static str = "community";

  fn keys(&self) -> Result<ItemKeys> { Ok(keys::community(self.community_id)) }
}

/// Input to community creation. Ids and timestamps are assigned by the
/// directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommunity {
  pub name:        String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub join_policy: JoinPolicy,
  #[serde(default)]
  pub tags:        Vec<String>,
}

// ─── Membership ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
  Active,
  Pending,
}

/// The community-partition membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
  pub community_id: Uuid,
  pub user_id:      String,
  pub display_name: String,
  pub role:         Role,
  pub status:       MembershipStatus,
  pub joined_at:    DateTime<Utc>,
}

impl Membership {
  pub fn is_active(&self) -> bool { self.status == MembershipStatus::Active }

  /// The `USER:` mirror of this membership.
  pub fn mirror(&self, community_name: &str) -> UserCommunity {
    UserCommunity {
      user_id:        self.user_id.clone(),
      community_id:   self.community_id,
      community_name: community_name.to_owned(),
      role:           self.role,
      status:         self.status,
      joined_at:      self.joined_at,
    }
  }
}

impl Entity for Membership {
  const KIND: &'static str = "membership";

  fn keys(&self) -> Result<ItemKeys> {
    keys::membership(self.community_id, &self.user_id)
  }
}

/// The user-partition mirror of a [`Membership`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCommunity {
  pub user_id:        String,
  pub community_id:   Uuid,
  pub community_name: String,
  pub role:           Role,
  pub status:         MembershipStatus,
  pub joined_at:      DateTime<Utc>,
}

impl Entity for UserCommunity {
  const KIND: &'static str = "user_community";

  fn keys(&self) -> Result<ItemKeys> {
    keys::user_community(&self.user_id, self.community_id)
  }
}
