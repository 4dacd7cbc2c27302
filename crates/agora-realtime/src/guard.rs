//! Membership authorization.
//!
//! Every mutating entry point asks the guard first. The answer comes from a
//! single point lookup of the community-partition membership row.

use std::sync::Arc;

use agora_core::{
  community::{Membership, MembershipStatus, Role},
  entity::Entity,
  keys,
  store::Table,
};
use uuid::Uuid;

use crate::{Error, Result, error::read};

/// A user's standing in one community.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
  NotFound,
  Pending,
  Active(Role),
}

impl MembershipState {
  pub fn is_active(self) -> bool { matches!(self, Self::Active(_)) }

  pub fn is_admin(self) -> bool { self == Self::Active(Role::Admin) }
}

pub struct MembershipGuard<T> {
  table: Arc<T>,
}

impl<T> Clone for MembershipGuard<T> {
  fn clone(&self) -> Self { Self { table: Arc::clone(&self.table) } }
}

impl<T: Table> MembershipGuard<T> {
  pub fn new(table: Arc<T>) -> Self { Self { table } }

  /// The membership row for `(community_id, user_id)`, if any.
  pub async fn membership(
    &self,
    community_id: Uuid,
    user_id: &str,
  ) -> Result<Option<Membership>> {
    let key = keys::membership(community_id, user_id)?.primary;
    let item = read(|| self.table.get_item(key.clone())).await?;
    Ok(item.as_ref().map(Membership::from_item).transpose()?)
  }

  pub async fn authorize(&self, community_id: Uuid, user_id: &str) -> Result<MembershipState> {
    let state = match self.membership(community_id, user_id).await? {
      None => MembershipState::NotFound,
      Some(m) => match m.status {
        MembershipStatus::Pending => MembershipState::Pending,
        MembershipStatus::Active => MembershipState::Active(m.role),
      },
    };
    Ok(state)
  }

  /// `Forbidden` unless the user is an active member; returns their role.
  pub async fn require_active(&self, community_id: Uuid, user_id: &str) -> Result<Role> {
    match self.authorize(community_id, user_id).await? {
      MembershipState::Active(role) => Ok(role),
      MembershipState::Pending => {
        Err(Error::forbidden("membership is pending approval"))
      }
      MembershipState::NotFound => {
        Err(Error::forbidden("not a member of this community"))
      }
    }
  }

  /// `Forbidden` unless the user is an active admin.
  pub async fn require_admin(&self, community_id: Uuid, user_id: &str) -> Result<()> {
    match self.require_active(community_id, user_id).await? {
      Role::Admin => Ok(()),
      Role::Member => Err(Error::forbidden("admin role required")),
    }
  }
}
