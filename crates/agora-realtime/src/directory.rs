//! The community directory: creation, membership changes, and the read paths
//! that sit next to them (members, a user's communities, message history).

use std::sync::Arc;

use agora_core::{
  community::{
    Community, JoinPolicy, Membership, MembershipStatus, NewCommunity, Role,
    UserCommunity,
  },
  connection::Identity,
  entity::Entity,
  keys::{self, IndexName},
  message::ChatMessage,
  store::{Mutation, Query, Table},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
  Error, Result,
  error::read,
  guard::MembershipGuard,
  registry::{ConnectionRegistry, DEFAULT_CONNECTION_TTL_SECS},
};

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_TAGS: usize = 10;

pub struct Directory<T> {
  table:    Arc<T>,
  guard:    MembershipGuard<T>,
  registry: ConnectionRegistry<T>,
}

impl<T: Table> Directory<T> {
  pub fn new(table: Arc<T>) -> Self {
    let guard = MembershipGuard::new(Arc::clone(&table));
    let registry = ConnectionRegistry::new(
      Arc::clone(&table),
      chrono::Duration::seconds(DEFAULT_CONNECTION_TTL_SECS),
    );
    Self { table, guard, registry }
  }

  // ── Communities ───────────────────────────────────────────────────────────

  /// Create a community with `creator` as its first (admin) member.
  ///
  /// The community row, the creator's membership and its user mirror are
  /// written in one transaction.
  pub async fn create(&self, creator: &Identity, input: NewCommunity) -> Result<Community> {
    keys::validate_user_id(&creator.subject)?;
    let name = input.name.trim().to_owned();
    let name_len = name.chars().count();
    if name_len == 0 || name_len > MAX_NAME_CHARS {
      return Err(Error::validation(format!(
        "`name` must be 1 to {MAX_NAME_CHARS} characters"
      )));
    }
    if input.description.chars().count() > MAX_DESCRIPTION_CHARS {
      return Err(Error::validation(format!(
        "`description` exceeds {MAX_DESCRIPTION_CHARS} characters"
      )));
    }
    let tags: Vec<String> = input
      .tags
      .iter()
      .map(|t| t.trim().to_owned())
      .filter(|t| !t.is_empty())
      .collect();
    if tags.len() > MAX_TAGS {
      return Err(Error::validation(format!("at most {MAX_TAGS} tags are allowed")));
    }

    let now = Utc::now();
    let community = Community {
      community_id: Uuid::new_v4(),
      name,
      description: input.description.trim().to_owned(),
      join_policy: input.join_policy,
      tags,
      member_count: 1,
      created_by: creator.subject.clone(),
      created_at: now,
      updated_at: now,
    };
    let admin = Membership {
      community_id: community.community_id,
      user_id:      creator.subject.clone(),
      display_name: creator.name.clone(),
      role:         Role::Admin,
      status:       MembershipStatus::Active,
      joined_at:    now,
    };

    self
      .table
      .transact_write(vec![
        community.to_item()?,
        admin.to_item()?,
        admin.mirror(&community.name).to_item()?,
      ])
      .await
      .map_err(Error::store)?;

    tracing::info!(
      community_id = %community.community_id,
      created_by = %community.created_by,
      "community created"
    );
    Ok(community)
  }

  pub async fn get(&self, community_id: Uuid) -> Result<Community> {
    let key = keys::community(community_id).primary;
    let item = read(|| self.table.get_item(key.clone()))
      .await?
      .ok_or_else(|| Error::not_found(format!("community {community_id}")))?;
    Ok(Community::from_item(&item)?)
  }

  // ── Membership changes ────────────────────────────────────────────────────

  /// Join `community_id`. Open communities admit immediately; invite-only
  /// ones record a pending membership for an admin to approve.
  pub async fn join(&self, community_id: Uuid, user: &Identity) -> Result<Membership> {
    let community = self.get(community_id).await?;
    if self.guard.membership(community_id, &user.subject).await?.is_some() {
      return Err(Error::conflict("already a member of this community"));
    }

    let status = match community.join_policy {
      JoinPolicy::Open => MembershipStatus::Active,
      JoinPolicy::Invite => MembershipStatus::Pending,
    };
    let membership = Membership {
      community_id,
      user_id: user.subject.clone(),
      display_name: user.name.clone(),
      role: Role::Member,
      status,
      joined_at: Utc::now(),
    };
    self.write_membership(&membership, &community.name).await?;
    if membership.is_active() {
      self.adjust_member_count(community_id, 1).await?;
    }

    tracing::info!(%community_id, user_id = %user.subject, ?status, "joined community");
    Ok(membership)
  }

  /// Promote a pending member to active. Only admins may approve.
  pub async fn approve(
    &self,
    community_id: Uuid,
    admin: &Identity,
    user_id: &str,
  ) -> Result<Membership> {
    self.guard.require_admin(community_id, &admin.subject).await?;
    let community = self.get(community_id).await?;

    let mut membership = self
      .guard
      .membership(community_id, user_id)
      .await?
      .ok_or_else(|| Error::not_found(format!("membership of {user_id}")))?;
    if membership.is_active() {
      return Err(Error::conflict("membership is already active"));
    }

    membership.status = MembershipStatus::Active;
    self.write_membership(&membership, &community.name).await?;
    self.adjust_member_count(community_id, 1).await?;

    tracing::info!(%community_id, %user_id, approved_by = %admin.subject, "membership approved");
    Ok(membership)
  }

  /// Leave `community_id`. The last active admin cannot leave. Sessions of
  /// the user joined to the community are untagged.
  pub async fn leave(&self, community_id: Uuid, user: &Identity) -> Result<()> {
    let membership = self
      .guard
      .membership(community_id, &user.subject)
      .await?
      .ok_or_else(|| Error::not_found("membership"))?;

    if membership.is_active() && membership.role == Role::Admin {
      let admins = self
        .all_members(community_id)
        .await?
        .into_iter()
        .filter(|m| m.is_active() && m.role == Role::Admin)
        .count();
      if admins <= 1 {
        return Err(Error::conflict("the last admin cannot leave the community"));
      }
    }

    let member_key = keys::membership(community_id, &user.subject)?.primary;
    let mirror_key = keys::user_community(&user.subject, community_id)?.primary;
    self
      .table
      .delete_item(member_key)
      .await
      .map_err(Error::store)?;
    self
      .table
      .delete_item(mirror_key)
      .await
      .map_err(Error::store)?;
    if membership.is_active() {
      self.adjust_member_count(community_id, -1).await?;
    }
    self.registry.detach(community_id, &user.subject).await?;

    tracing::info!(%community_id, user_id = %user.subject, "left community");
    Ok(())
  }

  async fn write_membership(&self, membership: &Membership, community_name: &str) -> Result<()> {
    self
      .table
      .transact_write(vec![
        membership.to_item()?,
        membership.mirror(community_name).to_item()?,
      ])
      .await
      .map_err(Error::store)
  }

  async fn adjust_member_count(&self, community_id: Uuid, by: i64) -> Result<()> {
    let key = keys::community(community_id).primary;
    self
      .table
      .update_item(key, vec![
        Mutation::increment("memberCount", by),
        Mutation::set("updatedAt", keys::encode_timestamp(Utc::now())),
      ])
      .await
      .map_err(Error::store)?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Every community `user_id` belongs to, active or pending.
  pub async fn communities_of(&self, user_id: &str) -> Result<Vec<UserCommunity>> {
    let query = Query::partition(keys::user_partition(user_id)?)
      .begins_with(keys::COMMUNITY_PREFIX);
    let items = read(|| self.table.query(&query)).await?;
    Ok(
      items
        .iter()
        .map(UserCommunity::from_item)
        .collect::<agora_core::Result<_>>()?,
    )
  }

  /// Members of a community, visible to its active members.
  pub async fn members(&self, community_id: Uuid, requester: &Identity) -> Result<Vec<Membership>> {
    self.guard.require_active(community_id, &requester.subject).await?;
    self.all_members(community_id).await
  }

  async fn all_members(&self, community_id: Uuid) -> Result<Vec<Membership>> {
    let query = Query::partition(keys::community_partition(community_id))
      .begins_with(keys::MEMBER_PREFIX);
    let items = read(|| self.table.query(&query)).await?;
    Ok(
      items
        .iter()
        .map(Membership::from_item)
        .collect::<agora_core::Result<_>>()?,
    )
  }

  /// The most recent chat messages in a community, newest first.
  pub async fn history(
    &self,
    community_id: Uuid,
    requester: &Identity,
    limit: usize,
  ) -> Result<Vec<ChatMessage>> {
    self.guard.require_active(community_id, &requester.subject).await?;
    let query = Query::partition(keys::community_partition(community_id))
      .on(IndexName::Gsi1)
      .begins_with(keys::MESSAGE_PREFIX)
      .descending()
      .limit(limit);
    self.messages(&query).await
  }

  /// The most recent chat messages written by `author_id`, newest first.
  pub async fn messages_by(&self, author_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
    let query = Query::partition(keys::user_partition(author_id)?)
      .on(IndexName::Gsi2)
      .begins_with(keys::MESSAGE_PREFIX)
      .descending()
      .limit(limit);
    self.messages(&query).await
  }

  async fn messages(&self, query: &Query) -> Result<Vec<ChatMessage>> {
    let items = read(|| self.table.query(query)).await?;
    Ok(
      items
        .iter()
        .map(ChatMessage::from_item)
        .collect::<agora_core::Result<_>>()?,
    )
  }
}
