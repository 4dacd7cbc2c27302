//! The connection registry: which real-time sessions are open, and which
//! community each one is joined to.
//!
//! Rows live in the shared table, not in process memory, so any process
//! instance can resolve a community's sessions. Each row carries an absolute
//! expiry; a session whose close event was missed disappears from every read
//! once the expiry passes.

use std::sync::Arc;

use agora_core::{
  connection::{Connection, Identity, Profile},
  entity::Entity,
  keys::{self, IndexName},
  store::{Mutation, Query, Table},
};
use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  error::read,
  guard::{MembershipGuard, MembershipState},
};

/// Lifetime of a connection row from the moment it is opened, in seconds.
pub const DEFAULT_CONNECTION_TTL_SECS: i64 = 24 * 60 * 60;

pub struct ConnectionRegistry<T> {
  table:    Arc<T>,
  guard:    MembershipGuard<T>,
  ttl:      Duration,
  instance: Option<Uuid>,
}

impl<T> Clone for ConnectionRegistry<T> {
  fn clone(&self) -> Self {
    Self {
      table:    Arc::clone(&self.table),
      guard:    self.guard.clone(),
      ttl:      self.ttl,
      instance: self.instance,
    }
  }
}

impl<T: Table> ConnectionRegistry<T> {
  pub fn new(table: Arc<T>, ttl: Duration) -> Self {
    let guard = MembershipGuard::new(Arc::clone(&table));
    Self { table, guard, ttl, instance: None }
  }

  /// Stamp rows opened through this registry with the serving instance.
  pub fn with_instance(mut self, instance: Option<Uuid>) -> Self {
    self.instance = instance;
    self
  }

  /// Record a newly accepted session for an already-verified identity.
  ///
  /// Also marks the user's profile online and points it at this session.
  pub async fn open(&self, connection_id: Uuid, identity: &Identity) -> Result<Connection> {
    keys::validate_user_id(&identity.subject)?;
    let now = Utc::now();
    let connection = Connection {
      connection_id,
      user_id: identity.subject.clone(),
      username: identity.name.clone(),
      community_id: None,
      instance_id: self.instance,
      connected_at: now,
      last_seen: now,
      expires_at: now + self.ttl,
    };
    self
      .table
      .put_item(connection.to_item()?)
      .await
      .map_err(Error::store)?;

    let profile = keys::profile(&identity.subject)?.primary;
    self
      .table
      .update_item(profile, vec![
        Mutation::set("type", Profile::KIND),
        Mutation::set("userId", identity.subject.as_str()),
        Mutation::set("connectionId", connection_id.to_string()),
        Mutation::set("lastSeen", keys::encode_timestamp(now)),
        Mutation::set("isOnline", true),
      ])
      .await
      .map_err(Error::store)?;

    tracing::info!(%connection_id, user_id = %identity.subject, "session opened");
    Ok(connection)
  }

  /// The live row for `connection_id`. Expired rows are absent.
  pub async fn get(&self, connection_id: Uuid) -> Result<Option<Connection>> {
    let key = keys::connection(connection_id, None).primary;
    let item = read(|| self.table.get_item(key.clone())).await?;
    let Some(item) = item else { return Ok(None) };

    let connection = Connection::from_item(&item)?;
    // Belt and braces against clock skew between the store and this process.
    if connection.is_expired_at(Utc::now()) {
      return Ok(None);
    }
    Ok(Some(connection))
  }

  async fn require(&self, connection_id: Uuid) -> Result<Connection> {
    self
      .get(connection_id)
      .await?
      .ok_or_else(|| Error::not_found(format!("connection {connection_id}")))
  }

  /// Tag the session with `community_id`. Requires active membership;
  /// otherwise the row is left exactly as it was.
  pub async fn join(&self, connection_id: Uuid, community_id: Uuid) -> Result<Connection> {
    let mut connection = self.require(connection_id).await?;

    match self.guard.authorize(community_id, &connection.user_id).await? {
      MembershipState::Active(_) => {}
      MembershipState::Pending => {
        return Err(Error::forbidden("membership is pending approval"));
      }
      MembershipState::NotFound => {
        return Err(Error::forbidden("not a member of this community"));
      }
    }

    connection.community_id = Some(community_id);
    connection.last_seen = Utc::now();
    self.overwrite(&connection).await?;

    tracing::info!(%connection_id, %community_id, "session joined community");
    Ok(connection)
  }

  /// Drop the session's community tag. A session without a tag is unchanged.
  pub async fn leave(&self, connection_id: Uuid) -> Result<Connection> {
    let mut connection = self.require(connection_id).await?;
    let Some(community_id) = connection.community_id.take() else {
      return Ok(connection);
    };

    connection.last_seen = Utc::now();
    self.overwrite(&connection).await?;

    tracing::info!(%connection_id, %community_id, "session left community");
    Ok(connection)
  }

  /// Whole-row overwrite; keeps the original absolute expiry.
  async fn overwrite(&self, connection: &Connection) -> Result<()> {
    self
      .table
      .put_item(connection.to_item()?)
      .await
      .map_err(Error::store)
  }

  /// Remove the session. Closing an absent session is a no-op; returns
  /// whether a row was removed.
  pub async fn close(&self, connection_id: Uuid) -> Result<bool> {
    let removed = self.prune(connection_id).await?;
    if removed {
      tracing::info!(%connection_id, "session closed");
    }
    Ok(removed)
  }

  /// Clear the profile's online flag, unless a newer session has since
  /// claimed it.
  async fn mark_offline(&self, connection: &Connection) -> Result<()> {
    let key = keys::profile(&connection.user_id)?.primary;
    let Some(item) = read(|| self.table.get_item(key.clone())).await? else {
      return Ok(());
    };
    let profile = Profile::from_item(&item)?;
    if profile.connection_id != Some(connection.connection_id) {
      return Ok(());
    }

    self
      .table
      .update_item(key, vec![
        Mutation::set("isOnline", false),
        Mutation::remove("connectionId"),
        Mutation::set("lastSeen", Value::String(keys::encode_timestamp(Utc::now()))),
      ])
      .await
      .map_err(Error::store)?;
    Ok(())
  }

  /// Delete the row and clear the presence it held. Used by `close` and
  /// when a transport reports the handle permanently gone; an expired
  /// leftover is removed too so it stops occupying the index.
  pub async fn prune(&self, connection_id: Uuid) -> Result<bool> {
    let connection = self.get(connection_id).await?;
    let key = keys::connection(connection_id, None).primary;
    let removed = self.table.delete_item(key).await.map_err(Error::store)?;
    if let Some(connection) = &connection {
      self.mark_offline(connection).await?;
    }
    Ok(removed)
  }

  /// Untag every session of `user_id` joined to `community_id`. Called when
  /// the user stops being an active member; returns the sessions untagged.
  pub async fn detach(&self, community_id: Uuid, user_id: &str) -> Result<Vec<Uuid>> {
    let mut detached = Vec::new();
    for mut connection in self.joined(community_id).await? {
      if connection.user_id != user_id {
        continue;
      }
      connection.community_id = None;
      self.overwrite(&connection).await?;
      detached.push(connection.connection_id);
    }
    if !detached.is_empty() {
      tracing::info!(%community_id, %user_id, sessions = detached.len(), "sessions detached");
    }
    Ok(detached)
  }

  /// Every live session currently joined to `community_id`.
  pub async fn joined(&self, community_id: Uuid) -> Result<Vec<Connection>> {
    let query = Query::partition(keys::community_partition(community_id))
      .on(IndexName::Gsi1)
      .begins_with(keys::CONNECTION_PREFIX);
    let items = read(|| self.table.query(&query)).await?;

    let now = Utc::now();
    let mut sessions = Vec::with_capacity(items.len());
    for item in &items {
      let connection = Connection::from_item(item)?;
      if !connection.is_expired_at(now) {
        sessions.push(connection);
      }
    }
    Ok(sessions)
  }
}
