//! Community announcements: admin-authored notices that expire fifteen days
//! after creation and collect per-user reactions.

use std::sync::Arc;

use agora_core::{
  announcement::{
    ANNOUNCEMENT_TTL_DAYS, Announcement, AnnouncementKind, NewAnnouncement,
    ReactionAction, Reactions,
  },
  connection::Identity,
  entity::Entity,
  keys,
  store::{Query, Table},
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::read,
  guard::MembershipGuard,
  sanitize::{MAX_ANNOUNCEMENT_CHARS, bounded_content},
};

/// Longest reaction kind accepted, in characters.
pub const MAX_REACTION_KIND_CHARS: usize = 32;

pub struct AnnouncementStore<T> {
  table: Arc<T>,
  guard: MembershipGuard<T>,
}

impl<T: Table> AnnouncementStore<T> {
  pub fn new(table: Arc<T>) -> Self {
    let guard = MembershipGuard::new(Arc::clone(&table));
    Self { table, guard }
  }

  /// Publish an announcement. Only active admins may do so.
  pub async fn create(
    &self,
    community_id: Uuid,
    author: &Identity,
    input: NewAnnouncement,
  ) -> Result<Announcement> {
    let content = bounded_content("content", &input.content, MAX_ANNOUNCEMENT_CHARS)?;
    let media_url = input
      .media_url
      .map(|url| url.trim().to_owned())
      .filter(|url| !url.is_empty());
    if input.kind != AnnouncementKind::Text && media_url.is_none() {
      return Err(Error::validation("`mediaUrl` is required for image and video"));
    }

    self.guard.require_admin(community_id, &author.subject).await?;

    let now = Utc::now();
    let announcement = Announcement {
      announcement_id: Uuid::new_v4(),
      community_id,
      content,
      kind: input.kind,
      media_url,
      created_at: now,
      created_by: author.name.clone(),
      created_by_id: author.subject.clone(),
      expires_at: now + Duration::days(ANNOUNCEMENT_TTL_DAYS),
      reactions: Reactions::default(),
    };
    self
      .table
      .put_item(announcement.to_item()?)
      .await
      .map_err(Error::store)?;

    tracing::info!(
      announcement_id = %announcement.announcement_id,
      %community_id,
      "announcement created"
    );
    Ok(announcement)
  }

  /// Add or remove the caller's reaction. Any active member may react.
  ///
  /// The reaction map is read, modified and written back whole; concurrent
  /// reactions to the same announcement are last-writer-wins.
  pub async fn react(
    &self,
    community_id: Uuid,
    announcement_id: Uuid,
    user: &Identity,
    kind: &str,
    action: ReactionAction,
  ) -> Result<Announcement> {
    let kind = kind.trim();
    if kind.is_empty() || kind.chars().count() > MAX_REACTION_KIND_CHARS {
      return Err(Error::validation(format!(
        "reaction kind must be 1 to {MAX_REACTION_KIND_CHARS} characters"
      )));
    }

    self.guard.require_active(community_id, &user.subject).await?;

    let mut announcement = self
      .find(community_id, announcement_id)
      .await?
      .ok_or_else(|| Error::not_found(format!("announcement {announcement_id}")))?;

    if announcement.reactions.apply(kind, &user.subject, action) {
      self
        .table
        .put_item(announcement.to_item()?)
        .await
        .map_err(Error::store)?;
      tracing::debug!(%announcement_id, kind, ?action, "reaction updated");
    }
    Ok(announcement)
  }

  /// Live announcements, newest first. `as_of` defaults to now.
  pub async fn list(
    &self,
    community_id: Uuid,
    requester: &Identity,
    as_of: Option<DateTime<Utc>>,
  ) -> Result<Vec<Announcement>> {
    self.guard.require_active(community_id, &requester.subject).await?;

    let as_of = as_of.unwrap_or_else(Utc::now);
    let query = Query::partition(keys::community_partition(community_id))
      .begins_with(keys::ANNOUNCEMENT_PREFIX)
      .descending();
    let items = read(|| self.table.query(&query)).await?;

    let mut live = Vec::with_capacity(items.len());
    for item in &items {
      let announcement = Announcement::from_item(item)?;
      if !announcement.is_expired_at(as_of) {
        live.push(announcement);
      }
    }
    Ok(live)
  }

  /// Locate an announcement by id. The sort key embeds the creation time,
  /// which callers do not know, so this scans the community's (short-lived)
  /// announcements.
  async fn find(&self, community_id: Uuid, announcement_id: Uuid) -> Result<Option<Announcement>> {
    let query = Query::partition(keys::community_partition(community_id))
      .begins_with(keys::ANNOUNCEMENT_PREFIX);
    let items = read(|| self.table.query(&query)).await?;

    for item in &items {
      let announcement = Announcement::from_item(item)?;
      if announcement.announcement_id == announcement_id {
        return Ok(Some(announcement));
      }
    }
    Ok(None)
  }
}
