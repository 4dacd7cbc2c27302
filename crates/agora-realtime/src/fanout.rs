//! Community-scoped message broadcast.
//!
//! Persistence is the durability boundary: once the message row is written
//! the call succeeds, whatever happens during delivery. Delivery is
//! best-effort, concurrent across recipients, and bounded per recipient by a
//! timeout. Only a transport-reported [`DeliveryError::Gone`] prunes a
//! registry row; a slow recipient is never evicted.
//!
//! Recipients are re-checked against membership before delivery, and rows
//! held by another server instance are left to that instance.

use std::{collections::HashMap, sync::Arc, time::Duration};

use agora_core::{
  connection::Identity,
  entity::Entity,
  message::ChatMessage,
  store::Table,
};
use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
  Error, Result,
  guard::{MembershipGuard, MembershipState},
  protocol::ServerFrame,
  registry::ConnectionRegistry,
  sanitize::{DEFAULT_MAX_MESSAGE_CHARS, bounded_content},
  transport::{Delivery, DeliveryError},
};

#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
  pub max_message_chars: usize,
  /// Upper bound on a single recipient's delivery attempt.
  pub delivery_timeout:  Duration,
}

impl Default for FanoutConfig {
  fn default() -> Self {
    Self {
      max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
      delivery_timeout:  Duration::from_secs(2),
    }
  }
}

/// Outcome of one broadcast. Every resolved recipient appears in exactly one
/// of the lists.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
  pub message:   ChatMessage,
  pub delivered: Vec<Uuid>,
  /// Recipients reported gone whose registry rows were removed.
  pub pruned:    Vec<Uuid>,
  /// Transient failures and timeouts. Rows are kept.
  pub failed:    Vec<Uuid>,
  /// Sessions whose user is no longer an active member. Untagged, not
  /// delivered.
  pub detached:  Vec<Uuid>,
  /// Rows held by another server instance. Not attempted here.
  pub remote:    Vec<Uuid>,
}

impl DeliveryReport {
  fn new(message: ChatMessage) -> Self {
    Self {
      message,
      delivered: Vec::new(),
      pruned: Vec::new(),
      failed: Vec::new(),
      detached: Vec::new(),
      remote: Vec::new(),
    }
  }

  pub fn message_id(&self) -> Uuid { self.message.message_id }

  pub fn attempted(&self) -> usize {
    self.delivered.len() + self.pruned.len() + self.failed.len()
  }
}

pub struct MessageFanout<T, D> {
  table:    Arc<T>,
  guard:    MembershipGuard<T>,
  registry: ConnectionRegistry<T>,
  delivery: Arc<D>,
  config:   FanoutConfig,
}

impl<T: Table, D: Delivery> MessageFanout<T, D> {
  pub fn new(
    table: Arc<T>,
    registry: ConnectionRegistry<T>,
    delivery: Arc<D>,
    config: FanoutConfig,
  ) -> Self {
    let guard = MembershipGuard::new(Arc::clone(&table));
    Self { table, guard, registry, delivery, config }
  }

  /// Send on behalf of an open session. A session that is absent (closed or
  /// expired) yields `NotFound`.
  pub async fn send_from(
    &self,
    connection_id: Uuid,
    community_id: Uuid,
    content: &str,
  ) -> Result<DeliveryReport> {
    let content = bounded_content("content", content, self.config.max_message_chars)?;
    let connection = self
      .registry
      .get(connection_id)
      .await?
      .ok_or_else(|| Error::not_found(format!("connection {connection_id}")))?;
    self.publish(&connection.identity(), community_id, content).await
  }

  /// Validate, authorize, persist, then deliver to every joined session.
  pub async fn broadcast(
    &self,
    author: &Identity,
    community_id: Uuid,
    content: &str,
  ) -> Result<DeliveryReport> {
    let content = bounded_content("content", content, self.config.max_message_chars)?;
    self.publish(author, community_id, content).await
  }

  async fn publish(
    &self,
    author: &Identity,
    community_id: Uuid,
    escaped: String,
  ) -> Result<DeliveryReport> {
    self.guard.require_active(community_id, &author.subject).await?;

    let message = ChatMessage {
      message_id: Uuid::new_v4(),
      community_id,
      author_id: author.subject.clone(),
      author_name: author.name.clone(),
      content: escaped,
      timestamp: Utc::now(),
    };
    self
      .table
      .put_item(message.to_item()?)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      message_id = %message.message_id,
      %community_id,
      author_id = %message.author_id,
      "message stored"
    );

    let mut report = DeliveryReport::new(message);
    self.fan_out(&mut report).await;
    Ok(report)
  }

  async fn fan_out(&self, report: &mut DeliveryReport) {
    let community_id = report.message.community_id;
    let recipients = match self.registry.joined(community_id).await {
      Ok(recipients) => recipients,
      Err(err) => {
        tracing::warn!(%community_id, error = %err, "could not resolve recipients");
        return;
      }
    };
    let payload = match ServerFrame::Message(report.message.clone()).encode() {
      Ok(payload) => payload,
      Err(err) => {
        tracing::error!(error = %err, "could not encode message frame");
        return;
      }
    };

    let local = self.delivery.instance_id();
    let mut active: HashMap<String, bool> = HashMap::new();
    let mut targets = Vec::with_capacity(recipients.len());
    for recipient in recipients {
      let connection_id = recipient.connection_id;
      if let (Some(local), Some(holder)) = (local, recipient.instance_id)
        && local != holder
      {
        report.remote.push(connection_id);
        continue;
      }

      let is_active = match active.get(&recipient.user_id) {
        Some(is_active) => *is_active,
        None => match self.guard.authorize(community_id, &recipient.user_id).await {
          Ok(state) => {
            let is_active = matches!(state, MembershipState::Active(_));
            active.insert(recipient.user_id.clone(), is_active);
            is_active
          }
          Err(err) => {
            tracing::warn!(%connection_id, error = %err, "could not re-check membership");
            report.failed.push(connection_id);
            continue;
          }
        },
      };
      if !is_active {
        tracing::warn!(%connection_id, %community_id, "recipient no longer a member, untagging");
        if let Err(err) = self.registry.leave(connection_id).await {
          tracing::warn!(%connection_id, error = %err, "untag failed");
        }
        report.detached.push(connection_id);
        continue;
      }
      targets.push(recipient);
    }

    let timeout = self.config.delivery_timeout;
    let attempts = targets.iter().map(|recipient| {
      let payload = Arc::clone(&payload);
      let connection_id = recipient.connection_id;
      async move {
        let outcome =
          tokio::time::timeout(timeout, self.delivery.deliver(connection_id, payload)).await;
        (connection_id, outcome)
      }
    });

    for (connection_id, outcome) in join_all(attempts).await {
      match outcome {
        Ok(Ok(())) => {
          tracing::debug!(%connection_id, "delivered");
          report.delivered.push(connection_id);
        }
        Ok(Err(DeliveryError::Gone)) => {
          tracing::warn!(%connection_id, "recipient gone, pruning registry row");
          match self.registry.prune(connection_id).await {
            Ok(_) => report.pruned.push(connection_id),
            Err(err) => {
              tracing::warn!(%connection_id, error = %err, "prune failed");
              report.failed.push(connection_id);
            }
          }
        }
        Ok(Err(DeliveryError::Transient(reason))) => {
          tracing::warn!(%connection_id, %reason, "transient delivery failure");
          report.failed.push(connection_id);
        }
        Err(_elapsed) => {
          tracing::warn!(%connection_id, ?timeout, "delivery timed out");
          report.failed.push(connection_id);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use agora_core::{
    keys::{self, IndexName},
    store::Query,
  };
  use serde_json::json;

  use super::*;
  use crate::testing::{Flaky, Script, World, open_community, user, world};

  #[tokio::test]
  async fn non_member_send_is_forbidden_and_leaves_no_trace() {
    let w = world().await;
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;

    let err = w
      .gateway
      .fanout()
      .broadcast(&user("bob"), club.community_id, "hi")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let history = w.directory.history(club.community_id, &alice, 10).await.unwrap();
    assert!(history.is_empty());
    assert!(w.recorder.received(a).is_empty());
  }

  #[tokio::test]
  async fn every_joined_session_receives_the_message_once() {
    let w = world().await;
    let alice = user("alice");
    let bob = user("bob");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    w.directory.join(club.community_id, &bob).await.unwrap();

    let a = w.joined_session(&alice, club.community_id).await;
    let b = w.joined_session(&bob, club.community_id).await;
    // Joined elsewhere: must not receive anything.
    let other = w.directory.create(&bob, open_community("Chess")).await.unwrap();
    let b2 = w.joined_session(&bob, other.community_id).await;

    let report = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "hello")
      .await
      .unwrap();

    let mut delivered = report.delivered.clone();
    delivered.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(delivered, expected);
    assert!(report.pruned.is_empty() && report.failed.is_empty());

    for session in [a, b] {
      let frames = w.recorder.received(session);
      assert_eq!(frames.len(), 1);
      assert_eq!(frames[0]["type"], "message");
      assert_eq!(frames[0]["content"], "hello");
      assert_eq!(frames[0]["authorId"], "alice");
      assert_eq!(frames[0]["messageId"], json!(report.message_id()));
    }
    assert!(w.recorder.received(b2).is_empty());

    let stored = w
      .table
      .query(
        &Query::partition(keys::community_partition(club.community_id))
          .begins_with(keys::MESSAGE_PREFIX),
      )
      .await
      .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
      stored[0].key.sort,
      keys::message_sort(report.message.timestamp, report.message_id())
    );
    assert_eq!(stored[0].index_key(IndexName::Gsi2).unwrap().partition, "USER:alice");
  }

  #[tokio::test]
  async fn length_bound_is_inclusive() {
    let w = world().await;
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    let fanout = w.gateway.fanout();
    let max = FanoutConfig::default().max_message_chars;

    fanout
      .broadcast(&alice, club.community_id, &"a".repeat(max))
      .await
      .unwrap();
    let err = fanout
      .broadcast(&alice, club.community_id, &"a".repeat(max + 1))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let history = w.directory.history(club.community_id, &alice, 10).await.unwrap();
    assert_eq!(history.len(), 1);
  }

  #[tokio::test]
  async fn content_is_escaped_before_storage_and_delivery() {
    let w = world().await;
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;

    let report = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "<script>")
      .await
      .unwrap();
    assert_eq!(report.message.content, "&lt;script&gt;");
    assert_eq!(w.recorder.received(a)[0]["content"], "&lt;script&gt;");
  }

  #[tokio::test]
  async fn closed_sessions_receive_nothing() {
    let w = world().await;
    let alice = user("alice");
    let bob = user("bob");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    w.directory.join(club.community_id, &bob).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;
    let b = w.joined_session(&bob, club.community_id).await;

    w.gateway.close(b).await.unwrap();
    let report = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "anyone?")
      .await
      .unwrap();

    assert_eq!(report.attempted(), 1);
    assert!(w.recorder.received(b).is_empty());
  }

  #[tokio::test]
  async fn session_closed_mid_broadcast_receives_nothing() {
    let w = world().await;
    let alice = user("alice");
    let bob = user("bob");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    w.directory.join(club.community_id, &bob).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;
    let b = w.joined_session(&bob, club.community_id).await;
    w.recorder.script(b, Script::GoneOnRelease);

    let send = w.gateway.fanout().send_from(a, club.community_id, "bye");
    let close = async {
      w.recorder.in_flight().await;
      assert!(w.gateway.close(b).await.unwrap());
      w.recorder.release();
    };
    let (report, ()) = tokio::join!(send, close);
    let report = report.unwrap();

    assert_eq!(report.delivered, vec![a]);
    assert_eq!(report.pruned, vec![b]);
    assert!(w.recorder.received(b).is_empty());
    assert!(w.gateway.registry().get(b).await.unwrap().is_none());
    assert_eq!(w.gateway.registry().joined(club.community_id).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn members_who_leave_stop_receiving() {
    let w = world().await;
    let alice = user("alice");
    let bob = user("bob");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    w.directory.join(club.community_id, &bob).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;
    let b = w.joined_session(&bob, club.community_id).await;

    w.directory.leave(club.community_id, &bob).await.unwrap();
    let report = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "secret")
      .await
      .unwrap();

    assert_eq!(report.delivered, vec![a]);
    assert!(w.recorder.received(b).is_empty());
    let row = w.gateway.registry().get(b).await.unwrap().unwrap();
    assert!(row.community_id.is_none());
  }

  #[tokio::test]
  async fn stale_tags_of_former_members_are_dropped_at_delivery() {
    let w = world().await;
    let alice = user("alice");
    let bob = user("bob");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    w.directory.join(club.community_id, &bob).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;
    let b = w.joined_session(&bob, club.community_id).await;

    // Membership removed underneath a still-tagged session.
    w.table
      .delete_item(keys::membership(club.community_id, "bob").unwrap().primary)
      .await
      .unwrap();

    let report = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "secret")
      .await
      .unwrap();
    assert_eq!(report.delivered, vec![a]);
    assert_eq!(report.detached, vec![b]);
    assert!(w.recorder.received(b).is_empty());
    assert_eq!(w.gateway.registry().joined(club.community_id).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn only_gone_recipients_are_pruned() {
    let table = crate::testing::sqlite().await;
    let w = World::new(table, FanoutConfig {
      delivery_timeout: Duration::from_millis(50),
      ..FanoutConfig::default()
    });
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    for name in ["gone", "busy", "slow"] {
      w.directory.join(club.community_id, &user(name)).await.unwrap();
    }
    let a = w.joined_session(&alice, club.community_id).await;
    let gone = w.joined_session(&user("gone"), club.community_id).await;
    let busy = w.joined_session(&user("busy"), club.community_id).await;
    let slow = w.joined_session(&user("slow"), club.community_id).await;
    w.recorder.script(gone, Script::Gone);
    w.recorder.script(busy, Script::Transient);
    w.recorder.script(slow, Script::Stall);

    let report = w
      .gateway
      .fanout()
      .broadcast(&alice, club.community_id, "roll call")
      .await
      .unwrap();

    assert_eq!(report.delivered, vec![a]);
    assert_eq!(report.pruned, vec![gone]);
    let mut failed = report.failed.clone();
    failed.sort();
    let mut expected = vec![busy, slow];
    expected.sort();
    assert_eq!(failed, expected);

    let registry = w.gateway.registry();
    assert!(registry.get(gone).await.unwrap().is_none());
    assert!(registry.get(busy).await.unwrap().is_some());
    assert!(registry.get(slow).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn persistence_failure_fails_the_call_without_delivery() {
    let table = Arc::new(Flaky::new().await);
    let w = World::new(Arc::clone(&table), FanoutConfig::default());
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();
    let a = w.joined_session(&alice, club.community_id).await;

    table.fail_writes(true);
    let err = w
      .gateway
      .fanout()
      .send_from(a, club.community_id, "hello")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Transient(_)));
    assert_eq!(w.recorder.total(), 0);
  }

  #[tokio::test]
  async fn stale_session_send_is_not_found() {
    let w = world().await;
    let alice = user("alice");
    let club = w.directory.create(&alice, open_community("Hiking Club")).await.unwrap();

    let err = w
      .gateway
      .fanout()
      .send_from(Uuid::new_v4(), club.community_id, "hello")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Validation still comes first.
    let err = w
      .gateway
      .fanout()
      .send_from(Uuid::new_v4(), club.community_id, "")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }
}
