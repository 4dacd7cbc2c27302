//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use agora_core::connection::Identity;
use agora_store_sqlite::SqliteTable;
use axum::{
  Extension, Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

async fn table() -> Arc<SqliteTable> {
  Arc::new(SqliteTable::open_in_memory().await.expect("in-memory table"))
}

fn as_user(table: &Arc<SqliteTable>, user: &str) -> Router {
  api_router(Arc::clone(table)).layer(Extension(Identity::new(user, user.to_uppercase())))
}

async fn call(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = router.oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn create_club(table: &Arc<SqliteTable>, owner: &str, policy: &str) -> String {
  let (status, body) = call(
    as_user(table, owner),
    "POST",
    "/communities",
    Some(json!({"name": "Hiking Club", "description": "Trails", "joinPolicy": policy})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["communityId"].as_str().unwrap().to_owned()
}

// ─── Communities ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_and_list_mine() {
  let t = table().await;
  let id = create_club(&t, "alice", "open").await;

  let (status, body) = call(as_user(&t, "bob"), "GET", &format!("/communities/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["name"], "Hiking Club");
  assert_eq!(body["memberCount"], 1);

  let (status, body) = call(as_user(&t, "alice"), "GET", "/communities", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 1);
  assert_eq!(body[0]["role"], "admin");
}

#[tokio::test]
async fn invalid_community_is_400() {
  let t = table().await;
  let (status, body) = call(
    as_user(&t, "alice"),
    "POST",
    "/communities",
    Some(json!({"name": ""})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn unknown_community_is_404() {
  let t = table().await;
  let uri = format!("/communities/{}", uuid::Uuid::new_v4());
  let (status, _) = call(as_user(&t, "alice"), "GET", &uri, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn join_approve_and_leave() {
  let t = table().await;
  let id = create_club(&t, "alice", "invite").await;

  let (status, body) = call(as_user(&t, "bob"), "POST", &format!("/communities/{id}/join"), None).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["status"], "pending");

  let (status, _) = call(as_user(&t, "bob"), "POST", &format!("/communities/{id}/join"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let approve = format!("/communities/{id}/members/bob/approve");
  let (status, _) = call(as_user(&t, "bob"), "POST", &approve, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, body) = call(as_user(&t, "alice"), "POST", &approve, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "active");

  let (status, body) = call(as_user(&t, "bob"), "GET", &format!("/communities/{id}/members"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (status, _) = call(as_user(&t, "bob"), "POST", &format!("/communities/{id}/leave"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = call(as_user(&t, "alice"), "POST", &format!("/communities/{id}/leave"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

// ─── Announcements ───────────────────────────────────────────────────────────

#[tokio::test]
async fn announcement_lifecycle() {
  let t = table().await;
  let id = create_club(&t, "alice", "open").await;
  call(as_user(&t, "bob"), "POST", &format!("/communities/{id}/join"), None).await;
  let uri = format!("/communities/{id}/announcements");

  let (status, _) = call(as_user(&t, "bob"), "POST", &uri, Some(json!({"content": "hi"}))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, created) = call(
    as_user(&t, "alice"),
    "POST",
    &uri,
    Some(json!({"content": "Trail <b>open</b>", "type": "text"})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["content"], "Trail &lt;b&gt;open&lt;/b&gt;");
  let aid = created["announcementId"].as_str().unwrap().to_owned();

  let react = format!("{uri}/{aid}/reactions");
  let (status, body) = call(
    as_user(&t, "bob"),
    "POST",
    &react,
    Some(json!({"kind": "like", "action": "add"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["reactions"], json!({"like": ["bob"]}));

  let (status, body) = call(
    as_user(&t, "bob"),
    "POST",
    &react,
    Some(json!({"kind": "like", "action": "remove"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["reactions"], json!({}));

  let (status, body) = call(as_user(&t, "bob"), "GET", &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 1);

  let (status, _) = call(as_user(&t, "eve"), "GET", &uri, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_requires_membership_and_positive_limit() {
  let t = table().await;
  let id = create_club(&t, "alice", "open").await;
  let uri = format!("/communities/{id}/messages");

  let (status, body) = call(as_user(&t, "alice"), "GET", &uri, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!([]));

  let (status, _) = call(as_user(&t, "eve"), "GET", &uri, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, _) = call(as_user(&t, "alice"), "GET", &format!("{uri}?limit=0"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = call(as_user(&t, "alice"), "GET", "/me/messages", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!([]));
}
