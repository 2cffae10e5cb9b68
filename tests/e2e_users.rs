//! E2E tests for registration, sessions, profiles and follows

mod common;

use common::{TestServer, eventually};
use serde_json::{Value, json};

#[tokio::test]
async fn test_register_login_and_me() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;

    let response = server.get(Some(&alice), "/api/me").await;
    assert_eq!(response.status(), 200);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["me"], true);
}

#[tokio::test]
async fn test_login_sets_session_cookie_and_logout_clears_it() {
    let server = TestServer::new().await;
    server.register("alice").await;

    let response = server
        .client
        .post(server.url("/api/login"))
        .json(&json!({ "email": "alice@example.com" }))
        .send()
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session="));
    let session = cookie.split(';').next().unwrap().to_string();

    let response = server
        .client
        .get(server.url("/api/me"))
        .header("Cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .post(server.url("/api/logout"))
        .header("Cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    let cleared = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cleared.starts_with("session="));
}

#[tokio::test]
async fn test_unknown_email_cannot_log_in() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/login"))
        .json(&json!({ "email": "nobody@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_duplicate_fields_are_unprocessable() {
    let server = TestServer::new().await;
    server.register("alice").await;

    let response = server
        .client
        .post(server.url("/api/users"))
        .json(&json!({ "email": "other@example.com", "username": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "username");

    let response = server
        .client
        .post(server.url("/api/users"))
        .json(&json!({ "email": "alice@example.com", "username": "alice2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "email");
}

#[tokio::test]
async fn test_toggle_follow_updates_profile_and_notifies_once() {
    let server = &TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let response = server
        .post(&bob, "/api/users/alice/toggle_follow", json!({}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"followingOfMine": true, "followersCount": 1}));

    let profile: Value = server
        .get(Some(&bob), "/api/users/alice")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(profile["followingOfMine"], true);
    assert_eq!(profile["followersCount"], 1);
    assert!(profile.get("email").is_none());

    // unfollow and follow again
    for expected in [false, true] {
        let body: Value = server
            .post(&bob, "/api/users/alice/toggle_follow", json!({}))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(body["followingOfMine"], expected);
    }

    let recipient = &alice;
    eventually(|| async move {
        let unread: Value = server
            .get(Some(recipient), "/api/check_unread_notifications")
            .await
            .json()
            .await
            .unwrap();
        unread["unread"] == true
    })
    .await;

    // Let any stray job land before counting.
    server.state.shutdown().await;
    let notifications: Value = server
        .get(Some(&alice), "/api/notifications")
        .await
        .json()
        .await
        .unwrap();
    let notifications = notifications.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["verb"], "follow");
    assert_eq!(notifications[0]["actorUsername"], "bob");
}

#[tokio::test]
async fn test_self_follow_is_forbidden() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;

    let response = server
        .post(&alice, "/api/users/alice/toggle_follow", json!({}))
        .await;
    assert_eq!(response.status(), 403);

    let profile: Value = server
        .get(Some(&alice), "/api/users/alice")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(profile["followersCount"], 0);
    assert_eq!(profile["followingCount"], 0);
}

#[tokio::test]
async fn test_search_excludes_viewer() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    server.register("alicia").await;
    server.register("bob").await;

    let results: Value = server
        .get(Some(&alice), "/api/users?search=ALI")
        .await
        .json()
        .await
        .unwrap();
    let names: Vec<_> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["username"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alicia".to_string()]);

    let response = server.get(Some(&alice), "/api/users").await;
    assert_eq!(response.status(), 400);
}
