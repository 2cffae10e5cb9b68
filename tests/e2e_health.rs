//! E2E tests for health check and basic server functionality

mod common;

use common::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_cors_headers() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/health"))
        .header("Origin", "https://client.example.com")
        .send()
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_404_for_unknown_routes() {
    let server = TestServer::new().await;

    let response = server.get(None, "/api/unknown/route").await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() {
    let server = TestServer::new().await;

    let response = server.get(None, "/metrics").await;

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let server = TestServer::new().await;

    for path in ["/api/feed", "/api/notifications", "/api/me"] {
        let response = server.get(None, path).await;
        assert_eq!(response.status(), 401, "{}", path);
    }

    let response = server
        .client
        .get(server.url("/api/feed"))
        .bearer_auth("forged.token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
