//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use murmur::{AppState, config};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

/// A registered user with a live session
pub struct TestUser {
    pub username: String,
    pub token: String,
}

pub fn test_config(db_path: std::path::PathBuf) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
        },
        database: config::DatabaseConfig {
            path: db_path,
            max_connections: 4,
            busy_timeout_ms: 250,
        },
        transaction: config::TransactionConfig {
            max_attempts: 8,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        },
        fanout: config::FanoutConfig {
            workers: 2,
            queue_capacity: 64,
            enqueue_timeout_ms: 100,
        },
        auth: config::AuthConfig {
            session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
            session_max_age: 604800,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path().join("test.db"));

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = murmur::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Register `username` through the API and log in
    pub async fn register(&self, username: &str) -> TestUser {
        let response = self
            .client
            .post(self.url("/api/users"))
            .json(&json!({
                "email": format!("{}@example.com", username),
                "username": username,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registering {}", username);

        let response = self
            .client
            .post(self.url("/api/login"))
            .json(&json!({ "email": format!("{}@example.com", username) }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "logging in {}", username);
        let body: Value = response.json().await.unwrap();

        TestUser {
            username: username.to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn get(&self, user: Option<&TestUser>, path: &str) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(user) = user {
            request = request.bearer_auth(&user.token);
        }
        request.send().await.unwrap()
    }

    pub async fn post(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create a post and return its id
    pub async fn create_post(&self, user: &TestUser, content: &str) -> String {
        let response = self
            .post(user, "/api/posts", json!({ "content": content }))
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        body["post"]["id"].as_str().unwrap().to_string()
    }
}

/// Poll `check` until it returns true; fan-out runs in the background.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached before timeout");
}
