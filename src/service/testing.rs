//! Shared fixtures for service tests

use std::ops::Deref;

use chrono::Utc;
use tempfile::TempDir;

use super::broadcast::{BroadcastEvent, FeedDelivery};
use crate::AppState;
use crate::config::*;
use crate::data::{FeedEntry, PostView, User};

pub(crate) fn test_config(db_path: std::path::PathBuf) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            path: db_path,
            max_connections: 4,
            busy_timeout_ms: 250,
        },
        transaction: TransactionConfig {
            max_attempts: 8,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        },
        fanout: FanoutConfig {
            workers: 2,
            queue_capacity: 64,
            enqueue_timeout_ms: 100,
        },
        auth: AuthConfig {
            session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
            session_max_age: 3600,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Fully wired application state on a temporary database
pub(crate) struct Harness {
    state: AppState,
    _temp_dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path().join("service.db"));
        let state = AppState::new(config).await.unwrap();
        Self {
            state,
            _temp_dir: temp_dir,
        }
    }

    pub async fn user(&self, username: &str) -> User {
        self.state
            .users
            .create_user(&format!("{username}@example.com"), username)
            .await
            .unwrap()
    }

    /// Wait for every queued fan-out job to finish.
    pub async fn drain(&self) {
        self.state.dispatcher.shutdown().await;
    }
}

impl Deref for Harness {
    type Target = AppState;

    fn deref(&self) -> &AppState {
        &self.state
    }
}

/// Feed entry event for `owner_id` carrying a minimal post
pub(crate) fn feed_event(owner_id: &str, post_id: &str, content: &str) -> BroadcastEvent {
    BroadcastEvent::FeedEntry(FeedDelivery {
        entry: FeedEntry {
            id: 1,
            user_id: owner_id.to_string(),
            post_id: post_id.to_string(),
        },
        post: PostView {
            id: post_id.to_string(),
            user_id: "author".to_string(),
            content: content.to_string(),
            spoiler_of: None,
            likes_count: 0,
            comments_count: 0,
            created_at: Utc::now(),
            author_username: "author".to_string(),
            author_avatar_url: None,
            mine: false,
            liked: false,
            subscribed: false,
        },
    })
}
