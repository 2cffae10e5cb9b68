//! Murmur - the write path of a small social network
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - JSON endpoints under /api                                 │
//! │  - SSE stream of fan-out events                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Toggle engine (follows, likes, subscriptions)             │
//! │  - Fan-out dispatcher: feeds and notifications               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx), serializable transactions with retry       │
//! │  - Edge tables and their cached counters                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database layer
//! - `auth`: Session tokens and principal extractors
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Events buffered per SSE subscriber
const BROADCAST_CAPACITY: usize = 1024;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool and the services.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// In-process broadcast channel fed by fan-out workers
    pub broadcast: Arc<service::ChannelSink>,

    /// Fan-out queue and worker pool
    pub dispatcher: Arc<service::FanoutDispatcher>,

    pub users: Arc<service::UserService>,
    pub posts: Arc<service::PostService>,
    pub comments: Arc<service::CommentService>,
    pub feed: Arc<service::FeedService>,
    pub notifications: Arc<service::NotificationService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Start the fan-out worker pool
    /// 3. Wire the services
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let retry = data::RetryPolicy::from_config(&config.transaction);
        let db = data::Database::open(&config.database, retry).await?;
        tracing::info!("Database connected");

        let state = Self::with_database(config, Arc::new(db));
        tracing::info!("Application state initialized successfully");

        Ok(state)
    }

    /// Wire services around an existing database handle.
    ///
    /// Spawns the fan-out workers, so it must run inside a tokio runtime.
    pub fn with_database(config: config::AppConfig, db: Arc<data::Database>) -> Self {
        let broadcast = Arc::new(service::ChannelSink::new(BROADCAST_CAPACITY));
        let sink: Arc<dyn service::BroadcastSink> = broadcast.clone();

        let feed = Arc::new(service::FeedService::new(db.clone(), sink.clone()));
        let notifications = Arc::new(service::NotificationService::new(db.clone(), sink));

        let dispatcher = Arc::new(service::FanoutDispatcher::start(
            &config.fanout,
            service::FanoutHandlers {
                feed: feed.clone(),
                notifications: notifications.clone(),
            },
        ));

        let users = Arc::new(service::UserService::new(
            db.clone(),
            dispatcher.clone(),
            config.auth.clone(),
        ));
        let posts = Arc::new(service::PostService::new(db.clone(), dispatcher.clone()));
        let comments = Arc::new(service::CommentService::new(db.clone(), dispatcher.clone()));

        Self {
            config: Arc::new(config),
            db,
            broadcast,
            dispatcher,
            users,
            posts,
            comments,
            feed,
            notifications,
        }
    }

    /// Stop accepting fan-out work and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::api_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
