//! User service
//!
//! Registration, login, profiles and the follow toggle.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::dispatch::{FanoutDispatcher, FanoutJob};
use super::toggle::ToggleEngine;
use crate::auth::{Principal, Session, create_session_token};
use crate::config::AuthConfig;
use crate::data::{Database, EdgeKind, ProfileView, User};
use crate::error::AppError;

/// Follow state after a toggle, from the follower's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowToggle {
    pub following_of_mine: bool,
    pub followers_count: i64,
}

/// A signed session handed out on login
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct UserService {
    db: Arc<Database>,
    toggles: ToggleEngine,
    dispatcher: Arc<FanoutDispatcher>,
    auth: AuthConfig,
}

impl UserService {
    pub fn new(db: Arc<Database>, dispatcher: Arc<FanoutDispatcher>, auth: AuthConfig) -> Self {
        Self {
            toggles: ToggleEngine::new(db.clone()),
            db,
            dispatcher,
            auth,
        }
    }

    /// Register a user.
    ///
    /// # Errors
    /// `FieldTaken` naming the e-mail or username already in use
    pub async fn create_user(&self, email: &str, username: &str) -> Result<User, AppError> {
        let user = self.db.insert_user(email, username).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    /// Look a user up by e-mail and issue a session token.
    pub async fn login(&self, email: &str) -> Result<LoginGrant, AppError> {
        let user = self
            .db
            .get_user_by_email(email)
            .await?
            .ok_or(AppError::NotFound)?;

        let session = Session::issue(&user.id, self.auth.session_max_age);
        let token = create_session_token(&session, &self.auth.session_secret)?;
        tracing::debug!(user_id = %user.id, "Session issued");

        Ok(LoginGrant {
            user,
            token,
            expires_at: session.expires_at,
        })
    }

    pub async fn current(&self, principal: &Principal) -> Result<User, AppError> {
        self.db
            .get_user(&principal.user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Usernames containing `query`, case-insensitively, excluding the principal
    pub async fn search(
        &self,
        principal: Option<&Principal>,
        query: &str,
    ) -> Result<Vec<ProfileView>, AppError> {
        let viewer = principal.map(|p| p.user_id.as_str());
        self.db.search_profiles(viewer, query).await
    }

    pub async fn profile(
        &self,
        principal: Option<&Principal>,
        username: &str,
    ) -> Result<ProfileView, AppError> {
        let viewer = principal.map(|p| p.user_id.as_str());
        self.db
            .get_profile(viewer, username)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Follow or unfollow `username`.
    ///
    /// A new follow queues a notification for the followee.
    pub async fn toggle_follow(
        &self,
        principal: &Principal,
        username: &str,
    ) -> Result<FollowToggle, AppError> {
        let followee = self
            .db
            .get_user_by_username(username)
            .await?
            .ok_or(AppError::NotFound)?;

        let outcome = self
            .toggles
            .toggle(&principal.user_id, &followee.id, EdgeKind::Follow)
            .await?;

        if outcome.active {
            self.dispatcher
                .dispatch(FanoutJob::FollowNotification {
                    follower_id: principal.user_id.clone(),
                    followee_id: followee.id,
                })
                .await;
        }

        Ok(FollowToggle {
            following_of_mine: outcome.active,
            followers_count: outcome.counter,
        })
    }
}
