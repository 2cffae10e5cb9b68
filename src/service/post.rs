//! Post service
//!
//! Handles post creation and the like and subscription toggles.

use std::sync::Arc;

use super::dispatch::{FanoutDispatcher, FanoutJob};
use super::toggle::{ToggleEngine, ToggleOutcome};
use crate::auth::Principal;
use crate::data::{Database, EdgeKind, FeedItemView, PostView, writes};
use crate::error::AppError;

pub struct PostService {
    db: Arc<Database>,
    toggles: ToggleEngine,
    dispatcher: Arc<FanoutDispatcher>,
}

impl PostService {
    pub fn new(db: Arc<Database>, dispatcher: Arc<FanoutDispatcher>) -> Self {
        Self {
            toggles: ToggleEngine::new(db.clone()),
            db,
            dispatcher,
        }
    }

    /// Create a post
    ///
    /// # Returns
    /// The author's own feed item for the new post
    ///
    /// # Side Effects
    /// - Subscribes the author to the post's comments
    /// - Queues fan-out to follower feeds and mention notifications
    pub async fn create_post(
        &self,
        principal: &Principal,
        content: &str,
        spoiler_of: Option<&str>,
    ) -> Result<FeedItemView, AppError> {
        let (post, entry) = self
            .db
            .run_transaction("create_post", |conn| {
                let author_id = principal.user_id.clone();
                let content = content.to_owned();
                let spoiler_of = spoiler_of.map(str::to_owned);
                Box::pin(async move {
                    let mut post =
                        writes::insert_post(&mut *conn, &author_id, &content, spoiler_of.as_deref())
                            .await?;
                    writes::subscribe_author(&mut *conn, &mut post).await?;
                    let entry = writes::insert_feed_entry(&mut *conn, &author_id, &post.id)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(anyhow::anyhow!("feed entry for new post already exists"))
                        })?;
                    Ok((post, entry))
                })
            })
            .await?;

        tracing::info!(post_id = %post.id, author_id = %post.user_id, "Post created");

        self.dispatcher
            .dispatch(FanoutJob::FeedForPost {
                author_id: post.user_id.clone(),
                post_id: post.id.clone(),
            })
            .await;
        self.dispatcher
            .dispatch(FanoutJob::PostMentions(post.clone()))
            .await;

        let view = self
            .db
            .get_post_view(Some(&principal.user_id), &post.id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(FeedItemView {
            id: entry.id,
            post: view,
        })
    }

    pub async fn get_post(
        &self,
        principal: Option<&Principal>,
        post_id: &str,
    ) -> Result<PostView, AppError> {
        let viewer = principal.map(|p| p.user_id.as_str());
        self.db
            .get_post_view(viewer, post_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Posts by `username`, newest first
    pub async fn posts_by_user(
        &self,
        principal: Option<&Principal>,
        username: &str,
    ) -> Result<Vec<PostView>, AppError> {
        let author = self
            .db
            .get_user_by_username(username)
            .await?
            .ok_or(AppError::NotFound)?;
        let viewer = principal.map(|p| p.user_id.as_str());
        self.db.get_post_views_by_author(viewer, &author.id).await
    }

    /// Like or unlike a post. The counter is the post's `likes_count`.
    pub async fn toggle_like(
        &self,
        principal: &Principal,
        post_id: &str,
    ) -> Result<ToggleOutcome, AppError> {
        self.toggles
            .toggle(&principal.user_id, post_id, EdgeKind::PostLike)
            .await
    }

    /// Subscribe to or unsubscribe from a post's comments.
    pub async fn toggle_subscription(
        &self,
        principal: &Principal,
        post_id: &str,
    ) -> Result<ToggleOutcome, AppError> {
        self.toggles
            .toggle(&principal.user_id, post_id, EdgeKind::Subscription)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::Harness;

    #[tokio::test]
    async fn create_post_fills_author_and_follower_feeds() {
        let harness = Harness::new().await;
        let author = harness.user("author").await;
        let follower = harness.user("follower").await;
        let follower_principal = Principal::new(&follower.id);
        harness
            .users
            .toggle_follow(&follower_principal, "author")
            .await
            .unwrap();

        let item = harness
            .posts
            .create_post(&Principal::new(&author.id), "hello", None)
            .await
            .unwrap();
        assert!(item.post.mine);
        assert!(item.post.subscribed);
        assert_eq!(item.post.author_username, "author");

        harness.drain().await;

        let feed = harness.feed.feed(&follower_principal).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].post.id, item.post.id);
        let stored = harness.db.get_post(&item.post.id).await.unwrap().unwrap();
        assert_eq!(stored.subscribers_count, 1);
    }

    #[tokio::test]
    async fn create_post_notifies_mentioned_users() {
        let harness = Harness::new().await;
        let alice = harness.user("alice").await;
        harness.user("bob").await;
        let carol = harness.user("carol").await;

        harness
            .posts
            .create_post(&Principal::new(&carol.id), "hello @alice and @bob!", None)
            .await
            .unwrap();
        harness.drain().await;

        let notifications = harness.db.get_notifications(&alice.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].verb, "post_mention");
    }

    #[tokio::test]
    async fn like_toggle_reports_counter() {
        let harness = Harness::new().await;
        let author = harness.user("author").await;
        let fan = harness.user("fan").await;
        let item = harness
            .posts
            .create_post(&Principal::new(&author.id), "like me", None)
            .await
            .unwrap();
        let fan_principal = Principal::new(&fan.id);

        let liked = harness.posts.toggle_like(&fan_principal, &item.post.id).await.unwrap();
        assert_eq!(liked, ToggleOutcome { active: true, counter: 1 });

        let view = harness
            .posts
            .get_post(Some(&fan_principal), &item.post.id)
            .await
            .unwrap();
        assert!(view.liked);
        assert!(!view.subscribed);

        let unliked = harness.posts.toggle_like(&fan_principal, &item.post.id).await.unwrap();
        assert_eq!(unliked, ToggleOutcome { active: false, counter: 0 });
    }

    #[tokio::test]
    async fn subscription_toggle_counts_subscribers() {
        let harness = Harness::new().await;
        let author = harness.user("author").await;
        let reader = harness.user("reader").await;
        let item = harness
            .posts
            .create_post(&Principal::new(&author.id), "subscribe", None)
            .await
            .unwrap();

        let outcome = harness
            .posts
            .toggle_subscription(&Principal::new(&reader.id), &item.post.id)
            .await
            .unwrap();
        assert_eq!(outcome, ToggleOutcome { active: true, counter: 2 });
    }

    #[tokio::test]
    async fn posts_by_unknown_user_is_not_found() {
        let harness = Harness::new().await;

        let error = harness.posts.posts_by_user(None, "ghost").await.unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }
}
