//! Feed service
//!
//! Fan-out-on-write: a new post is copied into every follower's feed when it
//! is created, so reading a feed is a single indexed query.

use std::sync::Arc;

use super::broadcast::{BroadcastEvent, BroadcastSink, FeedDelivery, publish_all};
use crate::auth::Principal;
use crate::data::{Database, FeedItemView, writes};
use crate::error::AppError;

pub struct FeedService {
    db: Arc<Database>,
    sink: Arc<dyn BroadcastSink>,
}

impl FeedService {
    pub fn new(db: Arc<Database>, sink: Arc<dyn BroadcastSink>) -> Self {
        Self { db, sink }
    }

    /// The principal's feed, newest post first
    pub async fn feed(&self, principal: &Principal) -> Result<Vec<FeedItemView>, AppError> {
        self.db.get_feed(&principal.user_id).await
    }

    /// Copy a post into the feed of every follower of its author.
    ///
    /// Followers who already hold the post are skipped, so a repeated run
    /// inserts and publishes nothing. Returns the number of entries created.
    pub async fn fan_out_post(&self, author_id: &str, post_id: &str) -> Result<usize, AppError> {
        let entries = self
            .db
            .run_transaction("feed_fanout", |conn| {
                let author_id = author_id.to_owned();
                let post_id = post_id.to_owned();
                Box::pin(async move {
                    writes::insert_follower_feed_entries(conn, &author_id, &post_id).await
                })
            })
            .await?;

        let inserted = entries.len();
        tracing::debug!(post_id, author_id, inserted, "Post fanned out to follower feeds");
        if entries.is_empty() {
            return Ok(0);
        }

        // Loaded once for every recipient, without a viewer.
        let Some(post) = self.db.get_post_view(None, post_id).await? else {
            tracing::warn!(post_id, "Fanned-out post vanished before broadcast");
            return Ok(inserted);
        };
        publish_all(
            self.sink.as_ref(),
            entries.into_iter().map(|entry| {
                BroadcastEvent::FeedEntry(FeedDelivery {
                    entry,
                    post: post.clone(),
                })
            }),
        );

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EdgeKind, User};
    use crate::service::broadcast::MockBroadcastSink;
    use crate::service::toggle::ToggleEngine;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-feed.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    async fn seed_user(db: &Database, username: &str) -> User {
        db.insert_user(&format!("{username}@example.com"), username)
            .await
            .unwrap()
    }

    async fn seed_own_post(db: &Database, author: &User) -> String {
        let author_id = author.id.clone();
        db.run_transaction("seed_post", |conn| {
            let author_id = author_id.clone();
            Box::pin(async move {
                let mut post = writes::insert_post(&mut *conn, &author_id, "post", None).await?;
                writes::subscribe_author(&mut *conn, &mut post).await?;
                writes::insert_feed_entry(&mut *conn, &author_id, &post.id).await?;
                Ok(post.id)
            })
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fan_out_reaches_each_follower_once() {
        let (db, _temp_dir) = create_test_db().await;
        let engine = ToggleEngine::new(db.clone());
        let author = seed_user(&db, "author").await;
        let mut followers = Vec::new();
        for name in ["f1", "f2", "f3"] {
            let follower = seed_user(&db, name).await;
            engine
                .toggle(&follower.id, &author.id, EdgeKind::Follow)
                .await
                .unwrap();
            followers.push(follower);
        }
        let post_id = seed_own_post(&db, &author).await;

        let mut sink = MockBroadcastSink::new();
        let expected_post = post_id.clone();
        sink.expect_publish()
            .times(3)
            .withf(move |event| match event {
                BroadcastEvent::FeedEntry(delivery) => {
                    delivery.entry.post_id == expected_post
                        && delivery.post.id == expected_post
                        && delivery.post.content == "post"
                        && delivery.post.author_username == "author"
                        && !delivery.post.mine
                        && !delivery.post.liked
                        && !delivery.post.subscribed
                }
                BroadcastEvent::Notification(_) => false,
            })
            .returning(|_| Ok(()));
        let feed = FeedService::new(db.clone(), Arc::new(sink));

        assert_eq!(feed.fan_out_post(&author.id, &post_id).await.unwrap(), 3);
        assert_eq!(feed.fan_out_post(&author.id, &post_id).await.unwrap(), 0);

        let entries = db.get_feed_entries_for_post(&post_id).await.unwrap();
        assert_eq!(entries.len(), 4);
        for follower in &followers {
            let items = feed.feed(&Principal::new(&follower.id)).await.unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].post.id, post_id);
            assert!(!items[0].post.mine);
        }
    }

    #[tokio::test]
    async fn fan_out_without_followers_is_empty() {
        let (db, _temp_dir) = create_test_db().await;
        let author = seed_user(&db, "loner").await;
        let post_id = seed_own_post(&db, &author).await;

        let mut sink = MockBroadcastSink::new();
        sink.expect_publish().never();
        let feed = FeedService::new(db.clone(), Arc::new(sink));

        assert_eq!(feed.fan_out_post(&author.id, &post_id).await.unwrap(), 0);
        let own = feed.feed(&Principal::new(&author.id)).await.unwrap();
        assert_eq!(own.len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_fan_out() {
        let (db, _temp_dir) = create_test_db().await;
        let engine = ToggleEngine::new(db.clone());
        let author = seed_user(&db, "author").await;
        let follower = seed_user(&db, "follower").await;
        engine
            .toggle(&follower.id, &author.id, EdgeKind::Follow)
            .await
            .unwrap();
        let post_id = seed_own_post(&db, &author).await;

        let mut sink = MockBroadcastSink::new();
        sink.expect_publish()
            .times(1)
            .returning(|_| Err(AppError::Internal(anyhow::anyhow!("sink offline"))));
        let feed = FeedService::new(db.clone(), Arc::new(sink));

        assert_eq!(feed.fan_out_post(&author.id, &post_id).await.unwrap(), 1);
    }
}
