//! Notification service
//!
//! Write side: one fan-out operation per trigger (follow, comment, mention),
//! each in its own transaction and each publishing the rows it created.
//! Read side: listing, read flags and the unseen indicator.

use std::sync::Arc;

use super::broadcast::{BroadcastEvent, BroadcastSink, publish_all};
use super::mention::collect_mentions;
use crate::auth::Principal;
use crate::data::{Comment, Database, Notification, NotificationVerb, NotificationView, Post, writes};
use crate::error::AppError;

pub struct NotificationService {
    db: Arc<Database>,
    sink: Arc<dyn BroadcastSink>,
}

impl NotificationService {
    pub fn new(db: Arc<Database>, sink: Arc<dyn BroadcastSink>) -> Self {
        Self { db, sink }
    }

    fn publish(&self, notifications: Vec<Notification>) -> usize {
        let created = notifications.len();
        publish_all(
            self.sink.as_ref(),
            notifications.into_iter().map(BroadcastEvent::Notification),
        );
        created
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Tell `followee_id` that `follower_id` followed them.
    ///
    /// Issued at most once per ordered pair, even across unfollow and refollow.
    pub async fn notify_follow(&self, follower_id: &str, followee_id: &str) -> Result<usize, AppError> {
        let created = self
            .db
            .run_transaction("follow_notification", |conn| {
                let follower_id = follower_id.to_owned();
                let followee_id = followee_id.to_owned();
                Box::pin(async move {
                    writes::insert_follow_notification_once(conn, &followee_id, &follower_id).await
                })
            })
            .await?;

        Ok(self.publish(created.into_iter().collect()))
    }

    /// Tell every subscriber of the post, except the commenter, about a new comment.
    pub async fn notify_comment(&self, comment: &Comment) -> Result<usize, AppError> {
        let created = self
            .db
            .run_transaction("comment_notifications", |conn| {
                let comment = comment.clone();
                Box::pin(async move { writes::insert_comment_notifications(conn, &comment).await })
            })
            .await?;

        Ok(self.publish(created))
    }

    /// Notify users @-mentioned in a post.
    pub async fn notify_post_mentions(&self, post: &Post) -> Result<usize, AppError> {
        self.notify_mentions(
            &post.user_id,
            NotificationVerb::PostMention,
            &post.id,
            None,
            &post.content,
        )
        .await
    }

    /// Notify users @-mentioned in a comment.
    pub async fn notify_comment_mentions(&self, comment: &Comment) -> Result<usize, AppError> {
        self.notify_mentions(
            &comment.user_id,
            NotificationVerb::CommentMention,
            &comment.id,
            Some(&comment.post_id),
            &comment.content,
        )
        .await
    }

    async fn notify_mentions(
        &self,
        actor_id: &str,
        verb: NotificationVerb,
        object_id: &str,
        target_id: Option<&str>,
        content: &str,
    ) -> Result<usize, AppError> {
        let usernames = collect_mentions(content);
        if usernames.is_empty() {
            return Ok(0);
        }

        let created = self
            .db
            .run_transaction(verb.as_str(), |conn| {
                let actor_id = actor_id.to_owned();
                let object_id = object_id.to_owned();
                let target_id = target_id.map(str::to_owned);
                let usernames = usernames.clone();
                Box::pin(async move {
                    writes::insert_mention_notifications(
                        conn,
                        &actor_id,
                        verb,
                        &object_id,
                        target_id.as_deref(),
                        &usernames,
                    )
                    .await
                })
            })
            .await?;

        Ok(self.publish(created))
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// List the principal's notifications and mark them as seen.
    ///
    /// A failure to move the seen-at watermark is logged, not returned.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<NotificationView>, AppError> {
        let notifications = self.db.get_notifications(&principal.user_id).await?;

        if let Some(newest) = notifications.iter().map(|n| n.id).max() {
            if let Err(error) = self
                .db
                .advance_notifications_seen_at(&principal.user_id, newest)
                .await
            {
                tracing::warn!(user_id = %principal.user_id, %error, "Failed to advance notification watermark");
            }
        }

        Ok(notifications)
    }

    pub async fn mark_as_read(&self, principal: &Principal, notification_id: i64) -> Result<(), AppError> {
        if self
            .db
            .mark_notification_read(&principal.user_id, notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    pub async fn mark_all_as_read(&self, principal: &Principal) -> Result<u64, AppError> {
        self.db.mark_all_notifications_read(&principal.user_id).await
    }

    /// Whether the principal has unread notifications issued since they last looked
    pub async fn has_unseen(&self, principal: &Principal) -> Result<bool, AppError> {
        self.db.has_unseen_notifications(&principal.user_id).await
    }
}
