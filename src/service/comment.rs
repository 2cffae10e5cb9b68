//! Comment service

use std::sync::Arc;

use super::dispatch::{FanoutDispatcher, FanoutJob};
use super::toggle::{ToggleEngine, ToggleOutcome};
use crate::auth::Principal;
use crate::data::{CommentView, Database, EdgeKind, writes};
use crate::error::AppError;

pub struct CommentService {
    db: Arc<Database>,
    toggles: ToggleEngine,
    dispatcher: Arc<FanoutDispatcher>,
}

impl CommentService {
    pub fn new(db: Arc<Database>, dispatcher: Arc<FanoutDispatcher>) -> Self {
        Self {
            toggles: ToggleEngine::new(db.clone()),
            db,
            dispatcher,
        }
    }

    /// Comment on a post.
    ///
    /// Subscribers and mentioned users are notified in the background.
    pub async fn create_comment(
        &self,
        principal: &Principal,
        post_id: &str,
        content: &str,
    ) -> Result<CommentView, AppError> {
        let comment = self
            .db
            .run_transaction("create_comment", |conn| {
                let author_id = principal.user_id.clone();
                let post_id = post_id.to_owned();
                let content = content.to_owned();
                Box::pin(async move {
                    writes::insert_comment(conn, &author_id, &post_id, &content).await
                })
            })
            .await?;

        tracing::info!(comment_id = %comment.id, post_id, "Comment created");

        self.dispatcher
            .dispatch(FanoutJob::CommentNotifications(comment.clone()))
            .await;
        self.dispatcher
            .dispatch(FanoutJob::CommentMentions(comment.clone()))
            .await;

        let author = self
            .db
            .get_user(&principal.user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(CommentView {
            id: comment.id,
            content: comment.content,
            likes_count: comment.likes_count,
            created_at: comment.created_at,
            author_username: author.username,
            author_avatar_url: author.avatar_url,
            mine: true,
            liked: false,
        })
    }

    /// Comments on a post, newest first
    pub async fn comments(
        &self,
        principal: Option<&Principal>,
        post_id: &str,
    ) -> Result<Vec<CommentView>, AppError> {
        if self.db.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let viewer = principal.map(|p| p.user_id.as_str());
        self.db.get_comment_views(viewer, post_id).await
    }

    /// Like or unlike a comment. The counter is the comment's `likes_count`.
    pub async fn toggle_like(
        &self,
        principal: &Principal,
        comment_id: &str,
    ) -> Result<ToggleOutcome, AppError> {
        self.toggles
            .toggle(&principal.user_id, comment_id, EdgeKind::CommentLike)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::Harness;

    #[tokio::test]
    async fn comment_updates_count_and_notifies_subscribers() {
        let harness = Harness::new().await;
        let author = harness.user("author").await;
        let reader = harness.user("reader").await;
        let item = harness
            .posts
            .create_post(&Principal::new(&author.id), "discuss", None)
            .await
            .unwrap();

        let comment = harness
            .comments
            .create_comment(&Principal::new(&reader.id), &item.post.id, "hi @author")
            .await
            .unwrap();
        assert!(comment.mine);
        assert_eq!(comment.author_username, "reader");

        harness.drain().await;

        let post = harness.db.get_post(&item.post.id).await.unwrap().unwrap();
        assert_eq!(post.comments_count, 1);

        let mut verbs: Vec<_> = harness
            .db
            .get_notifications(&author.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.verb)
            .collect();
        verbs.sort();
        assert_eq!(verbs, vec!["comment".to_string(), "comment_mention".to_string()]);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let harness = Harness::new().await;
        let reader = harness.user("reader").await;

        let error = harness
            .comments
            .create_comment(&Principal::new(&reader.id), "missing", "hello")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound));

        let error = harness.comments.comments(None, "missing").await.unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }

    #[tokio::test]
    async fn comment_like_toggle_is_reflected_in_listing() {
        let harness = Harness::new().await;
        let author = harness.user("author").await;
        let principal = Principal::new(&author.id);
        let item = harness.posts.create_post(&principal, "post", None).await.unwrap();
        let comment = harness
            .comments
            .create_comment(&principal, &item.post.id, "own comment")
            .await
            .unwrap();

        let outcome = harness.comments.toggle_like(&principal, &comment.id).await.unwrap();
        assert_eq!(outcome, ToggleOutcome { active: true, counter: 1 });

        let listed = harness
            .comments
            .comments(Some(&principal), &item.post.id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].liked);
        assert_eq!(listed[0].likes_count, 1);
    }
}
