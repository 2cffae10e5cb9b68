//! Fan-out dispatcher
//!
//! Requests enqueue fan-out work here after their transaction commits and
//! return without waiting for it. A fixed pool of workers drains a bounded
//! queue. When the queue stays full past the enqueue timeout the job is
//! dropped: the request has already succeeded and the rows it committed are
//! not affected.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use prometheus::IntGauge;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::feed::FeedService;
use super::notification::NotificationService;
use crate::config::FanoutConfig;
use crate::data::{Comment, Post};
use crate::error::AppError;

/// Work performed after a request's transaction commits
#[derive(Debug, Clone)]
pub enum FanoutJob {
    /// Copy a new post into follower feeds
    FeedForPost { author_id: String, post_id: String },
    /// Tell a user about a new follower
    FollowNotification {
        follower_id: String,
        followee_id: String,
    },
    /// Tell post subscribers about a new comment
    CommentNotifications(Comment),
    /// Tell users mentioned in a post
    PostMentions(Post),
    /// Tell users mentioned in a comment
    CommentMentions(Comment),
}

impl FanoutJob {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeedForPost { .. } => "feed_for_post",
            Self::FollowNotification { .. } => "follow_notification",
            Self::CommentNotifications(_) => "comment_notifications",
            Self::PostMentions(_) => "post_mentions",
            Self::CommentMentions(_) => "comment_mentions",
        }
    }
}

/// Services a worker needs to run any job
#[derive(Clone)]
pub struct FanoutHandlers {
    pub feed: Arc<FeedService>,
    pub notifications: Arc<NotificationService>,
}

impl FanoutHandlers {
    async fn run(&self, job: FanoutJob) -> Result<usize, AppError> {
        match job {
            FanoutJob::FeedForPost { author_id, post_id } => {
                self.feed.fan_out_post(&author_id, &post_id).await
            }
            FanoutJob::FollowNotification {
                follower_id,
                followee_id,
            } => {
                self.notifications
                    .notify_follow(&follower_id, &followee_id)
                    .await
            }
            FanoutJob::CommentNotifications(comment) => {
                self.notifications.notify_comment(&comment).await
            }
            FanoutJob::PostMentions(post) => self.notifications.notify_post_mentions(&post).await,
            FanoutJob::CommentMentions(comment) => {
                self.notifications.notify_comment_mentions(&comment).await
            }
        }
    }

    /// Run a job, absorbing its failure.
    async fn execute(&self, job: FanoutJob) {
        let kind = job.kind();
        let span = tracing::info_span!("fanout", job = kind);

        let outcome = AssertUnwindSafe(self.run(job).instrument(span))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(rows)) => {
                crate::metrics::FANOUT_ROWS_TOTAL
                    .with_label_values(&[kind])
                    .inc_by(rows as u64);
                tracing::debug!(job = kind, rows, "Fan-out job finished");
            }
            Ok(Err(error)) => {
                crate::metrics::FANOUT_FAILURES_TOTAL
                    .with_label_values(&[kind])
                    .inc();
                tracing::error!(job = kind, %error, "Fan-out job failed");
            }
            Err(_) => {
                crate::metrics::FANOUT_FAILURES_TOTAL
                    .with_label_values(&[kind])
                    .inc();
                tracing::error!(job = kind, "Fan-out job panicked");
            }
        }
    }
}

/// Bounded queue plus worker pool for fan-out jobs
pub struct FanoutDispatcher {
    sender: Mutex<Option<mpsc::Sender<FanoutJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    enqueue_timeout: Duration,
    /// Jobs accepted but not yet picked up by a worker
    depth: IntGauge,
}

impl FanoutDispatcher {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(config: &FanoutConfig, handlers: FanoutHandlers) -> Self {
        Self::start_with_depth(
            config,
            handlers,
            crate::metrics::FANOUT_QUEUE_DEPTH.clone(),
        )
    }

    fn start_with_depth(config: &FanoutConfig, handlers: FanoutHandlers, depth: IntGauge) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.workers)
            .map(|index| {
                let receiver = receiver.clone();
                let handlers = handlers.clone();
                tokio::spawn(worker_loop(index, receiver, handlers, depth.clone()))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Fan-out dispatcher started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            enqueue_timeout: Duration::from_millis(config.enqueue_timeout_ms),
            depth,
        }
    }

    /// Queue a job. Returns whether it was accepted.
    ///
    /// Never fails the caller: a job that cannot be queued within the enqueue
    /// timeout, or after shutdown, is logged and dropped.
    pub async fn dispatch(&self, job: FanoutJob) -> bool {
        let kind = job.kind();
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let Some(sender) = sender else {
            drop_job(kind, "closed");
            return false;
        };

        // Counted before the send so a worker can never decrement first.
        self.depth.inc();
        match sender.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                self.depth.dec();
                drop_job(kind, "queue_full");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.depth.dec();
                drop_job(kind, "closed");
                false
            }
        }
    }

    /// Stop accepting jobs and wait until every queued job has run.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        for worker in workers {
            if let Err(error) = worker.await {
                tracing::error!(%error, "Fan-out worker ended abnormally");
            }
        }
        tracing::info!("Fan-out dispatcher drained");
    }
}

fn drop_job(kind: &'static str, reason: &'static str) {
    crate::metrics::FANOUT_DROPPED_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
    tracing::error!(job = kind, reason, "Dropping fan-out job");
}

async fn worker_loop(
    index: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<FanoutJob>>>,
    handlers: FanoutHandlers,
    depth: IntGauge,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        depth.dec();
        handlers.execute(job).await;
    }
    tracing::debug!(worker = index, "Fan-out worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, EdgeKind, User, writes};
    use crate::service::broadcast::{BroadcastEvent, MockBroadcastSink, NoopSink};
    use crate::service::toggle::ToggleEngine;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-dispatch.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    async fn seed_user(db: &Database, username: &str) -> User {
        db.insert_user(&format!("{username}@example.com"), username)
            .await
            .unwrap()
    }

    fn config(workers: usize, queue_capacity: usize) -> FanoutConfig {
        FanoutConfig {
            workers,
            queue_capacity,
            enqueue_timeout_ms: 10,
        }
    }

    fn handlers(db: &Arc<Database>, sink: Arc<dyn crate::service::broadcast::BroadcastSink>) -> FanoutHandlers {
        FanoutHandlers {
            feed: Arc::new(FeedService::new(db.clone(), sink.clone())),
            notifications: Arc::new(NotificationService::new(db.clone(), sink)),
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let (db, _temp_dir) = create_test_db().await;
        let engine = ToggleEngine::new(db.clone());
        let author = seed_user(&db, "author").await;
        let mut followers = Vec::new();
        for i in 0..5 {
            let follower = seed_user(&db, &format!("follower{i}")).await;
            engine
                .toggle(&follower.id, &author.id, EdgeKind::Follow)
                .await
                .unwrap();
            followers.push(follower);
        }

        let published = Arc::new(AtomicUsize::new(0));
        let mut sink = MockBroadcastSink::new();
        {
            let published = published.clone();
            sink.expect_publish().returning(move |event| {
                assert!(matches!(event, BroadcastEvent::FeedEntry(_)));
                published.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let dispatcher = FanoutDispatcher::start(&config(2, 16), handlers(&db, Arc::new(sink)));

        let mut post_ids = Vec::new();
        for _ in 0..3 {
            let author_id = author.id.clone();
            let post = db
                .run_transaction("seed_post", |conn| {
                    let author_id = author_id.clone();
                    Box::pin(async move { writes::insert_post(conn, &author_id, "post", None).await })
                })
                .await
                .unwrap();
            assert!(
                dispatcher
                    .dispatch(FanoutJob::FeedForPost {
                        author_id: author.id.clone(),
                        post_id: post.id.clone(),
                    })
                    .await
            );
            post_ids.push(post.id);
        }

        dispatcher.shutdown().await;

        assert_eq!(published.load(Ordering::SeqCst), 15);
        for post_id in &post_ids {
            assert_eq!(db.get_feed_entries_for_post(post_id).await.unwrap().len(), 5);
        }
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_dropped() {
        let (db, _temp_dir) = create_test_db().await;
        let depth = test_gauge();
        let dispatcher = FanoutDispatcher::start_with_depth(
            &config(1, 4),
            handlers(&db, Arc::new(NoopSink)),
            depth.clone(),
        );
        dispatcher.shutdown().await;

        let accepted = dispatcher
            .dispatch(FanoutJob::FollowNotification {
                follower_id: "a".to_string(),
                followee_id: "b".to_string(),
            })
            .await;
        assert!(!accepted);
        assert_eq!(depth.get(), 0);
    }

    fn test_gauge() -> IntGauge {
        IntGauge::new("test_fanout_queue_depth", "queue depth under test").unwrap()
    }

    #[tokio::test]
    async fn full_queue_drops_after_timeout() {
        let (db, _temp_dir) = create_test_db().await;
        let depth = test_gauge();
        // No workers: nothing drains the single slot.
        let dispatcher = FanoutDispatcher::start_with_depth(
            &config(0, 1),
            handlers(&db, Arc::new(NoopSink)),
            depth.clone(),
        );

        let job = FanoutJob::FollowNotification {
            follower_id: "a".to_string(),
            followee_id: "b".to_string(),
        };
        assert!(dispatcher.dispatch(job.clone()).await);
        assert!(!dispatcher.dispatch(job).await);
        assert_eq!(depth.get(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queue_depth_never_goes_negative() {
        let (db, _temp_dir) = create_test_db().await;
        let depth = test_gauge();
        let dispatcher = FanoutDispatcher::start_with_depth(
            &config(2, 64),
            handlers(&db, Arc::new(NoopSink)),
            depth.clone(),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let sampler = {
            let depth = depth.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut lowest = 0;
                while !stop.load(Ordering::SeqCst) {
                    lowest = lowest.min(depth.get());
                    tokio::task::yield_now().await;
                }
                lowest
            })
        };

        // Unknown users make every job fail fast, so workers race the sender.
        for _ in 0..200 {
            dispatcher
                .dispatch(FanoutJob::FollowNotification {
                    follower_id: "ghost".to_string(),
                    followee_id: "phantom".to_string(),
                })
                .await;
        }
        dispatcher.shutdown().await;
        stop.store(true, Ordering::SeqCst);

        assert!(sampler.await.unwrap() >= 0);
        assert_eq!(depth.get(), 0);
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_worker() {
        let (db, _temp_dir) = create_test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;
        let dispatcher = FanoutDispatcher::start(&config(1, 8), handlers(&db, Arc::new(NoopSink)));

        // Unknown users violate the notification foreign keys.
        dispatcher
            .dispatch(FanoutJob::FollowNotification {
                follower_id: "ghost".to_string(),
                followee_id: "phantom".to_string(),
            })
            .await;
        dispatcher
            .dispatch(FanoutJob::FollowNotification {
                follower_id: bob.id.clone(),
                followee_id: alice.id.clone(),
            })
            .await;
        dispatcher.shutdown().await;

        let notifications = db.get_notifications(&alice.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
    }
}
