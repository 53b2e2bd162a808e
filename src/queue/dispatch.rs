//! Routes backport requests to per-repo task queues.
//!
//! Queues are created lazily when the first request for a repository
//! arrives. Different repositories run concurrently; requests for the same
//! repository are strictly serialized by that repository's queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::types::{BackportRequest, RepoId};

use super::task_queue::{QueueError, TaskHandle, TaskQueue, TaskRunner, TaskSender};

/// Dispatcher that owns one [`TaskQueue`] per repository.
///
/// Thread-safe; share it behind an `Arc` across webhook handler tasks.
pub struct Dispatcher<R: TaskRunner> {
    runner: Arc<R>,

    /// Active queues, keyed by repository ID.
    queues: RwLock<HashMap<RepoId, TaskQueue<R>>>,

    /// Global shutdown token; every queue gets a child of it.
    shutdown: CancellationToken,
}

impl<R: TaskRunner> Dispatcher<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self::new_with_shutdown(runner, CancellationToken::new())
    }

    pub fn new_with_shutdown(runner: Arc<R>, shutdown: CancellationToken) -> Self {
        Dispatcher {
            runner,
            queues: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Returns the shutdown token.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Queues a request behind any others for the same repository.
    #[instrument(skip_all, fields(repo = %request.repo(), pr = %request.source_pr(), branch = %request.target_branch()))]
    pub async fn enqueue(
        &self,
        request: Arc<BackportRequest>,
    ) -> Result<TaskHandle<R::Output, R::Error>, QueueError<R::Error>> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        let sender = self.get_or_spawn_queue(request.repo()).await;
        sender.enqueue(request).await
    }

    /// Gets the sender of a live queue for `repo`, spawning the queue if needed.
    ///
    /// Only the sender is cloned under the lock; sending happens after the
    /// guard is released so a full queue never blocks other repositories.
    async fn get_or_spawn_queue(&self, repo: &RepoId) -> TaskSender<R> {
        // Existing queue (read lock)
        {
            let queues = self.queues.read().await;
            if let Some(queue) = queues.get(repo)
                && !queue.is_finished()
            {
                return queue.sender();
            }
        }

        let mut queues = self.queues.write().await;

        // Double-check after acquiring write lock
        if let Some(queue) = queues.get(repo)
            && !queue.is_finished()
        {
            return queue.sender();
        }

        debug!("Spawning task queue");
        let queue = TaskQueue::spawn(repo.clone(), self.runner.clone(), self.shutdown.child_token());
        let sender = queue.sender();
        queues.insert(repo.clone(), queue);
        sender
    }

    /// Returns the number of repositories with a queue.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }

    /// Checks if a queue exists for the given repository.
    pub async fn has_queue(&self, repo: &RepoId) -> bool {
        self.queues.read().await.contains_key(repo)
    }

    /// Stops every queue once its current task is done and waits for them.
    pub async fn shutdown_all(&self) {
        info!("Shutting down all task queues");
        self.shutdown.cancel();

        let queues: Vec<(RepoId, TaskQueue<R>)> = self.queues.write().await.drain().collect();
        for (repo, queue) in queues {
            trace!(repo = %repo, "Waiting for task queue");
            queue.close().await;
        }
    }
}
