//! Strict FIFO queue with a single worker.
//!
//! Each [`TaskQueue`] owns one tokio task that pulls requests off a channel
//! and runs them to completion one after the other, so at most one backport
//! touches the repository's clone at any time. Enqueueing returns a
//! [`TaskHandle`] that resolves with that request's own result.
//!
//! The queue never retries: a failed task's handle resolves to the error.
//! Shutdown is only observed between tasks; a running task is never
//! interrupted.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::types::{BackportRequest, RepoId};

use super::message::QueueMessage;

/// Channel buffer size for queued requests.
pub(crate) const QUEUE_CHANNEL_BUFFER: usize = 100;

/// Executes one queued backport.
pub trait TaskRunner: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    fn run(
        &self,
        request: Arc<BackportRequest>,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Errors from the queue itself, as opposed to the task it ran.
#[derive(Debug, Error)]
pub enum QueueError<E> {
    /// The task ran and failed.
    #[error("task failed: {0}")]
    Failed(E),

    /// The worker has shut down and no longer accepts tasks.
    #[error("task queue is closed")]
    Closed,

    /// The worker stopped before running the task.
    #[error("task was dropped before it ran")]
    Dropped,
}

type TaskResult<R> = Result<<R as TaskRunner>::Output, <R as TaskRunner>::Error>;

/// Resolves when one specific task has finished.
#[derive(Debug)]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    /// Waits for the task to finish and returns its result.
    pub async fn wait(self) -> Result<T, QueueError<E>> {
        match self.rx.await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(QueueError::Failed(e)),
            Err(_) => Err(QueueError::Dropped),
        }
    }
}

/// Cloneable sending half of a [`TaskQueue`].
///
/// Sending waits while the queue's buffer is full, so callers should not
/// hold locks across [`TaskSender::enqueue`].
pub struct TaskSender<R: TaskRunner> {
    tx: mpsc::Sender<QueueMessage<TaskResult<R>>>,
}

impl<R: TaskRunner> Clone for TaskSender<R> {
    fn clone(&self) -> Self {
        TaskSender {
            tx: self.tx.clone(),
        }
    }
}

impl<R: TaskRunner> TaskSender<R> {
    /// Appends a request to the queue.
    pub async fn enqueue(
        &self,
        request: Arc<BackportRequest>,
    ) -> Result<TaskHandle<R::Output, R::Error>, QueueError<R::Error>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueMessage::Run { request, reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(TaskHandle { rx })
    }
}

/// A FIFO queue of backports for one repository.
pub struct TaskQueue<R: TaskRunner> {
    sender: TaskSender<R>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl<R: TaskRunner> TaskQueue<R> {
    /// Spawns the worker task. It stops when `cancel` fires or on
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(repo: RepoId, runner: Arc<R>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CHANNEL_BUFFER);
        let task = tokio::spawn(run_worker(repo, runner, rx, cancel.clone()));
        TaskQueue {
            sender: TaskSender { tx },
            task,
            cancel,
        }
    }

    /// Returns a sender for this queue.
    pub fn sender(&self) -> TaskSender<R> {
        self.sender.clone()
    }

    /// Appends a request to the queue.
    pub async fn enqueue(
        &self,
        request: Arc<BackportRequest>,
    ) -> Result<TaskHandle<R::Output, R::Error>, QueueError<R::Error>> {
        self.sender.enqueue(request).await
    }

    /// Asks the worker to exit once the current task is done.
    ///
    /// Tasks queued behind the shutdown message are dropped.
    pub async fn shutdown(&self) {
        let _ = self.sender.tx.send(QueueMessage::Shutdown).await;
    }

    /// Stops the worker at its next idle point and waits for it to exit.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Whether the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[instrument(skip_all, fields(repo = %repo))]
async fn run_worker<R: TaskRunner>(
    repo: RepoId,
    runner: Arc<R>,
    mut rx: mpsc::Receiver<QueueMessage<TaskResult<R>>>,
    cancel: CancellationToken,
) {
    info!("Task queue worker started");

    loop {
        let message = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Shutdown signal received, stopping task queue");
                break;
            }

            message = rx.recv() => message,
        };

        match message {
            Some(QueueMessage::Run { request, reply }) => {
                debug!(
                    pr = %request.source_pr(),
                    branch = %request.target_branch(),
                    "Running queued backport"
                );
                let result = runner.run(request).await;
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
            Some(QueueMessage::Shutdown) => {
                info!("Shutdown message received");
                break;
            }
            None => break,
        }
    }

    info!("Task queue worker stopped");
}
