//! Messages sent to a queue worker.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::types::BackportRequest;

/// Messages that can be sent to a queue worker.
///
/// Workers receive these via `tokio::sync::mpsc` and handle them one at a
/// time, in the order they were sent.
#[derive(Debug)]
pub enum QueueMessage<T> {
    /// Run a backport and report the result on `reply`.
    Run {
        request: Arc<BackportRequest>,
        reply: oneshot::Sender<T>,
    },

    /// Finish the current task, if any, and exit.
    Shutdown,
}
