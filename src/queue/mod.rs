//! Serialized execution of backport tasks.
//!
//! # Architecture
//!
//! ```text
//!                                   ┌──────────────────────┐
//!                              ┌──► │   repo A task queue  │ ──► worker A
//! ┌─────────┐   ┌──────────┐   │    └──────────────────────┘
//! │ intake  │──►│ dispatch │ ──┤
//! └─────────┘   │ by repo  │   │    ┌──────────────────────┐
//!               └──────────┘   └──► │   repo B task queue  │ ──► worker B
//!                                   └──────────────────────┘
//! ```
//!
//! Each worker runs one backport at a time, in enqueue order. There is no
//! priority and no automatic retry.

pub mod dispatch;
pub mod message;
pub mod task_queue;

pub use dispatch::Dispatcher;
pub use message::QueueMessage;
pub use task_queue::{QueueError, TaskHandle, TaskQueue, TaskRunner, TaskSender};
