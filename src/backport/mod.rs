//! Backport orchestration: one request in, one pull request out.

mod engine;
mod error;

pub use engine::BackportEngine;
pub use error::{AnnotationError, BackportError};
