//! Post-push reconciliation of a backport pull request.
//!
//! Once the backport branch is pushed and its pull request opened, a few
//! signals tell whether a human needs to look at it: conflicts during the
//! cherry-pick, a diff that no longer matches the source pull request, empty
//! commits, and commits already carrying `[skip ci]`. When any of them fires,
//! the pull request body is replaced with a warning and a todo list.
//!
//! The same module formats the comment left on the source pull request when
//! a backport fails.

pub mod format;
pub mod signals;

pub use format::{
    LEARN_MORE, STEP_AMEND_SKIP_CI, STEP_REMOVE_EMPTY_COMMITS, STEP_REVIEW_CONFLICTS, WARN_DIFF,
    compose_body, conflict_warning, failure_comment_body, initial_body, todo_steps,
};
pub use signals::{DiffStats, Signals};
