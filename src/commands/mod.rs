//! Command parsing for `/backport` comments.
//!
//! Users request backports by commenting on a pull request:
//!
//! - `/backport to <branch>` - backport every commit of the pull request
//! - `/backport <sha> [<sha> ...] to <branch>` - backport specific commits
//!
//! # Example
//!
//! ```
//! use backport_bot::commands::parse_backport_command;
//!
//! let cmd = parse_backport_command("/backport 0182735b to stable28").unwrap();
//! assert_eq!(cmd.commits.len(), 1);
//! assert_eq!(cmd.branch.as_str(), "stable28");
//! ```

mod parser;
mod types;

pub use parser::{
    COMMAND_PREFIX, extract_branch, extract_commits, is_backport_command, is_full_request,
    latest_per_branch, parse_backport_command,
};
pub use types::{BackportCommand, CommandError, CommentCommand};
