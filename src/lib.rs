//! Backport Bot - a GitHub App that backports merged pull requests onto
//! release branches.
//!
//! Maintainers comment `/backport to <branch>` (or `/backport <sha>... to
//! <branch>`) on a pull request. Once it is merged, the bot cherry-picks the
//! commits onto a fresh branch, pushes it and opens a pull request against
//! the release branch, copying reviewers, labels and the milestone.

pub mod backport;
pub mod commands;
pub mod config;
pub mod git;
pub mod github;
pub mod intake;
pub mod matcher;
pub mod queue;
pub mod reconcile;
pub mod server;
pub mod types;
pub mod webhooks;
