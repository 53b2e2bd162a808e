//! Parser for `/backport` commands in comment text.
//!
//! This module provides a pure parser that extracts structured commands from
//! unstructured GitHub comment text.
//!
//! Grammar (first line of the comment only):
//!
//! ```text
//! /backport[!] [<commit> ...] to <branch>
//! ```
//!
//! Tokens starting with `!` are flags and are ignored. Every other token before
//! ` to ` must be a 7 to 40 character hex commit id.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{BranchName, Sha};

use super::types::{BackportCommand, CommandError, CommentCommand};

/// Prefix every backport command starts with.
pub const COMMAND_PREFIX: &str = "/backport";

const TO_SEPARATOR: &str = " to ";

static COMMIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[0-9a-f]{7,40}$").expect("static regex"));

/// Returns true if the comment looks like a backport command at all.
pub fn is_backport_command(body: &str) -> bool {
    body.trim().starts_with(COMMAND_PREFIX)
}

/// Returns true for the full-request form `/backport to <branch>`.
pub fn is_full_request(body: &str) -> bool {
    body.trim().starts_with(&format!("{}{}", COMMAND_PREFIX, TO_SEPARATOR))
}

/// Parses a backport command.
///
/// Commits are validated before the branch. A partial request that names no
/// commits (e.g. `/backport! to stable28`) is rejected.
///
/// # Examples
///
/// ```
/// use backport_bot::commands::parse_backport_command;
///
/// let cmd = parse_backport_command("/backport to stable28").unwrap();
/// assert!(cmd.commits.is_empty());
/// assert!(cmd.is_full_request);
/// assert_eq!(cmd.branch.as_str(), "stable28");
///
/// assert!(parse_backport_command("/backport 123 to stable28").is_err());
/// ```
pub fn parse_backport_command(body: &str) -> Result<BackportCommand, CommandError> {
    let commits = extract_commits(body)?;
    let branch = extract_branch(body)?;
    let is_full_request = is_full_request(body);

    if commits.is_empty() && !is_full_request {
        return Err(CommandError::NoCommits);
    }

    Ok(BackportCommand {
        commits,
        branch,
        is_full_request,
    })
}

/// Extracts the explicit commit list from a command.
pub fn extract_commits(body: &str) -> Result<Vec<Sha>, CommandError> {
    let rest = command_line(body)?;
    let chain = match rest.split_once(TO_SEPARATOR) {
        Some((chain, _)) => chain,
        None => rest,
    };

    let mut commits = Vec::new();
    for token in chain.split_whitespace().filter(|t| !t.starts_with('!')) {
        if !COMMIT_PATTERN.is_match(token) {
            return Err(CommandError::InvalidCommits {
                body: body.to_string(),
            });
        }
        commits.push(Sha::new(token));
    }
    Ok(commits)
}

/// Extracts the target branch from the first line of a command.
pub fn extract_branch(body: &str) -> Result<BranchName, CommandError> {
    let rest = command_line(body)?;
    let branch = rest
        .split_once(TO_SEPARATOR)
        .map(|(_, branch)| branch.trim())
        .unwrap_or("");
    Ok(BranchName::parse(branch)?)
}

/// Returns the first line of the comment with the command prefix removed.
fn command_line(body: &str) -> Result<&str, CommandError> {
    let first_line = body.trim_start().lines().next().unwrap_or("");
    first_line
        .strip_prefix(COMMAND_PREFIX)
        .ok_or(CommandError::NotACommand)
}

/// Keeps only the most recent command per target branch.
///
/// `commands` must be in chronological order. The survivors keep that order.
pub fn latest_per_branch(commands: Vec<CommentCommand>) -> Vec<CommentCommand> {
    let mut last_index: HashMap<BranchName, usize> = HashMap::new();
    for (index, cmd) in commands.iter().enumerate() {
        last_index.insert(cmd.command.branch.clone(), index);
    }

    commands
        .into_iter()
        .enumerate()
        .filter(|(index, cmd)| last_index.get(&cmd.command.branch) == Some(index))
        .map(|(_, cmd)| cmd)
        .collect()
}
