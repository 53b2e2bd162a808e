//! Applying commits onto the backport branch.
//!
//! Each commit is first cherry-picked as-is. If that fails the pick is
//! aborted and retried once with a merge strategy option (`-X ours` by
//! default) that resolves textual conflicts in favor of one side. A commit that
//! fails both attempts is skipped; the remaining commits are still applied.
//!
//! When any conflict occurred, the last applied commit is amended with
//! `[skip ci]` so CI doesn't run against a possibly incomplete backport.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::Sha;

use super::{
    GitConfig, GitResult, SKIP_CI_MARKER, git_command, git_commit_command, output_with_timeout,
    run_git, run_git_commit, run_git_stdout,
};

/// How a conflicting commit is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackStrategy {
    /// Retry with `-X ours`: conflicting hunks keep the target branch's content.
    #[default]
    Ours,
    /// Retry with `-X theirs`: conflicting hunks take the backported content.
    Theirs,
    /// No retry; conflicting commits are skipped.
    Disabled,
}

impl FallbackStrategy {
    fn strategy_option(self) -> Option<&'static str> {
        match self {
            FallbackStrategy::Ours => Some("ours"),
            FallbackStrategy::Theirs => Some("theirs"),
            FallbackStrategy::Disabled => None,
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy_option().unwrap_or("none"))
    }
}

/// Unrecognized fallback strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown conflict strategy `{0}` (expected ours, theirs or none)")]
pub struct ParseStrategyError(pub String);

impl FromStr for FallbackStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ours" => Ok(FallbackStrategy::Ours),
            "theirs" => Ok(FallbackStrategy::Theirs),
            "none" => Ok(FallbackStrategy::Disabled),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

/// Whether every commit applied without conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CherryPickStatus {
    Clean,
    HadConflicts,
}

/// What happened while applying a commit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CherryPickOutcome {
    pub status: CherryPickStatus,

    /// The last source commit that ended up applied, if any.
    pub last_applied: Option<Sha>,

    /// Commits dropped because the fallback failed too (or was disabled).
    pub skipped: Vec<Sha>,
}

impl CherryPickOutcome {
    pub fn had_conflicts(&self) -> bool {
        self.status == CherryPickStatus::HadConflicts
    }
}

/// Applies `commits` in order onto the branch checked out in `worktree`.
///
/// Only git being unusable (timeouts, IO errors, a failed amend) is an error;
/// conflicts are reported through the outcome.
pub fn cherry_pick_commits(
    config: &GitConfig,
    worktree: &Path,
    commits: &[Sha],
    strategy: FallbackStrategy,
) -> GitResult<CherryPickOutcome> {
    let mut outcome = CherryPickOutcome {
        status: CherryPickStatus::Clean,
        last_applied: None,
        skipped: Vec::new(),
    };

    for commit in commits {
        debug!(commit = %commit.short(), "Cherry-picking");

        if try_cherry_pick(config, worktree, commit, &[])? {
            outcome.last_applied = Some(commit.clone());
            continue;
        }

        abort_cherry_pick(config, worktree)?;
        outcome.status = CherryPickStatus::HadConflicts;

        let Some(option) = strategy.strategy_option() else {
            warn!(commit = %commit.short(), "Cherry-pick failed, skipping commit");
            outcome.skipped.push(commit.clone());
            continue;
        };

        info!(commit = %commit.short(), strategy = option, "Cherry-pick failed, retrying with fallback strategy");
        let fallback = ["-X", option, "--keep-redundant-commits"];
        if try_cherry_pick(config, worktree, commit, &fallback)? {
            outcome.last_applied = Some(commit.clone());
            continue;
        }

        abort_cherry_pick(config, worktree)?;
        warn!(commit = %commit.short(), "Cherry-pick aborted, skipping commit");
        outcome.skipped.push(commit.clone());
    }

    if outcome.had_conflicts()
        && let Some(last) = &outcome.last_applied
    {
        mark_skip_ci(config, worktree, last)?;
    }

    Ok(outcome)
}

/// Returns whether the pick succeeded. A non-zero exit is not an error.
fn try_cherry_pick(
    config: &GitConfig,
    worktree: &Path,
    commit: &Sha,
    extra: &[&str],
) -> GitResult<bool> {
    let mut args = vec!["cherry-pick"];
    args.extend_from_slice(extra);
    args.push(commit.as_str());

    let output = output_with_timeout(
        git_commit_command(worktree, &config.commit_identity),
        &args,
        config.timeout,
    )?;

    if !output.status.success() {
        debug!(
            commit = %commit.short(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Cherry-pick exited with failure"
        );
    }
    Ok(output.status.success())
}

/// Aborts an in-progress cherry-pick, if there is one.
fn abort_cherry_pick(config: &GitConfig, worktree: &Path) -> GitResult<()> {
    let output = output_with_timeout(
        git_command(worktree),
        &["cherry-pick", "--abort"],
        config.timeout,
    )?;
    if !output.status.success() {
        // Nothing in progress (e.g. the commit didn't resolve); make sure the
        // tree is clean anyway.
        run_git(worktree, &["reset", "-q", "--hard"], config.timeout)?;
    }
    Ok(())
}

/// Amends HEAD with `source`'s message followed by the skip-CI marker.
fn mark_skip_ci(config: &GitConfig, worktree: &Path, source: &Sha) -> GitResult<()> {
    let original = match commit_message(config, worktree, source.as_str()) {
        Ok(message) => message,
        Err(e) => {
            warn!(commit = %source.short(), error = %e, "Could not read original message, amending HEAD's");
            commit_message(config, worktree, "HEAD")?
        }
    };

    let message = format!("{}\n\n{}", original.trim_end(), SKIP_CI_MARKER);
    run_git_commit(
        worktree,
        &config.commit_identity,
        &[
            "commit",
            "-q",
            "--amend",
            "--allow-empty",
            "--cleanup=whitespace",
            "-m",
            &message,
        ],
        config.timeout,
    )?;

    info!(commit = %source.short(), "Amended last commit with skip-CI marker");
    Ok(())
}

fn commit_message(config: &GitConfig, worktree: &Path, rev: &str) -> GitResult<String> {
    run_git_stdout(
        worktree,
        &["log", "--format=%B", "-n", "1", rev],
        config.timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{TestRemote, subjects};
    use crate::git::workspace::{TaskWorkspace, create_task_workspace, ensure_cached_clone};
    use crate::types::BranchName;

    /// Remote with `stable` branched from `main`, then both editing README.md.
    ///
    /// Returns the two main commits: `clean` adds a new file, `conflicting`
    /// edits README.md and adds `b.txt`.
    fn diverged_remote() -> (TestRemote, Sha, Sha) {
        let remote = TestRemote::new();
        remote.create_branch("stable", "main");
        remote.commit_file("stable", "README.md", "# Stable\n", "Stable readme");

        let clean = remote.commit_file("main", "a.txt", "a\n", "Add a");
        let seed = remote.seed_path();
        crate::git::test_support::write_file(&seed, "b.txt", "b\n");
        let conflicting = remote.commit_file("main", "README.md", "# Main\n", "Main readme and b");

        (remote, clean, conflicting)
    }

    fn workspace(remote: &TestRemote) -> TaskWorkspace {
        let clone = ensure_cached_clone(&remote.config, &remote.repo).unwrap();
        create_task_workspace(
            &remote.config,
            &clone,
            &BranchName::parse("stable").unwrap(),
            "backport/1/stable",
        )
        .unwrap()
    }

    fn head_message(remote: &TestRemote, ws: &TaskWorkspace) -> String {
        commit_message(&remote.config, ws.path(), "HEAD").unwrap()
    }

    #[test]
    fn clean_commits_apply_in_order() {
        let remote = TestRemote::new();
        remote.create_branch("stable", "main");
        let first = remote.commit_file("main", "one.txt", "1\n", "First");
        let second = remote.commit_file("main", "two.txt", "2\n", "Second");
        let ws = workspace(&remote);

        let outcome = cherry_pick_commits(
            &remote.config,
            ws.path(),
            &[first, second.clone()],
            FallbackStrategy::Ours,
        )
        .unwrap();

        assert_eq!(outcome.status, CherryPickStatus::Clean);
        assert_eq!(outcome.last_applied, Some(second));
        assert!(outcome.skipped.is_empty());
        assert_eq!(subjects(ws.path(), "HEAD", 2), vec!["Second", "First"]);
        assert!(!head_message(&remote, &ws).contains(SKIP_CI_MARKER));
    }

    #[test]
    fn conflicting_commit_applies_with_ours() {
        let (remote, clean, conflicting) = diverged_remote();
        let ws = workspace(&remote);

        let outcome = cherry_pick_commits(
            &remote.config,
            ws.path(),
            &[clean, conflicting.clone()],
            FallbackStrategy::Ours,
        )
        .unwrap();

        assert_eq!(outcome.status, CherryPickStatus::HadConflicts);
        assert_eq!(outcome.last_applied, Some(conflicting));
        assert!(outcome.skipped.is_empty());

        assert_eq!(subjects(ws.path(), "HEAD", 2), vec!["Main readme and b", "Add a"]);
        let readme = std::fs::read_to_string(ws.path().join("README.md")).unwrap();
        assert_eq!(readme, "# Stable\n");
        assert!(ws.path().join("b.txt").exists());

        let message = head_message(&remote, &ws);
        assert_eq!(message, "Main readme and b\n\n[skip ci]");
    }

    #[test]
    fn conflicting_commit_applies_with_theirs() {
        let (remote, _, conflicting) = diverged_remote();
        let ws = workspace(&remote);

        let outcome = cherry_pick_commits(
            &remote.config,
            ws.path(),
            &[conflicting],
            FallbackStrategy::Theirs,
        )
        .unwrap();

        assert!(outcome.had_conflicts());
        let readme = std::fs::read_to_string(ws.path().join("README.md")).unwrap();
        assert_eq!(readme, "# Main\n");
    }

    #[test]
    fn disabled_fallback_skips_conflicting_commit() {
        let (remote, clean, conflicting) = diverged_remote();
        let ws = workspace(&remote);

        let outcome = cherry_pick_commits(
            &remote.config,
            ws.path(),
            &[clean.clone(), conflicting.clone()],
            FallbackStrategy::Disabled,
        )
        .unwrap();

        assert!(outcome.had_conflicts());
        assert_eq!(outcome.last_applied, Some(clean));
        assert_eq!(outcome.skipped, vec![conflicting]);
        assert_eq!(subjects(ws.path(), "HEAD", 1), vec!["Add a"]);
        assert!(head_message(&remote, &ws).ends_with(SKIP_CI_MARKER));

        let status = run_git_stdout(ws.path(), &["status", "--porcelain"], remote.config.timeout)
            .unwrap();
        assert!(status.is_empty(), "tree not clean: {status}");
    }

    #[test]
    fn unknown_commit_is_skipped() {
        let remote = TestRemote::new();
        remote.create_branch("stable", "main");
        let ws = workspace(&remote);
        let bogus = Sha::new("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");

        let outcome = cherry_pick_commits(
            &remote.config,
            ws.path(),
            std::slice::from_ref(&bogus),
            FallbackStrategy::Ours,
        )
        .unwrap();

        assert!(outcome.had_conflicts());
        assert_eq!(outcome.last_applied, None);
        assert_eq!(outcome.skipped, vec![bogus]);
    }

    #[test]
    fn empty_list_is_clean() {
        let remote = TestRemote::new();
        remote.create_branch("stable", "main");
        let ws = workspace(&remote);

        let outcome =
            cherry_pick_commits(&remote.config, ws.path(), &[], FallbackStrategy::Ours).unwrap();
        assert_eq!(outcome.status, CherryPickStatus::Clean);
        assert_eq!(outcome.last_applied, None);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("ours".parse(), Ok(FallbackStrategy::Ours));
        assert_eq!(" Theirs ".parse(), Ok(FallbackStrategy::Theirs));
        assert_eq!("none".parse(), Ok(FallbackStrategy::Disabled));
        assert!("recursive".parse::<FallbackStrategy>().is_err());
        assert_eq!(FallbackStrategy::default(), FallbackStrategy::Ours);
        assert_eq!(FallbackStrategy::Disabled.to_string(), "none");
    }
}
