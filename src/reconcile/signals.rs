//! Signals computed after the backport pull request exists.

use serde::{Deserialize, Serialize};

/// Size of a pull request's change, as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
}

/// Which reasons for human review fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// The cherry-pick needed the fallback strategy (or skipped commits).
    pub conflicts: bool,

    /// The backport's diff stats differ from the source pull request's.
    pub diff_changed: bool,

    /// One of the backported commits is empty.
    pub empty_commits: bool,

    /// One of the backported commits says `[skip ci]`.
    pub skip_ci: bool,
}

impl Signals {
    /// Whether the body needs rewriting.
    pub fn any(&self) -> bool {
        self.conflicts || self.diff_changed || self.empty_commits || self.skip_ci
    }

    /// Compares diff stats. Partial requests are expected to differ from
    /// the source pull request, so the signal only fires for full requests.
    pub fn diff_changed(source: &DiffStats, backport: &DiffStats, is_full_request: bool) -> bool {
        is_full_request && source != backport
    }
}
