//! Milestone selection for backport pull requests.
//!
//! Release branches carry a version in their name (`stable28`, `stable-3.11`).
//! The backport is filed under the earliest open milestone whose title mentions
//! that version, so `stable26` with `Nextcloud 26.0.9` and `Nextcloud 26.0.10`
//! open lands in `26.0.9`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^0-9]+([0-9.]+)").expect("static regex"));

/// An open milestone of the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
}

/// The branch name carries no version number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not extract version from branch `{branch}`")]
pub struct InvalidBranchFormat {
    pub branch: String,
}

/// Extracts the dotted version following the branch's non-numeric prefix.
pub fn branch_version(branch: &str) -> Result<&str, InvalidBranchFormat> {
    VERSION_PATTERN
        .captures(branch)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| InvalidBranchFormat {
            branch: branch.to_string(),
        })
}

/// Picks the milestone a backport to `branch` belongs to.
///
/// Returns `Ok(None)` when no milestone mentions the branch's version. Fails
/// only if the branch name has no version at all.
pub fn milestone_for_branch<'a>(
    branch: &str,
    milestones: &'a [Milestone],
) -> Result<Option<&'a Milestone>, InvalidBranchFormat> {
    let version = branch_version(branch)?;

    let mut candidates: Vec<&Milestone> = milestones
        .iter()
        .filter(|m| m.title.contains(version))
        .collect();
    // sort_by is stable: equal titles keep their listing order
    candidates.sort_by(|a, b| compare_versions(&a.title, &b.title));

    Ok(candidates.into_iter().next())
}

/// Compares two titles as dot-separated versions.
///
/// Segments are compared numerically over the shorter length; a segment that
/// is not a number counts as 0. When all compared segments are equal, the
/// title with more segments sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();

    for (a_part, b_part) in a_parts.iter().zip(&b_parts) {
        let ordering = segment_value(a_part).total_cmp(&segment_value(b_part));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    b_parts.len().cmp(&a_parts.len())
}

fn segment_value(segment: &str) -> f64 {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if !value.is_nan() => value,
        _ => 0.0,
    }
}
