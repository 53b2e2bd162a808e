//! Pull request bodies and failure comments.
//!
//! Output is a pure function of its inputs so re-annotating an unchanged pull
//! request produces the same text.

use crate::git::cherry_pick::FallbackStrategy;
use crate::types::{BranchName, PrNumber, Sha};

use super::signals::Signals;

/// Footer appended to every body and failure comment.
pub const LEARN_MORE: &str = "\n---\n\nLearn more about backports at https://docs.nextcloud.com/server/stable/go.php?to=developer-backports.";

pub const STEP_REVIEW_CONFLICTS: &str = "Review and resolve any conflicts";
pub const STEP_REMOVE_EMPTY_COMMITS: &str = "Remove all the empty commits";
pub const STEP_AMEND_SKIP_CI: &str = "Amend HEAD commit to remove `[skip ci]` tag";

pub const WARN_DIFF: &str =
    "This backport's changes differ from the original and might be incomplete ⚠️";

/// Maximum length of the error quoted in a failure comment (4KB).
const MAX_ERROR_LEN: usize = 4096;

const DEFAULT_ERROR: &str = "Unknown error";

/// Body the pull request is opened with.
pub fn initial_body(source_pr: PrNumber) -> String {
    format!("Backport of PR {}", source_pr)
}

/// Warning shown when the cherry-pick hit conflicts.
pub fn conflict_warning(strategy: FallbackStrategy) -> String {
    match strategy {
        FallbackStrategy::Disabled => {
            "This backport had conflicts and some commits were skipped, it is likely incomplete ⚠️"
                .to_string()
        }
        strategy => format!(
            "This backport had conflicts that were resolved with the `{}` merge strategy and is likely incomplete ⚠️",
            strategy
        ),
    }
}

/// The checklist items for `signals`, deduplicated, in menu order.
pub fn todo_steps(signals: &Signals) -> Vec<&'static str> {
    let mut steps = Vec::new();
    if signals.conflicts || signals.diff_changed {
        steps.push(STEP_REVIEW_CONFLICTS);
    }
    if signals.empty_commits {
        steps.push(STEP_REMOVE_EMPTY_COMMITS);
    }
    if signals.skip_ci {
        steps.push(STEP_AMEND_SKIP_CI);
    }
    steps
}

/// Builds the annotated body, or `None` when no signal fired.
///
/// A conflict warning takes precedence over the diff warning.
pub fn compose_body(
    source_pr: PrNumber,
    signals: &Signals,
    strategy: FallbackStrategy,
) -> Option<String> {
    if !signals.any() {
        return None;
    }

    let warning = if signals.conflicts {
        Some(conflict_warning(strategy))
    } else if signals.diff_changed {
        Some(WARN_DIFF.to_string())
    } else {
        None
    };

    let mut body = format!("Backport of {}", source_pr);

    if let Some(warning) = warning {
        body.push_str(&format!("\n\n Warning, {}", warning));
    }

    let steps = todo_steps(signals);
    if !steps.is_empty() {
        body.push_str("\n\n## Todo \n");
        let items: Vec<String> = steps.iter().map(|step| format!("- [ ] {}", step)).collect();
        body.push_str(&items.join("\n"));
    }

    body.push_str(LEARN_MORE);
    Some(body)
}

/// Comment left on the source pull request when a backport fails.
///
/// Walks the requester through doing the backport by hand, then quotes the
/// error.
pub fn failure_comment_body(
    target_branch: &BranchName,
    backport_branch: &str,
    commits: &[Sha],
    error: Option<&str>,
) -> String {
    let shas: Vec<&str> = commits.iter().map(|c| c.abbrev(8)).collect();
    let error = truncate_with_suffix(error.unwrap_or(DEFAULT_ERROR), MAX_ERROR_LEN);

    format!(
        "The backport to `{branch}` failed. Please do this backport manually.

```bash
# Switch to the target branch and update it
git checkout {branch}
git pull origin {branch}

# Create the new backport branch
git checkout -b {target}

# Cherry pick the change from the commit sha1 of the change against the default branch
# This might cause conflicts, resolve them
git cherry-pick {shas}

# Push the cherry pick commit to the remote repository and open a pull request
git push origin {target}
```

Error: {error}

{learn_more}",
        branch = target_branch,
        target = backport_branch,
        shas = shas.join(" "),
        error = error,
        learn_more = LEARN_MORE,
    )
}

/// Truncates a string to `max_len` bytes with a suffix, respecting UTF-8.
fn truncate_with_suffix(s: &str, max_len: usize) -> String {
    const SUFFIX: &str = "... [truncated]";

    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len.saturating_sub(SUFFIX.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}{}", &s[..end], SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(conflicts: bool, diff_changed: bool, empty_commits: bool, skip_ci: bool) -> Signals {
        Signals {
            conflicts,
            diff_changed,
            empty_commits,
            skip_ci,
        }
    }

    #[test]
    fn no_signal_no_body() {
        assert_eq!(
            compose_body(PrNumber(42), &Signals::default(), FallbackStrategy::Ours),
            None
        );
    }

    #[test]
    fn conflicts_body() {
        let body = compose_body(
            PrNumber(42),
            &signals(true, false, false, true),
            FallbackStrategy::Ours,
        )
        .unwrap();

        assert_eq!(
            body,
            "Backport of #42\n\n Warning, This backport had conflicts that were resolved with the `ours` merge strategy and is likely incomplete ⚠️\n\n## Todo \n- [ ] Review and resolve any conflicts\n- [ ] Amend HEAD commit to remove `[skip ci]` tag\n---\n\nLearn more about backports at https://docs.nextcloud.com/server/stable/go.php?to=developer-backports."
        );
    }

    #[test]
    fn diff_only_body() {
        let body = compose_body(
            PrNumber(7),
            &signals(false, true, false, false),
            FallbackStrategy::Ours,
        )
        .unwrap();
        assert!(body.starts_with(&format!("Backport of #7\n\n Warning, {}", WARN_DIFF)));
        assert!(body.contains("- [ ] Review and resolve any conflicts"));
    }

    #[test]
    fn conflict_warning_wins_over_diff() {
        let body = compose_body(
            PrNumber(7),
            &signals(true, true, false, false),
            FallbackStrategy::Theirs,
        )
        .unwrap();
        assert!(body.contains("resolved with the `theirs` merge strategy"));
        assert!(!body.contains(WARN_DIFF));
        // Both signals map to the same step, listed once.
        assert_eq!(body.matches(STEP_REVIEW_CONFLICTS).count(), 1);
    }

    #[test]
    fn empty_commits_without_warning() {
        let body = compose_body(
            PrNumber(7),
            &signals(false, false, true, false),
            FallbackStrategy::Ours,
        )
        .unwrap();
        assert_eq!(
            body,
            format!(
                "Backport of #7\n\n## Todo \n- [ ] Remove all the empty commits{}",
                LEARN_MORE
            )
        );
    }

    #[test]
    fn disabled_strategy_warning() {
        assert!(conflict_warning(FallbackStrategy::Disabled).contains("skipped"));
    }

    #[test]
    fn initial_body_references_source() {
        assert_eq!(initial_body(PrNumber(42)), "Backport of PR #42");
    }

    #[test]
    fn failure_comment_matches_template() {
        let branch = BranchName::parse("stable28").unwrap();
        let commits = vec![
            Sha::new("0182735b7bb0ee7904f0622943afe689cdaf50d5"),
            Sha::new("abcdef1234567"),
        ];
        let body = failure_comment_body(&branch, "backport/42/stable28", &commits, Some("boom"));

        let expected = "The backport to `stable28` failed. Please do this backport manually.

```bash
# Switch to the target branch and update it
git checkout stable28
git pull origin stable28

# Create the new backport branch
git checkout -b backport/42/stable28

# Cherry pick the change from the commit sha1 of the change against the default branch
# This might cause conflicts, resolve them
git cherry-pick 0182735b abcdef12

# Push the cherry pick commit to the remote repository and open a pull request
git push origin backport/42/stable28
```

Error: boom

\n---\n\nLearn more about backports at https://docs.nextcloud.com/server/stable/go.php?to=developer-backports.";
        assert_eq!(body, expected);
    }

    #[test]
    fn failure_comment_defaults_error() {
        let branch = BranchName::parse("stable28").unwrap();
        let body = failure_comment_body(&branch, "backport/1/stable28", &[], None);
        assert!(body.contains("Error: Unknown error"));
    }

    #[test]
    fn long_errors_are_truncated() {
        let branch = BranchName::parse("stable28").unwrap();
        let error = "x".repeat(10_000);
        let body = failure_comment_body(&branch, "backport/1/stable28", &[], Some(&error));
        assert!(body.contains("... [truncated]"));
        assert!(body.len() < 6000);
    }

    #[test]
    fn truncation_respects_utf8() {
        let s = "⚠️".repeat(100);
        let truncated = truncate_with_suffix(&s, 50);
        assert!(truncated.len() <= 50);
        assert!(truncated.ends_with("... [truncated]"));
    }

    proptest! {
        #[test]
        fn body_is_deterministic(
            conflicts in any::<bool>(),
            diff_changed in any::<bool>(),
            empty_commits in any::<bool>(),
            skip_ci in any::<bool>(),
            pr in 1u64..100_000,
        ) {
            let s = signals(conflicts, diff_changed, empty_commits, skip_ci);
            let first = compose_body(PrNumber(pr), &s, FallbackStrategy::Ours);
            let second = compose_body(PrNumber(pr), &s, FallbackStrategy::Ours);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.is_some(), s.any());
            if let Some(body) = first {
                let has_todo = body.contains("## Todo");
                prop_assert!(has_todo);
                prop_assert!(body.ends_with(LEARN_MORE));
            }
        }
    }
}
