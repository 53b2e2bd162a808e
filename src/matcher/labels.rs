//! Label carry-over from the source pull request to its backport.

use std::sync::LazyLock;

use regex::Regex;

/// Marker label put on a pull request while backports are pending.
pub const LABEL_BACKPORT_REQUEST: &str = "backport-request";

/// Kanban label added to every backport if the repository defines it.
pub const LABEL_TO_REVIEW: &str = "3. to review";

/// Kanban/workflow labels such as `2. developing` or `4. to release`.
static KANBAN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\.").expect("static regex"));

/// Computes the labels for a backport pull request.
///
/// The review label comes first when the repository has it, followed by the
/// source labels minus the backport marker and kanban labels. No duplicates.
pub fn labels_for_backport(source_labels: &[String], repo_labels: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();

    if repo_labels.iter().any(|l| l == LABEL_TO_REVIEW) {
        labels.push(LABEL_TO_REVIEW.to_string());
    }

    for label in source_labels {
        if label == LABEL_BACKPORT_REQUEST || KANBAN_LABEL.is_match(label) {
            continue;
        }
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    labels
}
