//! Branch/version matching: milestone selection and label carry-over.
//!
//! Everything here is pure; the orchestrator fetches the live milestone and
//! label lists and passes them in.

mod labels;
mod milestone;

pub use labels::{LABEL_BACKPORT_REQUEST, LABEL_TO_REVIEW, labels_for_backport};
pub use milestone::{
    InvalidBranchFormat, Milestone, branch_version, compare_versions, milestone_for_branch,
};
