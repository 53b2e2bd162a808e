//! Core domain types for the backport bot.
//!
//! Identifiers are newtypes so they can't be mixed up, and the request
//! descriptor validates its invariants on construction.

pub mod ids;
pub mod request;

pub use ids::{CommentId, DeliveryId, InstallationId, PrNumber, RepoId, Sha};
pub use request::{BackportRequest, BranchName, RequestError, RequestOrigin};
