//! Webhook deliveries: signature verification and payload parsing.

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{
    CommentAction, Delivery, GitHubEvent, IssueCommentEvent, PrAction, PullRequestEvent,
};
pub use parser::{ParseError, parse_webhook};
pub use signature::{SignatureError, SignatureVerifier, parse_signature_header};
