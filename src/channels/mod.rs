//! Chat channel adapters.

pub mod slack;

pub use slack::{SlackChannel, SlackEnvelope, SlackEvent, slack_routes};
