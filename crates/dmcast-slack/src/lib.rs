//! # dmcast Slack
//! Slack Web API transport, workspace directory resolution, and rate-limited
//! DM dispatch.

pub mod api;
pub mod client;
pub mod directory;

pub use api::{HttpSlackApi, Member, SlackApi};
pub use client::{DispatchResult, SlackClient};
