//! Calls to downstream network functions (NEF, PCF) and consumer webhooks

mod client;
mod token;

pub use client::{
    CallOptions, DownstreamClient, DownstreamResponse, Flow, WebhookSender, classify,
    parse_retry_after,
};
pub use token::TokenManager;
