//! AF Gateway Library
//!
//! Application Function gateway between operator-facing clients and the 5G
//! core network's exposure functions.
//!
//! # Features
//!
//! - **Traffic steering**: traffic influence subscriptions relayed to the NEF,
//!   with gateway-allocated transaction ids
//! - **PFD management**: packet flow description transactions relayed to the NEF
//! - **Policy authorization**: application sessions relayed to the PCF
//! - **Notification delivery**: core network notifications relayed to consumer
//!   webhooks or over a per-consumer WebSocket
//! - **Link rewriting**: downstream self-links re-rooted under the gateway

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod downstream;
pub mod error;
pub mod gateway;
pub mod model;
pub mod notify;
pub mod registry;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))?,
    }

    Ok(())
}
