//! Error types for the AF gateway

use std::io;

use thiserror::Error;

use crate::model::DownstreamProblem;

/// Result type alias for the AF gateway
pub type Result<T> = std::result::Result<T, Error>;

/// AF gateway errors
///
/// Components return these to their callers; only the HTTP handler layer
/// (`gateway::response`) turns one into a wire status and problem body.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed inbound payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Structured problem returned by a downstream function
    #[error("Downstream problem {}: {}", .0.status, .0.problem.summary())]
    Problem(DownstreamProblem),

    /// Downstream answered 403 on a policy-authorization flow without `Retry-After`
    #[error("Downstream returned 403 without a Retry-After header")]
    MissingRetryAfter,

    /// Downstream answered with a status outside the allow-list
    #[error("Unexpected downstream status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Downstream payload could not be decoded
    #[error("Failed to decode downstream payload: {0}")]
    Decode(String),

    /// Downstream call failed at the transport level
    #[error("Transport error: {0}")]
    Transport(String),

    /// Downstream call exceeded its per-call timeout
    #[error("Downstream timeout: {0}")]
    Timeout(String),

    /// A routing requirement subscribes to path changes without a correlation id
    #[error("Routing requirement is missing its notification correlation id")]
    MissingCorrelationId,

    /// Socket delivery is active and an explicit notification address was also supplied
    #[error("Notification address supplied for correlation id {0} while socket delivery is active")]
    ConflictingDeliveryMode(String),

    /// Notification address is not http or https
    #[error("Unsupported notification address scheme: {0}")]
    UnsupportedScheme(String),

    /// Neither a notification address nor socket delivery was requested
    #[error("No notification address and no socket delivery for correlation id {0}")]
    NoDeliveryTarget(String),

    /// All transaction identifiers are in use
    #[error("Transaction identifier pool exhausted")]
    PoolExhausted,

    /// Downstream payload omitted its self-link
    #[error("Downstream response is missing its {0} link")]
    MissingLink(&'static str),

    /// Unknown resource, correlation id or consumer
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistent connection was already closed when written to
    #[error("Connection closed for consumer {0}")]
    ConnectionClosed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error stems from the caller's request rather than the gateway
    /// or a downstream function.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_)
            | Self::MissingCorrelationId
            | Self::ConflictingDeliveryMode(_)
            | Self::UnsupportedScheme(_)
            | Self::NoDeliveryTarget(_)
            | Self::Json(_)
            | Self::NotFound(_) => true,
            Self::Problem(p) => p.status.is_client_error(),
            _ => false,
        }
    }
}
