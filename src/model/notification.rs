//! Envelope for notifications pushed over the consumer WebSocket

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of notification relayed to a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// User plane path change
    UpPathChange,
    /// Application session event
    SessionEvent,
    /// Application session termination
    Termination,
}

/// A notification as written to the WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AfNotification {
    /// What happened
    pub kind: NotificationKind,
    /// Session the notification belongs to
    pub app_session_id: String,
    /// Correlation id, for path change events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// When the gateway relayed it
    pub relayed_at: DateTime<Utc>,
    /// The core network payload, unchanged
    pub payload: Value,
}

impl AfNotification {
    /// Wrap a core network payload
    #[must_use]
    pub fn new(kind: NotificationKind, app_session_id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind,
            app_session_id: app_session_id.into(),
            correlation_id: None,
            relayed_at: Utc::now(),
            payload,
        }
    }

    /// Attach a correlation id
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
