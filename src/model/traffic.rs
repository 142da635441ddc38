//! Traffic influence (steering) resources

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Traffic influence subscription.
///
/// Only the fields the gateway reads or rewrites are typed; everything else
/// travels in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficInfluSub {
    /// AF transaction id, assigned by the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_trans_id: Option<String>,
    /// Events the consumer subscribes to (e.g. `UP_PATH_CHANGE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_events: Option<Vec<String>>,
    /// Where event notifications go
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_destination: Option<String>,
    /// Canonical resource link
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrafficInfluSub {
    /// Whether the payload subscribes to at least one event
    #[must_use]
    pub fn has_subscribed_events(&self) -> bool {
        self.subscribed_events.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Steering event notification posted by the NEF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    /// Transaction the notification belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_trans_id: Option<String>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
