//! Policy authorization (application session) resources

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application session context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSessionContext {
    /// Request data supplied by the AF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asc_req_data: Option<AppSessionContextReqData>,
    /// Where the consumer can open its notification WebSocket.
    /// Gateway extension, never sent downstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket_uri: Option<String>,
    /// Pass-through fields (`ascRespData`, `evsNotif`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request part of an application session context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSessionContextReqData {
    /// Routing requirement for the whole session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_rout_req: Option<RoutingRequirement>,
    /// Media components keyed by component number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub med_components: Option<BTreeMap<String, MediaComponent>>,
    /// Termination notification address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notif_uri: Option<String>,
    /// Event subscription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_subsc: Option<EventsSubscReqData>,
    /// Ask for notifications over the gateway WebSocket.
    /// Gateway extension, stripped before forwarding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_websocket_uri: Option<bool>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of an application session PATCH
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSessionContextUpdateDataPatch {
    /// Modifications to the request data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asc_req_data: Option<AppSessionContextUpdateData>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Modifiable part of an application session context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSessionContextUpdateData {
    /// Routing requirement for the whole session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_rout_req: Option<RoutingRequirement>,
    /// Media components keyed by component number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub med_components: Option<BTreeMap<String, MediaComponent>>,
    /// Event subscription
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_subsc: Option<EventsSubscReqData>,
    /// Gateway extension, stripped before forwarding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_websocket_uri: Option<bool>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Media component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaComponent {
    /// Routing requirement for this component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub af_rout_req: Option<RoutingRequirement>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// AF routing requirement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRequirement {
    /// Subscription to user plane path change events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_path_chg_sub: Option<UpPathChgEvent>,
    /// Pass-through fields (`routeToLocs`, `tempVals`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User plane path change subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpPathChgEvent {
    /// Where path change notifications go
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_uri: Option<String>,
    /// Correlation id of the notification stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notif_corre_id: Option<String>,
    /// Pass-through fields (`dnaiChgType`, `afAckInd`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event subscription of an application session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsSubscReqData {
    /// Where session event notifications go
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notif_uri: Option<String>,
    /// Pass-through fields (`events`, `reqQosMonParams`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session event notification posted by the PCF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsNotification {
    /// Events subscription resource the notification belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_subs_uri: Option<String>,
    /// Pass-through fields (`evNotifs`, `accessType`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session termination request posted by the PCF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationInfo {
    /// Application session resource being terminated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_uri: Option<String>,
    /// Termination cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_cause: Option<String>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User plane path change notification posted by the SMF/PCF chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsmfEventExposureNotification {
    /// Correlation id (`notifCorreId` of the subscription)
    #[serde(default)]
    pub notif_id: String,
    /// Reported events
    #[serde(default)]
    pub event_notifs: Vec<Value>,
    /// Pass-through fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
