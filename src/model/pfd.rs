//! Packet flow description management resources

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A PFD transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfdManagement {
    /// Canonical resource link
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Application PFD sets keyed by external application id
    #[serde(default)]
    pub pfd_datas: BTreeMap<String, PfdData>,
    /// Pass-through fields (`pfdReports`, `supportedFeatures`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// PFDs of one application inside a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfdData {
    /// External application id
    #[serde(default)]
    pub external_app_id: String,
    /// Canonical resource link
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Pass-through fields (`pfds`, `allowedDelay`, `cachingTime`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
