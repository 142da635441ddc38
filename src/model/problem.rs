//! RFC 7807 problem details, as exchanged with downstream functions

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Problem Details - RFC 7807 error body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    /// A short, human-readable summary of the problem type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// A human-readable explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Application-specific error cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Invalid parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_params: Vec<InvalidParam>,
    /// Fields outside RFC 7807 (`supportedFeatures`, `accessTokenError`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProblemDetails {
    /// Problem with only a status set
    #[must_use]
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status.as_u16()),
            title: status.canonical_reason().map(String::from),
            ..Default::default()
        }
    }

    /// Set the detail message
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the application-specific cause
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// One-line summary for logs and error messages
    #[must_use]
    pub fn summary(&self) -> String {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => format!("{title} ({detail})"),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => "no details".to_string(),
        }
    }
}

/// Invalid Parameter for `ProblemDetails`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidParam {
    /// Parameter name
    pub param: String,
    /// Reason why the parameter is invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A downstream 4xx/5xx answer, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamProblem {
    /// Status the downstream function answered with
    pub status: StatusCode,
    /// Decoded problem body
    pub problem: ProblemDetails,
    /// Back-off requested by the downstream function (403 on policy flows)
    pub retry_after: Option<Duration>,
}

impl DownstreamProblem {
    /// Build from a status and decoded body
    #[must_use]
    pub fn new(status: StatusCode, problem: ProblemDetails) -> Self {
        Self {
            status,
            problem,
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_details_wire_names() {
        let mut problem = ProblemDetails::with_status(StatusCode::BAD_REQUEST).with_detail("afAppId missing");
        problem.invalid_params.push(InvalidParam {
            param: "afAppId".to_string(),
            reason: Some("mandatory".to_string()),
        });

        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(json["title"], "Bad Request");
        assert_eq!(json["invalidParams"][0]["param"], "afAppId");
        assert!(json.get("type").is_none());
    }

    #[test]
    fn test_problem_details_decodes_sparse_body() {
        let problem: ProblemDetails =
            serde_json::from_str(r#"{"title":"Forbidden","cause":"REQUESTED_SERVICE_NOT_AUTHORIZED"}"#)
                .unwrap();
        assert_eq!(problem.title.as_deref(), Some("Forbidden"));
        assert!(problem.invalid_params.is_empty());
        assert_eq!(problem.summary(), "Forbidden");
    }

    #[test]
    fn test_problem_details_keeps_unknown_fields() {
        let body = r#"{"status":401,"cause":"INVALID_TOKEN","accessTokenError":{"error":"invalid_client"},"supportedFeatures":"0f"}"#;
        let problem: ProblemDetails = serde_json::from_str(body).unwrap();
        assert_eq!(problem.extra["supportedFeatures"], "0f");

        let relayed = serde_json::to_value(&problem).unwrap();
        assert_eq!(relayed["accessTokenError"]["error"], "invalid_client");
        assert_eq!(relayed["cause"], "INVALID_TOKEN");
    }
}
