//! Mapping gateway errors and payloads onto HTTP responses

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::Error;
use crate::model::ProblemDetails;

const PROBLEM_JSON: &str = "application/problem+json";

/// Handler error: wraps [`Error`] and renders it as a problem response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status the error is answered with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_)
            | Error::Json(_)
            | Error::MissingCorrelationId
            | Error::ConflictingDeliveryMode(_)
            | Error::UnsupportedScheme(_)
            | Error::NoDeliveryTarget(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Problem(p) => StatusCode::from_u16(p.status.as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Error::Transport(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn cause(&self) -> Option<&'static str> {
        match &self.0 {
            Error::MissingCorrelationId => Some("MISSING_CORRELATION_ID"),
            Error::ConflictingDeliveryMode(_) => Some("CONFLICTING_DELIVERY_MODE"),
            Error::UnsupportedScheme(_) => Some("UNSUPPORTED_SCHEME"),
            Error::NoDeliveryTarget(_) => Some("NO_DELIVERY_TARGET"),
            Error::PoolExhausted => Some("TRANSACTION_POOL_EXHAUSTED"),
            Error::MissingLink(_) => Some("MISSING_SELF_LINK"),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_client_error() {
            debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }

        if let Error::Problem(downstream) = &self.0 {
            // Relayed verbatim
            let mut response = problem_response(status, &downstream.problem);
            if let Some(retry_after) = downstream.retry_after {
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            return response;
        }

        let mut problem = ProblemDetails::with_status(status).with_detail(self.0.to_string());
        if let Some(cause) = self.cause() {
            problem = problem.with_cause(cause);
        }
        problem_response(status, &problem)
    }
}

fn problem_response(status: StatusCode, problem: &ProblemDetails) -> Response {
    let body = serde_json::to_vec(problem).unwrap_or_default();
    (status, [(header::CONTENT_TYPE, PROBLEM_JSON)], body).into_response()
}

/// JSON response with an optional `Location`
pub fn json_response<T: Serialize>(status: StatusCode, body: &T, location: Option<&str>) -> Response {
    let mut response = match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => return ApiError(Error::Json(e)).into_response(),
    };
    if let Some(value) = location.and_then(|l| HeaderValue::from_str(l).ok()) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// Decode a request body, reporting malformed input as a validation error
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> crate::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::Validation("request body is required".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("malformed request body: {e}")))
}

/// Value of the consumer identity header, if present and non-empty
#[must_use]
pub fn consumer_id(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
