//! Downstream function client
//!
//! Every call is a single request/response exchange; the full body is read
//! and the status classified into success, structured problem or fatal
//! error. The only retry-like behavior is the background token refresh
//! triggered by a 401, which benefits the next call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;
use tracing::{debug, warn};

use super::token::TokenManager;
use crate::config::FunctionConfig;
use crate::model::{DownstreamProblem, ProblemDetails};
use crate::{Error, Result};

/// Error statuses whose body is expected to be a `ProblemDetails`
const PROBLEM_STATUSES: [u16; 12] = [400, 401, 403, 404, 409, 411, 413, 415, 429, 500, 501, 503];

/// Call family, deciding how a 403 is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    /// Traffic influence and PFD management
    #[default]
    Standard,
    /// Policy authorization: a 403 must carry `Retry-After`
    PolicyAuthorization,
}

/// Per-call options
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Call family
    pub flow: Flow,
    /// Send the body as `application/merge-patch+json`
    pub merge_patch: bool,
}

impl CallOptions {
    /// Options for policy authorization calls
    #[must_use]
    pub fn policy_authorization() -> Self {
        Self {
            flow: Flow::PolicyAuthorization,
            merge_patch: false,
        }
    }

    /// Send the body as a JSON merge patch
    #[must_use]
    pub fn merge_patch(mut self) -> Self {
        self.merge_patch = true;
        self
    }
}

/// A successful downstream answer
#[derive(Debug, Clone)]
pub struct DownstreamResponse<T> {
    /// 2xx status the function answered with
    pub status: StatusCode,
    /// `Location` header, if any
    pub location: Option<String>,
    /// Decoded body; `None` when the body was empty
    pub body: Option<T>,
}

/// One-shot delivery of a notification to a consumer webhook
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POST `payload` to `url`
    async fn deliver(&self, url: &str, payload: &Value) -> Result<()>;
}

/// Client for one downstream function
pub struct DownstreamClient {
    /// Name used in logs
    name: String,
    /// HTTP client
    http: Client,
    /// `scheme://host:port/base-path`
    base_url: String,
    /// Bearer token source, when auth is enabled
    token: Option<Arc<TokenManager>>,
}

impl DownstreamClient {
    /// Create a client for a configured function
    pub fn new(name: &str, config: &FunctionConfig) -> Result<Self> {
        let http = build_http_client(config.timeout)?;
        let token = config
            .auth
            .enabled
            .then(|| Arc::new(TokenManager::new(http.clone(), &config.endpoint, &config.auth)));

        Ok(Self {
            name: name.to_string(),
            http,
            base_url: config.endpoint.base_url(),
            token,
        })
    }

    /// Client for consumer webhooks: no base address, no auth
    pub fn webhook(timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: "webhook".to_string(),
            http: build_http_client(timeout)?,
            base_url: String::new(),
            token: None,
        })
    }

    /// Base address of the function
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `path` relative to the base address
    pub async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: CallOptions,
    ) -> Result<DownstreamResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.send_to(method, &url, body, options).await
    }

    /// GET `path`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: CallOptions) -> Result<DownstreamResponse<T>> {
        self.send::<Value, T>(Method::GET, path, None, options).await
    }

    /// DELETE `path`
    pub async fn delete(&self, path: &str, options: CallOptions) -> Result<DownstreamResponse<Value>> {
        self.send::<Value, Value>(Method::DELETE, path, None, options).await
    }

    /// Call an absolute URL
    pub async fn send_to<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        options: CallOptions,
    ) -> Result<DownstreamResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (status, headers, bytes) = self.execute(&method, url, body, options).await?;

        match classify::<T>(status, &headers, &bytes, options.flow) {
            Ok(body) => Ok(DownstreamResponse {
                status,
                location: headers
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
                body,
            }),
            Err(e) => {
                warn!(
                    downstream = %self.name,
                    method = %method,
                    url = %url,
                    status = status.as_u16(),
                    error = %e,
                    "Downstream call failed"
                );
                Err(e)
            }
        }
    }

    async fn execute<B>(
        &self,
        method: &Method,
        url: &str,
        body: Option<&B>,
        options: CallOptions,
    ) -> Result<(StatusCode, HeaderMap, Bytes)>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(header::ACCEPT, "application/json, application/problem+json");

        if let Some(body) = body {
            let content_type = if options.merge_patch {
                "application/merge-patch+json"
            } else {
                "application/json"
            };
            request = request
                .header(header::CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(body)?);
        }

        if let Some(token) = &self.token {
            request = request.bearer_auth(token.token().await?);
        }

        debug!(downstream = %self.name, method = %method, url = %url, "Calling downstream");

        let response = request.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                Error::Timeout(format!("{method} {url}"))
            } else {
                Error::Transport(format!("{method} {url}: {e}"))
            };
            warn!(downstream = %self.name, error = %err, "Downstream request failed");
            err
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read {method} {url} body: {e}")))?;

        if status == StatusCode::UNAUTHORIZED {
            if let Some(token) = &self.token {
                token.refresh_in_background();
            }
        }

        Ok((status, headers, bytes))
    }
}

#[async_trait]
impl WebhookSender for DownstreamClient {
    async fn deliver(&self, url: &str, payload: &Value) -> Result<()> {
        let (status, headers, bytes) = self
            .execute(&Method::POST, url, Some(payload), CallOptions::default())
            .await?;
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Webhook delivered");
            return Ok(());
        }
        classify::<IgnoredAny>(status, &headers, &bytes, Flow::Standard).map(|_| ())
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| Error::Transport(e.to_string()))
}

/// Classify a downstream answer.
///
/// Returns the decoded body for 2xx (`None` when empty) and a typed error
/// otherwise.
pub fn classify<T: DeserializeOwned>(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    flow: Flow,
) -> Result<Option<T>> {
    if status.is_success() {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        return serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| Error::Decode(format!("{status} body: {e}")));
    }

    if status == StatusCode::FORBIDDEN && flow == Flow::PolicyAuthorization {
        let retry_after = parse_retry_after(headers).ok_or(Error::MissingRetryAfter)?;
        let mut problem = decode_problem(status, body)?;
        problem.retry_after = Some(retry_after);
        return Err(Error::Problem(problem));
    }

    if PROBLEM_STATUSES.contains(&status.as_u16()) {
        return Err(Error::Problem(decode_problem(status, body)?));
    }

    Err(Error::UnexpectedStatus {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

fn decode_problem(status: StatusCode, body: &[u8]) -> Result<DownstreamProblem> {
    let problem: ProblemDetails = serde_json::from_slice(body)
        .map_err(|e| Error::Decode(format!("problem body of {status}: {e}")))?;
    Ok(DownstreamProblem::new(status, problem))
}

/// `Retry-After` as delay-seconds or HTTP-date
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;

    fn problem_body(status: u16) -> Vec<u8> {
        serde_json::to_vec(&json!({"status": status, "title": "boom", "cause": "X"})).unwrap()
    }

    #[test]
    fn test_success_decodes_body() {
        let body = serde_json::to_vec(&json!({"afAppId": "app"})).unwrap();
        let decoded: Option<Value> =
            classify(StatusCode::OK, &HeaderMap::new(), &body, Flow::Standard).unwrap();
        assert_eq!(decoded.unwrap()["afAppId"], "app");
    }

    #[test]
    fn test_success_with_empty_body() {
        let decoded: Option<Value> =
            classify(StatusCode::NO_CONTENT, &HeaderMap::new(), b"", Flow::Standard).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_success_with_garbage_is_decode_error() {
        let result: Result<Option<Value>> =
            classify(StatusCode::OK, &HeaderMap::new(), b"<html>", Flow::Standard);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_allow_listed_status_is_problem() {
        let result: Result<Option<Value>> = classify(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            &problem_body(404),
            Flow::Standard,
        );
        match result {
            Err(Error::Problem(p)) => {
                assert_eq!(p.status, StatusCode::NOT_FOUND);
                assert_eq!(p.problem.title.as_deref(), Some("boom"));
                assert!(p.retry_after.is_none());
            }
            other => panic!("expected problem, got {other:?}"),
        }
    }

    #[test]
    fn test_problem_with_undecodable_body_is_fatal() {
        let result: Result<Option<Value>> =
            classify(StatusCode::BAD_REQUEST, &HeaderMap::new(), b"nope", Flow::Standard);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_unlisted_status_is_unexpected() {
        let result: Result<Option<Value>> =
            classify(StatusCode::IM_A_TEAPOT, &HeaderMap::new(), b"short and stout", Flow::Standard);
        match result {
            Err(Error::UnexpectedStatus { status, body }) => {
                assert_eq!(status, 418);
                assert_eq!(body, "short and stout");
            }
            other => panic!("expected unexpected status, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_forbidden_requires_retry_after() {
        let result: Result<Option<Value>> = classify(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            &problem_body(403),
            Flow::PolicyAuthorization,
        );
        assert!(matches!(result, Err(Error::MissingRetryAfter)));

        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("30"));
        let result: Result<Option<Value>> = classify(
            StatusCode::FORBIDDEN,
            &headers,
            &problem_body(403),
            Flow::PolicyAuthorization,
        );
        match result {
            Err(Error::Problem(p)) => assert_eq!(p.retry_after, Some(Duration::from_secs(30))),
            other => panic!("expected problem with retry-after, got {other:?}"),
        }
    }

    #[test]
    fn test_standard_forbidden_is_plain_problem() {
        let result: Result<Option<Value>> = classify(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            &problem_body(403),
            Flow::Standard,
        );
        assert!(matches!(result, Err(Error::Problem(p)) if p.retry_after.is_none()));
    }

    #[test]
    fn test_retry_after_http_date_in_past_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_garbage_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}
