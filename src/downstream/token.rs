//! Bearer tokens for downstream calls
//!
//! A token is either configured statically or fetched from the downstream
//! host's token authority with the client-credentials grant. The first call
//! fetches synchronously; after that the cached token is reused until a 401
//! triggers a background refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{DownstreamAuthConfig, EndpointConfig};
use crate::{Error, Result};

enum TokenSource {
    Static(String),
    Authority {
        token_url: String,
        client_id: Option<String>,
        client_secret: Option<String>,
        scope: Option<String>,
    },
}

/// Token authority response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Bearer token cache for one downstream function
pub struct TokenManager {
    /// HTTP client for token requests
    http_client: Client,
    source: TokenSource,
    /// Current token (cached)
    current_token: RwLock<Option<String>>,
    /// Set while a background refresh runs
    refreshing: AtomicBool,
}

impl TokenManager {
    /// Create a token manager
    pub fn new(http_client: Client, endpoint: &EndpointConfig, auth: &DownstreamAuthConfig) -> Self {
        let source = match auth.resolve_bearer_token() {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::Authority {
                token_url: format!(
                    "{}://{}:{}/{}",
                    endpoint.scheme,
                    endpoint.host,
                    endpoint.port,
                    auth.token_path.trim_start_matches('/')
                ),
                client_id: auth.client_id.clone(),
                client_secret: auth.client_secret.clone(),
                scope: auth.scope.clone(),
            },
        };

        Self {
            http_client,
            source,
            current_token: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Current token, fetching one if none is cached
    pub async fn token(&self) -> Result<String> {
        {
            let token = self.current_token.read();
            if let Some(ref t) = *token {
                return Ok(t.clone());
            }
        }

        let token = self.fetch().await?;
        *self.current_token.write() = Some(token.clone());
        Ok(token)
    }

    /// Start a refresh in the background unless one is already running.
    ///
    /// The call that observed the 401 is not retried.
    pub fn refresh_in_background(self: &Arc<Self>) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("Token refresh already in progress");
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match manager.fetch().await {
                Ok(token) => {
                    *manager.current_token.write() = Some(token);
                    info!("Downstream token refreshed");
                }
                Err(e) => {
                    *manager.current_token.write() = None;
                    warn!(error = %e, "Downstream token refresh failed");
                }
            }
            manager.refreshing.store(false, Ordering::Release);
        });
    }

    /// Whether a background refresh is running
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    async fn fetch(&self) -> Result<String> {
        let (token_url, client_id, client_secret, scope) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Authority {
                token_url,
                client_id,
                client_secret,
                scope,
            } => (token_url, client_id, client_secret, scope),
        };

        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials");
        if let Some(id) = client_id {
            params.insert("client_id", id.as_str());
        }
        if let Some(secret) = client_secret {
            params.insert("client_secret", secret.as_str());
        }
        if let Some(scope) = scope {
            params.insert("scope", scope.as_str());
        }

        let response = self
            .http_client
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Token request failed: HTTP {status} - {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Decode(format!("Failed to parse token response: {e}")))?;

        debug!(
            token_url = %token_url,
            expires_in = ?token_response.expires_in,
            "Fetched downstream token"
        );
        Ok(token_response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_auth(token: &str) -> DownstreamAuthConfig {
        DownstreamAuthConfig {
            enabled: true,
            bearer_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_token_is_returned() {
        let manager = TokenManager::new(
            Client::new(),
            &EndpointConfig::default(),
            &static_auth("abc"),
        );
        assert_eq!(manager.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_background_refresh_clears_flag() {
        let manager = Arc::new(TokenManager::new(
            Client::new(),
            &EndpointConfig::default(),
            &static_auth("abc"),
        ));
        manager.refresh_in_background();
        for _ in 0..50 {
            if !manager.is_refreshing() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!manager.is_refreshing());
        assert_eq!(manager.token().await.unwrap(), "abc");
    }

    #[test]
    fn test_authority_url_uses_token_path() {
        let endpoint = EndpointConfig::new("https", "nef.local", 8443, "/api");
        let auth = DownstreamAuthConfig {
            enabled: true,
            ..Default::default()
        };
        let manager = TokenManager::new(Client::new(), &endpoint, &auth);
        match &manager.source {
            TokenSource::Authority { token_url, .. } => {
                assert_eq!(token_url, "https://nef.local:8443/oauth2/token");
            }
            TokenSource::Static(_) => panic!("expected authority source"),
        }
    }
}
