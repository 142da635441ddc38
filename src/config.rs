//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Operator-facing API listener
    pub server: ServerConfig,
    /// Core network notification intake and consumer delivery
    pub notifications: NotificationConfig,
    /// Downstream core network functions
    pub downstream: DownstreamConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or describes unusable endpoints.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AF_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("AF_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Check endpoint settings
    pub fn validate(&self) -> Result<()> {
        self.server.advertised.validate("server.advertised")?;
        self.notifications
            .advertised
            .validate("notifications.advertised")?;
        self.downstream.nef.endpoint.validate("downstream.nef.endpoint")?;
        self.downstream.pcf.endpoint.validate("downstream.pcf.endpoint")?;

        if self.downstream.af_id.is_empty() {
            return Err(Error::Config("downstream.af_id must not be empty".to_string()));
        }
        if self.notifications.consumer_header.is_empty() {
            return Err(Error::Config(
                "notifications.consumer_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in downstream credentials
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        for function in [&mut self.downstream.nef, &mut self.downstream.pcf] {
            let auth = &mut function.auth;
            for value in [
                auth.bearer_token.as_mut(),
                auth.client_id.as_mut(),
                auth.client_secret.as_mut(),
            ]
            .into_iter()
            .flatten()
            {
                *value = Self::expand_string(&re, value);
            }
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// An externally reachable HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// `http` or `https`
    pub scheme: String,
    /// Host name or address
    pub host: String,
    /// Port
    pub port: u16,
    /// Path prefix every resource lives under
    pub base_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 80,
            base_path: String::new(),
        }
    }
}

impl EndpointConfig {
    /// Build an endpoint
    pub fn new(scheme: &str, host: &str, port: u16, base_path: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            base_path: base_path.to_string(),
        }
    }

    /// `scheme://host:port/base-path`, without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> String {
        let path = self.base_path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{path}", self.scheme, self.host, self.port)
        }
    }

    /// Same address with the WebSocket scheme matching `scheme`
    #[must_use]
    pub fn websocket_base_url(&self) -> String {
        let base = self.base_url();
        match base.split_once("://") {
            Some(("https", rest)) => format!("wss://{rest}"),
            Some((_, rest)) => format!("ws://{rest}"),
            None => base,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(Error::Config(format!(
                "{name}.scheme must be http or https, got {:?}",
                self.scheme
            )));
        }
        if self.host.is_empty() {
            return Err(Error::Config(format!("{name}.host must not be empty")));
        }
        url::Url::parse(&self.base_url())
            .map_err(|e| Error::Config(format!("{name} is not a valid address: {e}")))?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How consumers reach this API (used for links and `websocketUri`)
    pub advertised: EndpointConfig,
    /// Request timeout, enforced above the downstream timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
            advertised: EndpointConfig::new("http", "localhost", 8050, "/af/v1"),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Notification intake and delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Host the intake listener binds to
    pub host: String,
    /// Port the intake listener binds to
    pub port: u16,
    /// How core network functions reach the intake listener
    pub advertised: EndpointConfig,
    /// Header carrying the consumer identity at session create and upgrade
    pub consumer_header: String,
    /// Drop a session's event state when the session is deleted
    pub purge_on_session_delete: bool,
    /// Timeout of one webhook delivery
    #[serde(with = "humantime_serde")]
    pub webhook_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8051,
            advertised: EndpointConfig::new("http", "localhost", 8051, "/af/v1/notifications"),
            consumer_header: "x-consumer-id".to_string(),
            purge_on_session_delete: false,
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

/// Downstream functions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// AF identifier used in NEF resource paths
    pub af_id: String,
    /// Network exposure function (traffic influence, PFD management)
    pub nef: FunctionConfig,
    /// Policy control function (policy authorization)
    pub pcf: FunctionConfig,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            af_id: "AF_01".to_string(),
            nef: FunctionConfig {
                endpoint: EndpointConfig::new("http", "localhost", 8060, ""),
                ..Default::default()
            },
            pcf: FunctionConfig {
                endpoint: EndpointConfig::new("http", "localhost", 29507, ""),
                ..Default::default()
            },
        }
    }
}

/// One downstream function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    /// Where the function lives
    pub endpoint: EndpointConfig,
    /// Per-call timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Bearer token settings
    pub auth: DownstreamAuthConfig,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            timeout: Duration::from_secs(10),
            auth: DownstreamAuthConfig::default(),
        }
    }
}

/// Bearer token settings for a downstream function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamAuthConfig {
    /// Attach a bearer token to every call
    pub enabled: bool,
    /// Static token. Supports a literal value or `env:VAR_NAME`.
    /// When unset, tokens come from the token authority.
    pub bearer_token: Option<String>,
    /// Token authority path on the downstream host
    pub token_path: String,
    /// Client id for the client-credentials grant
    pub client_id: Option<String>,
    /// Client secret for the client-credentials grant
    pub client_secret: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
}

impl Default for DownstreamAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bearer_token: None,
            token_path: "/oauth2/token".to_string(),
            client_id: None,
            client_secret: None,
            scope: None,
        }
    }
}

impl DownstreamAuthConfig {
    /// Resolve the static bearer token (expand `env:` references)
    #[must_use]
    pub fn resolve_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|token| {
            if let Some(var_name) = token.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| token.clone())
            } else {
                token.clone()
            }
        })
    }
}
