//! Shared fixtures: fake core network functions and request helpers

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use af_gateway::config::{Config, EndpointConfig};
use af_gateway::gateway::AppState;
use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Serve `router` on an ephemeral local port
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Gateway configuration pointing at fake NEF and PCF instances
pub fn config(nef: SocketAddr, pcf: SocketAddr) -> Config {
    let mut config = Config::default();
    config.server.advertised = EndpointConfig::new("http", "gw.test", 8050, "/af/v1");
    config.notifications.advertised =
        EndpointConfig::new("http", "gw.test", 8051, "/af/v1/notifications");
    config.downstream.nef.endpoint = EndpointConfig::new("http", "127.0.0.1", nef.port(), "");
    config.downstream.nef.timeout = Duration::from_secs(2);
    config.downstream.pcf.endpoint = EndpointConfig::new("http", "127.0.0.1", pcf.port(), "");
    config.downstream.pcf.timeout = Duration::from_secs(2);
    config.notifications.webhook_timeout = Duration::from_secs(2);
    config
}

/// Gateway state for `config`
pub fn state(config: &Config) -> Arc<AppState> {
    Arc::new(AppState::new(config).unwrap())
}

/// A request seen by a fake server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

/// Records requests reaching a fake server
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    pub fn record(&self, method: &Method, uri: &Uri, body: &Bytes) {
        let body = serde_json::from_slice(body).unwrap_or(Value::Null);
        self.0.lock().push(Recorded {
            method: method.clone(),
            path: uri.path().to_string(),
            body,
        });
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.0.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    pub fn last(&self) -> Recorded {
        self.0.lock().last().cloned().unwrap()
    }

    /// Wait for background deliveries to land
    pub async fn wait_for(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Fake consumer webhook endpoint accepting any POST
pub async fn consumer_webhook() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let seen = recorder.clone();
    let router = Router::new().fallback(move |method: Method, uri: Uri, body: Bytes| {
        let seen = seen.clone();
        async move {
            seen.record(&method, &uri, &body);
            StatusCode::NO_CONTENT
        }
    });
    (spawn(router).await, recorder)
}

/// Answer from a gateway router
pub struct Answer {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send one request through `router`
pub async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Answer {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Answer { status, headers, body }
}
