//! Downstream calls with tokens from a token authority

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use af_gateway::Error;
use af_gateway::config::{DownstreamAuthConfig, EndpointConfig, FunctionConfig};
use af_gateway::downstream::{CallOptions, DownstreamClient};
use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::spawn;

/// Token authority handing out `t1`, `t2`, ... and a resource accepting only `t2`
async fn fake_function() -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);

    let router = Router::new()
        .route(
            "/oauth2/token",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({"access_token": format!("t{n}"), "token_type": "Bearer", "expires_in": 3600}))
                }
            }),
        )
        .route(
            "/resource",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer t2" {
                    Json(json!({"authorization": auth})).into_response()
                } else {
                    let problem = json!({"status": 401, "title": "Unauthorized", "cause": "TOKEN_EXPIRED"});
                    (StatusCode::UNAUTHORIZED, Json(problem)).into_response()
                }
            }),
        );

    (spawn(router).await, issued)
}

fn client_for(addr: std::net::SocketAddr) -> DownstreamClient {
    let config = FunctionConfig {
        endpoint: EndpointConfig::new("http", "127.0.0.1", addr.port(), ""),
        timeout: Duration::from_secs(2),
        auth: DownstreamAuthConfig {
            enabled: true,
            client_id: Some("af".to_string()),
            client_secret: Some("secret".to_string()),
            ..Default::default()
        },
    };
    DownstreamClient::new("nef", &config).unwrap()
}

#[tokio::test]
async fn test_unauthorized_call_refreshes_token_for_next_call() {
    let (addr, issued) = fake_function().await;
    let client = client_for(addr);

    let first = client.get::<Value>("/resource", CallOptions::default()).await;
    match first {
        Err(Error::Problem(problem)) => {
            assert_eq!(problem.status.as_u16(), 401);
            assert_eq!(problem.problem.cause.as_deref(), Some("TOKEN_EXPIRED"));
        }
        other => panic!("expected a 401 problem, got {other:?}"),
    }

    // The refresh runs in the background
    for _ in 0..100 {
        if issued.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(issued.load(Ordering::SeqCst), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = client.get::<Value>("/resource", CallOptions::default()).await.unwrap();
    assert_eq!(second.status.as_u16(), 200);
    assert_eq!(second.body.unwrap()["authorization"], "Bearer t2");
    assert_eq!(issued.load(Ordering::SeqCst), 2);
}
