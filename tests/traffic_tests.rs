//! Traffic influence subscriptions through the gateway

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use af_gateway::gateway::{create_api_router, create_intake_router};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{Recorder, call, config, consumer_webhook, spawn, state};

const SUBSCRIPTIONS: &str = "/3gpp-traffic-influence/v1/AF_01/subscriptions";

fn respond(method: &Method, path: &str, body: &Bytes) -> Response {
    match *method {
        Method::POST => {
            let mut subscription: Value = serde_json::from_slice(body).unwrap();
            if subscription["afServiceId"] == "reject" {
                let problem = json!({"status": 400, "title": "Bad Request", "cause": "INVALID_SERVICE"});
                return (StatusCode::BAD_REQUEST, Json(problem)).into_response();
            }
            let link = format!("http://nef.local{path}/11111");
            subscription["self"] = Value::String(link.clone());
            (StatusCode::CREATED, [(header::LOCATION, link)], Json(subscription)).into_response()
        }
        Method::GET => Json(json!({
            "afServiceId": "svc",
            "afTransId": "1",
            "subscribedEvents": ["UP_PATH_CHANGE"],
            "notificationDestination": "http://gw.test:8051/af/v1/notifications/traffic-influence",
            "self": format!("http://nef.local{path}"),
        }))
        .into_response(),
        Method::PUT | Method::PATCH => {
            let mut subscription: Value = serde_json::from_slice(body).unwrap();
            subscription["self"] = Value::String(format!("http://nef.local{path}"));
            Json(subscription).into_response()
        }
        Method::DELETE => StatusCode::NO_CONTENT.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn fake_nef() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let seen = recorder.clone();
    let router = Router::new().fallback(move |method: Method, uri: Uri, body: Bytes| {
        let seen = seen.clone();
        async move {
            seen.record(&method, &uri, &body);
            respond(&method, uri.path(), &body)
        }
    });
    (spawn(router).await, recorder)
}

fn subscription(destination: &str) -> Value {
    json!({
        "afServiceId": "svc",
        "afAppId": "app1",
        "subscribedEvents": ["UP_PATH_CHANGE"],
        "notificationDestination": destination,
        "trafficRoutes": [{"dnai": "edge-1"}],
    })
}

#[tokio::test]
async fn test_create_and_delete_subscription() {
    let (nef, recorder) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    let created = call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(subscription("http://consumer.local/steering")),
        &[],
    )
    .await;

    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(
        created.headers.get(header::LOCATION).unwrap(),
        "http://gw.test:8050/af/v1/subscriptions/11111"
    );
    assert_eq!(created.body["self"], "http://gw.test:8050/af/v1/subscriptions/11111");
    assert_eq!(created.body["notificationDestination"], "http://consumer.local/steering");
    assert_eq!(created.body["afTransId"], "1");
    assert_eq!(state.transactions.transaction_for("11111"), Some(1));

    let forwarded = recorder.last();
    assert_eq!(forwarded.path, SUBSCRIPTIONS);
    assert_eq!(forwarded.body["afTransId"], "1");
    assert_eq!(
        forwarded.body["notificationDestination"],
        "http://gw.test:8051/af/v1/notifications/traffic-influence"
    );
    assert_eq!(forwarded.body["trafficRoutes"][0]["dnai"], "edge-1");

    let deleted = call(&api, Method::DELETE, "/af/v1/subscriptions/11111", None, &[]).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(state.transactions.is_empty());
    assert_eq!(state.transactions.subscription_count(), 0);
}

#[tokio::test]
async fn test_subscription_without_events_gets_no_transaction() {
    let (nef, recorder) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    let created = call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(json!({"afServiceId": "svc", "trafficRoutes": []})),
        &[],
    )
    .await;

    assert_eq!(created.status, StatusCode::CREATED);
    assert!(state.transactions.is_empty());
    assert!(recorder.last().body.get("afTransId").is_none());
}

#[tokio::test]
async fn test_downstream_problem_releases_transaction() {
    let (nef, _) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    let mut body = subscription("http://consumer.local/steering");
    body["afServiceId"] = json!("reject");
    let rejected = call(&api, Method::POST, "/af/v1/subscriptions", Some(body), &[]).await;

    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected.body["cause"], "INVALID_SERVICE");
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_rejected_before_downstream() {
    let (nef, recorder) = fake_nef().await;
    let api = create_api_router(state(&config(nef, nef)));

    let response = call(&api, Method::POST, "/af/v1/subscriptions", Some(json!("not a subscription")), &[]).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn test_get_restores_consumer_destination() {
    let (nef, _) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(subscription("http://consumer.local/steering")),
        &[],
    )
    .await;
    let fetched = call(&api, Method::GET, "/af/v1/subscriptions/11111", None, &[]).await;

    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["self"], "http://gw.test:8050/af/v1/subscriptions/11111");
    assert_eq!(fetched.body["notificationDestination"], "http://consumer.local/steering");
}

#[tokio::test]
async fn test_steering_notification_is_relayed() {
    let (nef, _) = fake_nef().await;
    let (consumer, deliveries) = consumer_webhook().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());
    let intake = create_intake_router(state.clone());

    call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(subscription(&format!("http://{consumer}/steering"))),
        &[],
    )
    .await;

    let accepted = call(
        &intake,
        Method::POST,
        "/af/v1/notifications/traffic-influence",
        Some(json!({"afTransId": "1", "eventNotifs": [{"event": "UP_PATH_CHANGE"}]})),
        &[],
    )
    .await;
    assert_eq!(accepted.status, StatusCode::OK);

    assert!(deliveries.wait_for(1).await);
    let delivered = deliveries.last();
    assert_eq!(delivered.path, "/steering");
    assert_eq!(delivered.body["eventNotifs"][0]["event"], "UP_PATH_CHANGE");
}

#[tokio::test]
async fn test_steering_notification_lookup_failures() {
    let (nef, _) = fake_nef().await;
    let intake = create_intake_router(state(&config(nef, nef)));

    let unknown = call(
        &intake,
        Method::POST,
        "/af/v1/notifications/traffic-influence",
        Some(json!({"afTransId": "42"})),
        &[],
    )
    .await;
    assert_eq!(unknown.status, StatusCode::INTERNAL_SERVER_ERROR);

    let malformed = call(
        &intake,
        Method::POST,
        "/af/v1/notifications/traffic-influence",
        Some(json!("not an object")),
        &[],
    )
    .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let garbled = call(
        &intake,
        Method::POST,
        "/af/v1/notifications/traffic-influence",
        Some(json!({"afTransId": "not-a-number"})),
        &[],
    )
    .await;
    assert_eq!(garbled.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_without_events_releases_transaction() {
    let (nef, recorder) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(subscription("http://consumer.local/steering")),
        &[],
    )
    .await;
    assert_eq!(state.transactions.transaction_for("11111"), Some(1));

    let mut body = subscription("http://consumer.local/steering");
    body["subscribedEvents"] = json!([]);
    let updated = call(&api, Method::PUT, "/af/v1/subscriptions/11111", Some(body), &[]).await;

    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["self"], "http://gw.test:8050/af/v1/subscriptions/11111");
    assert_eq!(recorder.last().method, Method::PUT);
    assert_eq!(state.transactions.transaction_for("11111"), None);
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn test_patch_dropping_events_releases_transaction() {
    let (nef, recorder) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    call(
        &api,
        Method::POST,
        "/af/v1/subscriptions",
        Some(subscription("http://consumer.local/steering")),
        &[],
    )
    .await;

    let patched = call(
        &api,
        Method::PATCH,
        "/af/v1/subscriptions/11111",
        Some(json!({"subscribedEvents": []})),
        &[],
    )
    .await;

    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(recorder.last().method, Method::PATCH);
    assert_eq!(state.transactions.subscription_count(), 0);
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn test_put_with_events_allocates_missing_transaction() {
    let (nef, recorder) = fake_nef().await;
    let state = state(&config(nef, nef));
    let api = create_api_router(state.clone());

    let updated = call(
        &api,
        Method::PUT,
        "/af/v1/subscriptions/22222",
        Some(subscription("http://consumer.local/steering")),
        &[],
    )
    .await;

    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["afTransId"], "1");
    assert_eq!(updated.body["notificationDestination"], "http://consumer.local/steering");
    assert_eq!(state.transactions.transaction_for("22222"), Some(1));
    assert_eq!(
        state.transactions.get(1).unwrap().notification_destination.as_deref(),
        Some("http://consumer.local/steering")
    );

    let forwarded = recorder.last();
    assert_eq!(forwarded.path, format!("{SUBSCRIPTIONS}/22222"));
    assert_eq!(forwarded.body["afTransId"], "1");
    assert_eq!(
        forwarded.body["notificationDestination"],
        "http://gw.test:8051/af/v1/notifications/traffic-influence"
    );
}

#[tokio::test]
async fn test_slow_downstream_hits_request_timeout() {
    let slow = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        StatusCode::NO_CONTENT
    });
    let nef = spawn(slow).await;
    let mut config = config(nef, nef);
    config.server.request_timeout = Duration::from_millis(200);
    let api = create_api_router(state(&config));

    let response = call(&api, Method::GET, "/af/v1/subscriptions", None, &[]).await;

    assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
}
