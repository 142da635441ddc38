//! Core network notification intake
//!
//! Receives notifications the NEF and PCF post to the gateway's callback
//! addresses and hands them to the notification router. Relaying happens in
//! the background; the core network only learns whether the notification
//! could be matched to a consumer.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, info, warn};

use super::router::AppState;
use crate::model::{
    EventNotification, EventsNotification, NsmfEventExposureNotification, ProblemDetails,
    TerminationInfo,
};
use crate::notify::DeliveryChannel;
use crate::{Error, Result};

fn accept<T, F>(kind: &'static str, body: &Bytes, accepted: StatusCode, dispatch: F) -> Response
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> Result<DeliveryChannel>,
{
    let request_id = uuid::Uuid::new_v4().to_string();

    let notification: T = match serde_json::from_slice(body) {
        Ok(n) => n,
        Err(e) => {
            warn!(request_id = %request_id, kind, error = %e, "Malformed notification");
            return problem(StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}"), &request_id);
        }
    };

    info!(request_id = %request_id, kind, body_len = body.len(), "Received notification");

    match dispatch(&notification) {
        Ok(channel) => {
            info!(request_id = %request_id, kind, channel = ?channel, "Notification dispatched");
            if accepted == StatusCode::NO_CONTENT {
                StatusCode::NO_CONTENT.into_response()
            } else {
                (
                    accepted,
                    Json(json!({ "status": "received", "request_id": request_id })),
                )
                    .into_response()
            }
        }
        Err(Error::Validation(detail)) => {
            warn!(request_id = %request_id, kind, detail = %detail, "Notification rejected");
            problem(StatusCode::BAD_REQUEST, detail, &request_id)
        }
        Err(e) => {
            error!(request_id = %request_id, kind, error = %e, "Notification could not be routed");
            problem(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), &request_id)
        }
    }
}

fn problem(status: StatusCode, detail: String, request_id: &str) -> Response {
    let mut body = ProblemDetails::with_status(status).with_detail(detail);
    body.instance = Some(format!("urn:uuid:{request_id}"));
    (status, Json(body)).into_response()
}

/// POST /traffic-influence
pub async fn traffic_influence_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    accept::<EventNotification, _>("traffic-influence", &body, StatusCode::OK, |n| {
        state.notifications.dispatch_traffic_influence(n)
    })
}

/// POST /policy-authorization/up-path-change
pub async fn up_path_change_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    accept::<NsmfEventExposureNotification, _>("up-path-change", &body, StatusCode::NO_CONTENT, |n| {
        state.notifications.dispatch_up_path_change(n)
    })
}

/// POST /policy-authorization/events
pub async fn session_event_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    accept::<EventsNotification, _>("session-event", &body, StatusCode::NO_CONTENT, |n| {
        state.notifications.dispatch_session_event(n)
    })
}

/// POST /policy-authorization/terminate
pub async fn termination_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    accept::<TerminationInfo, _>("termination", &body, StatusCode::NO_CONTENT, |n| {
        state.notifications.dispatch_termination(n)
    })
}
