//! Policy authorization (application session) handlers
//!
//! Session requests pass through the notification router before they are
//! relayed to the PCF, so path change, event and termination notifications
//! reach the gateway first. Routing state is only committed once the PCF
//! accepted the request.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use super::links::{LinkKind, resource_id};
use super::response::{ApiError, consumer_id, json_response, parse_body};
use super::router::AppState;
use crate::Error;
use crate::downstream::CallOptions;
use crate::model::{
    AppSessionContext, AppSessionContextUpdateDataPatch, EventsSubscReqData,
};

fn status_of(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK)
}

/// Restore consumer addresses in a session echoed back to the consumer
fn present_session(state: &AppState, session_id: &str, context: &mut AppSessionContext) {
    if let (Some(info), Some(req_data)) = (state.events.get(session_id), context.asc_req_data.as_mut()) {
        state.notifications.restore(req_data, &info);
    }
}

/// POST /policy-authorization/app-sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let consumer = consumer_id(&headers, &state.consumer_header);
    let mut context: AppSessionContext = parse_body(&body)?;
    context.websocket_uri = None;

    let req_data = context
        .asc_req_data
        .as_mut()
        .ok_or_else(|| Error::Validation("ascReqData is required".to_string()))?;
    let plan = state.notifications.prepare(req_data, None, consumer.as_deref())?;
    let websocket_requested = plan.websocket_requested;

    let response = state
        .pcf
        .send::<_, AppSessionContext>(
            Method::POST,
            &state.session_path(None, None),
            Some(&context),
            CallOptions::policy_authorization(),
        )
        .await?;

    let downstream_link = response.location.clone().ok_or(Error::MissingLink("app session"))?;
    let session_id = resource_id(LinkKind::AppSession, &downstream_link)
        .ok_or(Error::MissingLink("app session"))?
        .to_string();
    state.notifications.commit(&session_id, plan);

    let mut created = response.body.unwrap_or(context);
    present_session(&state, &session_id, &mut created);
    if websocket_requested {
        created.websocket_uri = Some(state.websocket_uri.clone());
    }

    let location = state.links.rewrite(LinkKind::AppSession, &downstream_link)?;
    info!(
        app_session_id = %session_id,
        consumer_id = ?consumer,
        socket = websocket_requested,
        "Application session created"
    );
    Ok(json_response(StatusCode::CREATED, &created, Some(&location)))
}

/// GET /policy-authorization/app-sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let response = state
        .pcf
        .get::<AppSessionContext>(
            &state.session_path(Some(&session_id), None),
            CallOptions::policy_authorization(),
        )
        .await?;

    let mut context = response
        .body
        .ok_or_else(|| Error::Decode("empty app session body".to_string()))?;
    present_session(&state, &session_id, &mut context);
    Ok(json_response(StatusCode::OK, &context, None))
}

/// PATCH /policy-authorization/app-sessions/{id}
pub async fn patch_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let consumer = consumer_id(&headers, &state.consumer_header);
    let mut patch: AppSessionContextUpdateDataPatch = parse_body(&body)?;

    let existing = state.events.get(&session_id);
    let plan = match patch.asc_req_data.as_mut() {
        Some(update) => Some(state.notifications.prepare(update, existing.as_ref(), consumer.as_deref())?),
        None => None,
    };
    let websocket_requested = plan.as_ref().is_some_and(|p| p.websocket_requested);

    let response = state
        .pcf
        .send::<_, AppSessionContext>(
            Method::PATCH,
            &state.session_path(Some(&session_id), None),
            Some(&patch),
            CallOptions::policy_authorization().merge_patch(),
        )
        .await?;

    if let Some(plan) = plan {
        state.notifications.commit(&session_id, plan);
    }
    debug!(app_session_id = %session_id, "Application session updated");

    match response.body {
        Some(mut context) => {
            present_session(&state, &session_id, &mut context);
            if websocket_requested {
                context.websocket_uri = Some(state.websocket_uri.clone());
            }
            Ok(json_response(status_of(response.status), &context, None))
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /policy-authorization/app-sessions/{id}/delete
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: Option<Value> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(parse_body(&body)?)
    };

    let response = state
        .pcf
        .send::<_, Value>(
            Method::POST,
            &state.session_path(Some(&session_id), Some("delete")),
            payload.as_ref(),
            CallOptions::policy_authorization(),
        )
        .await?;

    let info = if state.purge_on_session_delete {
        state.events.remove(&session_id)
    } else {
        state.events.retire(&session_id);
        state.events.get(&session_id)
    };

    if let Some(consumer) = info
        .as_ref()
        .filter(|i| i.socket_delivery)
        .and_then(|i| i.consumer_id.as_deref())
    {
        state.connections.close(consumer, &session_id).await;
    }

    info!(app_session_id = %session_id, "Application session deleted");
    match response.body {
        Some(body) => Ok(json_response(status_of(response.status), &body, None)),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// PUT /policy-authorization/app-sessions/{id}/events-subscription
pub async fn put_events_subscription(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut subscription: EventsSubscReqData = parse_body(&body)?;
    let consumer_address = state.notifications.rewrite_events_subscription(&mut subscription);

    let response = state
        .pcf
        .send::<_, Value>(
            Method::PUT,
            &state.session_path(Some(&session_id), Some("events-subscription")),
            Some(&subscription),
            CallOptions::policy_authorization(),
        )
        .await?;

    if consumer_address.is_some() {
        state.events.update(&session_id, |info| {
            info.events_notif_uri.clone_from(&consumer_address);
        });
    }

    let location = response
        .location
        .as_deref()
        .map(|link| state.links.rewrite(LinkKind::AppSession, link))
        .transpose()?;

    match response.body {
        Some(mut body) => {
            if let (Some(address), Some(slot)) = (&consumer_address, body.get_mut("notifUri")) {
                *slot = Value::String(address.clone());
            }
            Ok(json_response(status_of(response.status), &body, location.as_deref()))
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// DELETE /policy-authorization/app-sessions/{id}/events-subscription
pub async fn delete_events_subscription(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .pcf
        .delete(
            &state.session_path(Some(&session_id), Some("events-subscription")),
            CallOptions::policy_authorization(),
        )
        .await?;

    if state.events.get(&session_id).is_some() {
        state.events.update(&session_id, |info| info.events_notif_uri = None);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
