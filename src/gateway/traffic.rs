//! Traffic influence (steering) subscription handlers
//!
//! Subscriptions that subscribe to events get a gateway-allocated
//! transaction id; the NEF is told to notify the gateway, and the consumer's
//! own `notificationDestination` is kept against the transaction.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::Method;
use tracing::{debug, info};

use super::links::{LinkKind, SelfLinked, resource_id};
use super::response::{ApiError, json_response, parse_body};
use super::router::AppState;
use crate::Error;
use crate::downstream::CallOptions;
use crate::model::TrafficInfluSub;
use crate::registry::{TransactionEntry, TransactionId};

/// Rewrite links and show the consumer its own notification destination
fn present(state: &AppState, subscription: &mut TrafficInfluSub) -> crate::Result<()> {
    subscription.rewrite_links(&state.links)?;
    let destination = subscription
        .af_trans_id
        .as_deref()
        .and_then(|id| id.parse::<TransactionId>().ok())
        .and_then(|id| state.transactions.get(id))
        .and_then(|entry| entry.notification_destination);
    if destination.is_some() {
        subscription.notification_destination = destination;
    }
    Ok(())
}

/// GET /subscriptions
pub async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let response = state
        .nef
        .get::<Vec<TrafficInfluSub>>(&state.traffic_path(None), CallOptions::default())
        .await?;

    let mut subscriptions = response.body.unwrap_or_default();
    for subscription in &mut subscriptions {
        present(&state, subscription)?;
    }
    Ok(json_response(StatusCode::OK, &subscriptions, None))
}

/// POST /subscriptions
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut subscription: TrafficInfluSub = parse_body(&body)?;

    let transaction = if subscription.has_subscribed_events() {
        let destination = subscription.notification_destination.take();
        let id = state.transactions.allocate(TransactionEntry {
            subscription_id: None,
            notification_destination: destination,
        })?;
        subscription.af_trans_id = Some(id.to_string());
        subscription.notification_destination =
            Some(state.notifications.callbacks().traffic_influence.clone());
        Some(id)
    } else {
        None
    };

    let result = create_downstream(&state, &subscription, transaction).await;
    if result.is_err() {
        if let Some(id) = transaction {
            state.transactions.release(id);
        }
    }
    result
}

async fn create_downstream(
    state: &AppState,
    subscription: &TrafficInfluSub,
    transaction: Option<TransactionId>,
) -> Result<Response, ApiError> {
    let response = state
        .nef
        .send::<_, TrafficInfluSub>(
            Method::POST,
            &state.traffic_path(None),
            Some(subscription),
            CallOptions::default(),
        )
        .await?;

    let mut created = response.body.ok_or(Error::MissingLink("subscription"))?;
    let downstream_link = response
        .location
        .clone()
        .or_else(|| created.self_link.clone())
        .ok_or(Error::MissingLink("subscription"))?;
    let subscription_id = resource_id(LinkKind::Subscription, &downstream_link)
        .ok_or(Error::MissingLink("subscription"))?
        .to_string();

    if let Some(id) = transaction {
        state.transactions.bind(&subscription_id, id)?;
    }

    present(state, &mut created)?;
    let location = state.links.rewrite(LinkKind::Subscription, &downstream_link)?;

    info!(
        subscription_id = %subscription_id,
        transaction_id = ?transaction,
        "Traffic influence subscription created"
    );
    Ok(json_response(StatusCode::CREATED, &created, Some(&location)))
}

/// GET /subscriptions/{id}
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
) -> Result<Response, ApiError> {
    let response = state
        .nef
        .get::<TrafficInfluSub>(&state.traffic_path(Some(&subscription_id)), CallOptions::default())
        .await?;

    let mut subscription = response.body.ok_or(Error::MissingLink("subscription"))?;
    present(&state, &mut subscription)?;
    Ok(json_response(StatusCode::OK, &subscription, None))
}

/// PUT /subscriptions/{id}
pub async fn put_subscription(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let subscription: TrafficInfluSub = parse_body(&body)?;
    update_subscription(&state, &subscription_id, subscription, false).await
}

/// PATCH /subscriptions/{id}
pub async fn patch_subscription(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let patch: TrafficInfluSub = parse_body(&body)?;
    update_subscription(&state, &subscription_id, patch, true).await
}

async fn update_subscription(
    state: &AppState,
    subscription_id: &str,
    mut subscription: TrafficInfluSub,
    merge_patch: bool,
) -> Result<Response, ApiError> {
    let existing = state.transactions.transaction_for(subscription_id);
    let requests_events = subscription.has_subscribed_events();
    let destination = subscription.notification_destination.take();

    let mut allocated = None;
    let transaction = match existing {
        Some(id) => Some(id),
        None if requests_events && !merge_patch => {
            let id = state.transactions.allocate(TransactionEntry {
                subscription_id: None,
                notification_destination: destination.clone(),
            })?;
            allocated = Some(id);
            Some(id)
        }
        None => None,
    };

    match transaction {
        Some(id) => {
            subscription.af_trans_id = Some(id.to_string());
            if destination.is_some() || !merge_patch {
                subscription.notification_destination =
                    Some(state.notifications.callbacks().traffic_influence.clone());
            }
        }
        None => subscription.notification_destination.clone_from(&destination),
    }

    let (method, options) = if merge_patch {
        (Method::PATCH, CallOptions::default().merge_patch())
    } else {
        (Method::PUT, CallOptions::default())
    };
    let response = match state
        .nef
        .send::<_, TrafficInfluSub>(method, &state.traffic_path(Some(subscription_id)), Some(&subscription), options)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            if let Some(id) = allocated {
                state.transactions.release(id);
            }
            return Err(e.into());
        }
    };

    if let Some(id) = transaction {
        if allocated.is_some() {
            state.transactions.bind(subscription_id, id)?;
        }
        if destination.is_some() {
            state.transactions.set_notification_destination(id, destination);
        }
    }

    // Events dropped by this update no longer need a transaction
    let still_subscribed = response
        .body
        .as_ref()
        .map_or(requests_events || merge_patch, TrafficInfluSub::has_subscribed_events);
    if !still_subscribed {
        if let Some(id) = state.transactions.unbind(subscription_id) {
            debug!(subscription_id = %subscription_id, transaction_id = id, "Released transaction of unsubscribed subscription");
        }
    }

    match response.body {
        Some(mut updated) => {
            present(state, &mut updated)?;
            Ok(json_response(StatusCode::OK, &updated, None))
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// DELETE /subscriptions/{id}
pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .nef
        .delete(&state.traffic_path(Some(&subscription_id)), CallOptions::default())
        .await?;

    let transaction = state.transactions.unbind(&subscription_id);
    info!(
        subscription_id = %subscription_id,
        transaction_id = ?transaction,
        "Traffic influence subscription deleted"
    );
    Ok(StatusCode::NO_CONTENT.into_response())
}
