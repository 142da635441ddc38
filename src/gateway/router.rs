//! HTTP routers and shared state

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::links::LinkRewriter;
use super::{intake, pfd, policy_auth, traffic, websocket};
use crate::Result;
use crate::config::Config;
use crate::downstream::{DownstreamClient, WebhookSender};
use crate::notify::{CallbackUrls, ConnectionManager, NotificationRouter};
use crate::registry::{EventRegistry, TransactionRegistry};

/// Path prefix of the operator-facing API
pub const API_ROOT: &str = "/af/v1";
/// Path prefix of the notification intake
pub const INTAKE_ROOT: &str = "/af/v1/notifications";

/// Shared application state
pub struct AppState {
    /// AF identifier used in downstream paths
    pub af_id: String,
    /// NEF client (traffic influence, PFD management)
    pub nef: Arc<DownstreamClient>,
    /// PCF client (policy authorization)
    pub pcf: Arc<DownstreamClient>,
    /// Self-link rewriter
    pub links: LinkRewriter,
    /// Transaction / subscription bookkeeping
    pub transactions: Arc<TransactionRegistry>,
    /// Per-session notification routing state
    pub events: Arc<EventRegistry>,
    /// Consumer WebSocket connections
    pub connections: Arc<ConnectionManager>,
    /// Notification router
    pub notifications: NotificationRouter,
    /// Header carrying the consumer identity
    pub consumer_header: String,
    /// Drop session state on delete instead of retiring it
    pub purge_on_session_delete: bool,
    /// Address advertised in `websocketUri`
    pub websocket_uri: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum accepted request body
    pub max_body_size: usize,
}

impl AppState {
    /// Build the state from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let nef = Arc::new(DownstreamClient::new("nef", &config.downstream.nef)?);
        let pcf = Arc::new(DownstreamClient::new("pcf", &config.downstream.pcf)?);
        let webhooks: Arc<dyn WebhookSender> =
            Arc::new(DownstreamClient::webhook(config.notifications.webhook_timeout)?);
        Ok(Self::with_webhooks(config, nef, pcf, webhooks))
    }

    /// Build the state around existing clients
    pub fn with_webhooks(
        config: &Config,
        nef: Arc<DownstreamClient>,
        pcf: Arc<DownstreamClient>,
        webhooks: Arc<dyn WebhookSender>,
    ) -> Self {
        let transactions = Arc::new(TransactionRegistry::new());
        let events = Arc::new(EventRegistry::new());
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&events)));
        let notifications = NotificationRouter::new(
            Arc::clone(&events),
            Arc::clone(&transactions),
            Arc::clone(&connections),
            webhooks,
            CallbackUrls::from_advertised(&config.notifications.advertised),
        );

        Self {
            af_id: config.downstream.af_id.clone(),
            nef,
            pcf,
            links: LinkRewriter::new(&config.server.advertised),
            transactions,
            events,
            connections,
            notifications,
            consumer_header: config.notifications.consumer_header.to_ascii_lowercase(),
            purge_on_session_delete: config.notifications.purge_on_session_delete,
            websocket_uri: format!("{}/notifications", config.server.advertised.websocket_base_url()),
            request_timeout: config.server.request_timeout,
            max_body_size: config.server.max_body_size,
        }
    }

    /// NEF path of the subscription collection or one subscription
    #[must_use]
    pub fn traffic_path(&self, subscription_id: Option<&str>) -> String {
        let base = format!("3gpp-traffic-influence/v1/{}/subscriptions", self.af_id);
        match subscription_id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    /// NEF path of the transaction collection, a transaction or one of its applications
    #[must_use]
    pub fn pfd_path(&self, transaction_id: Option<&str>, application_id: Option<&str>) -> String {
        let mut path = format!("3gpp-pfd-management/v1/{}/transactions", self.af_id);
        if let Some(transaction) = transaction_id {
            path = format!("{path}/{transaction}");
            if let Some(application) = application_id {
                path = format!("{path}/applications/{application}");
            }
        }
        path
    }

    /// PCF path of the session collection, a session or a session sub-resource
    #[must_use]
    pub fn session_path(&self, session_id: Option<&str>, suffix: Option<&str>) -> String {
        let mut path = "npcf-policyauthorization/v1/app-sessions".to_string();
        if let Some(session) = session_id {
            path = format!("{path}/{session}");
            if let Some(suffix) = suffix {
                path = format!("{path}/{suffix}");
            }
        }
        path
    }
}

/// Create the operator-facing API router
pub fn create_api_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/subscriptions",
            get(traffic::list_subscriptions).post(traffic::create_subscription),
        )
        .route(
            "/subscriptions/{subscription_id}",
            get(traffic::get_subscription)
                .put(traffic::put_subscription)
                .patch(traffic::patch_subscription)
                .delete(traffic::delete_subscription),
        )
        .route(
            "/pfd/transactions",
            get(pfd::list_transactions).post(pfd::create_transaction),
        )
        .route(
            "/pfd/transactions/{transaction_id}",
            get(pfd::get_transaction)
                .put(pfd::put_transaction)
                .delete(pfd::delete_transaction),
        )
        .route(
            "/pfd/transactions/{transaction_id}/applications/{application_id}",
            get(pfd::get_application)
                .put(pfd::put_application)
                .patch(pfd::patch_application)
                .delete(pfd::delete_application),
        )
        .route(
            "/policy-authorization/app-sessions",
            post(policy_auth::create_session),
        )
        .route(
            "/policy-authorization/app-sessions/{session_id}",
            get(policy_auth::get_session).patch(policy_auth::patch_session),
        )
        .route(
            "/policy-authorization/app-sessions/{session_id}/delete",
            post(policy_auth::delete_session),
        )
        .route(
            "/policy-authorization/app-sessions/{session_id}/events-subscription",
            axum::routing::put(policy_auth::put_events_subscription)
                .delete(policy_auth::delete_events_subscription),
        )
        .route("/notifications", get(websocket::upgrade_handler));

    let timeout = state.request_timeout;
    let body_limit = state.max_body_size;

    Router::new()
        .route("/health", get(health_handler))
        .nest(API_ROOT, api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the notification intake router
pub fn create_intake_router(state: Arc<AppState>) -> Router {
    let intake = Router::new()
        .route("/traffic-influence", post(intake::traffic_influence_handler))
        .route(
            "/policy-authorization/up-path-change",
            post(intake::up_path_change_handler),
        )
        .route(
            "/policy-authorization/events",
            post(intake::session_event_handler),
        )
        .route(
            "/policy-authorization/terminate",
            post(intake::termination_handler),
        );

    let body_limit = state.max_body_size;

    Router::new()
        .route("/health", get(health_handler))
        .nest(INTAKE_ROOT, intake)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "transactions": state.transactions.len(),
        "sessions": state.events.len(),
        "connections": state.connections.connection_count(),
    }))
}
