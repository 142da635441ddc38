//! Notification routing
//!
//! Requests that create or update application sessions are inspected
//! before they go downstream: every path-change subscription is validated
//! and pointed at the gateway's intake listener, and the consumer's own
//! address (or socket delivery) is remembered per correlation id. Inbound
//! notifications are then relayed to wherever the consumer asked for them.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::connections::ConnectionManager;
use crate::config::EndpointConfig;
use crate::downstream::WebhookSender;
use crate::model::{
    AfNotification, AppSessionContextReqData, AppSessionContextUpdateData, EventNotification,
    EventsNotification, EventsSubscReqData, NotificationKind, NsmfEventExposureNotification,
    RoutingRequirement, TerminationInfo,
};
use crate::registry::{EventInfo, EventRegistry, TransactionId, TransactionRegistry};
use crate::{Error, Result};

/// Gateway intake addresses handed to downstream functions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    /// Steering event notifications
    pub traffic_influence: String,
    /// User plane path change notifications
    pub up_path_change: String,
    /// Application session event notifications
    pub session_events: String,
    /// Application session termination requests
    pub termination: String,
}

impl CallbackUrls {
    /// Derive the callback addresses from the advertised intake endpoint
    #[must_use]
    pub fn from_advertised(endpoint: &EndpointConfig) -> Self {
        let base = endpoint.base_url();
        Self {
            traffic_influence: format!("{base}/traffic-influence"),
            up_path_change: format!("{base}/policy-authorization/up-path-change"),
            session_events: format!("{base}/policy-authorization/events"),
            termination: format!("{base}/policy-authorization/terminate"),
        }
    }
}

/// Session create/update payloads the router knows how to inspect
pub trait SessionRequest {
    /// Top-level and per-media-component routing requirements
    fn routing_requirements_mut(&mut self) -> Vec<&mut RoutingRequirement>;

    /// Session termination address, for payload types that carry one
    fn termination_uri_mut(&mut self) -> Option<&mut Option<String>>;

    /// Event subscription, if present
    fn events_subscription_mut(&mut self) -> Option<&mut EventsSubscReqData>;

    /// Remove the gateway-only socket request flag, returning its value
    fn take_websocket_request(&mut self) -> bool;
}

impl SessionRequest for AppSessionContextReqData {
    fn routing_requirements_mut(&mut self) -> Vec<&mut RoutingRequirement> {
        let mut requirements: Vec<&mut RoutingRequirement> = self.af_rout_req.iter_mut().collect();
        if let Some(components) = self.med_components.as_mut() {
            requirements.extend(components.values_mut().filter_map(|m| m.af_rout_req.as_mut()));
        }
        requirements
    }

    fn termination_uri_mut(&mut self) -> Option<&mut Option<String>> {
        Some(&mut self.notif_uri)
    }

    fn events_subscription_mut(&mut self) -> Option<&mut EventsSubscReqData> {
        self.ev_subsc.as_mut()
    }

    fn take_websocket_request(&mut self) -> bool {
        self.request_websocket_uri.take().unwrap_or(false)
    }
}

impl SessionRequest for AppSessionContextUpdateData {
    fn routing_requirements_mut(&mut self) -> Vec<&mut RoutingRequirement> {
        let mut requirements: Vec<&mut RoutingRequirement> = self.af_rout_req.iter_mut().collect();
        if let Some(components) = self.med_components.as_mut() {
            requirements.extend(components.values_mut().filter_map(|m| m.af_rout_req.as_mut()));
        }
        requirements
    }

    fn termination_uri_mut(&mut self) -> Option<&mut Option<String>> {
        None
    }

    fn events_subscription_mut(&mut self) -> Option<&mut EventsSubscReqData> {
        self.ev_subsc.as_mut()
    }

    fn take_websocket_request(&mut self) -> bool {
        self.request_websocket_uri.take().unwrap_or(false)
    }
}

/// Routing decisions for one request, committed after downstream success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingPlan {
    /// Consumer identity from the request header
    pub consumer_id: Option<String>,
    /// Socket delivery is in effect for the session
    pub socket_delivery: bool,
    /// The request itself asked for socket delivery
    pub websocket_requested: bool,
    /// Correlation id -> consumer address (empty = socket)
    pub routes: HashMap<String, String>,
    /// Consumer's termination address, if the request carried one
    pub termination_notif_uri: Option<String>,
    /// Consumer's session event address, if the request carried one
    pub events_notif_uri: Option<String>,
}

/// Where a notification was handed off to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryChannel {
    /// Consumer WebSocket
    Socket {
        /// Consumer id
        consumer_id: String,
    },
    /// One-shot webhook call
    Webhook {
        /// Consumer address
        url: String,
    },
}

/// Validates routing on the way down and relays notifications on the way up
#[derive(Clone)]
pub struct NotificationRouter {
    events: Arc<EventRegistry>,
    transactions: Arc<TransactionRegistry>,
    connections: Arc<ConnectionManager>,
    webhooks: Arc<dyn WebhookSender>,
    callbacks: Arc<CallbackUrls>,
}

impl NotificationRouter {
    /// Create a router over the shared registries
    pub fn new(
        events: Arc<EventRegistry>,
        transactions: Arc<TransactionRegistry>,
        connections: Arc<ConnectionManager>,
        webhooks: Arc<dyn WebhookSender>,
        callbacks: CallbackUrls,
    ) -> Self {
        Self {
            events,
            transactions,
            connections,
            webhooks,
            callbacks: Arc::new(callbacks),
        }
    }

    /// Gateway callback addresses
    #[must_use]
    pub fn callbacks(&self) -> &CallbackUrls {
        &self.callbacks
    }

    /// Validate and rewrite a session create/update request.
    ///
    /// Nothing is stored; pass the plan to [`Self::commit`] once the
    /// downstream call succeeded.
    pub fn prepare<R: SessionRequest>(
        &self,
        request: &mut R,
        existing: Option<&EventInfo>,
        consumer_id: Option<&str>,
    ) -> Result<RoutingPlan> {
        let websocket_requested = request.take_websocket_request();
        if websocket_requested && consumer_id.is_none() {
            return Err(Error::Validation(
                "socket delivery requested without a consumer id".to_string(),
            ));
        }

        let socket_delivery =
            websocket_requested || existing.is_some_and(|info| info.socket_delivery);
        let mut routes = HashMap::new();

        for requirement in request.routing_requirements_mut() {
            let Some(subscription) = requirement.up_path_chg_sub.as_mut() else {
                continue;
            };
            let correlation_id = subscription
                .notif_corre_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or(Error::MissingCorrelationId)?;

            match subscription.notification_uri.as_deref().filter(|a| !a.is_empty()) {
                Some(address) => {
                    if socket_delivery {
                        return Err(Error::ConflictingDeliveryMode(correlation_id));
                    }
                    validate_address(address)?;
                    routes.insert(correlation_id, address.to_string());
                }
                None if socket_delivery => {
                    routes.insert(correlation_id, String::new());
                }
                None => return Err(Error::NoDeliveryTarget(correlation_id)),
            }
            subscription.notification_uri = Some(self.callbacks.up_path_change.clone());
        }

        let termination_notif_uri = request
            .termination_uri_mut()
            .and_then(|slot| slot.replace(self.callbacks.termination.clone()));
        let events_notif_uri = request
            .events_subscription_mut()
            .and_then(|subscription| self.rewrite_events_subscription(subscription));

        Ok(RoutingPlan {
            consumer_id: consumer_id.map(String::from),
            socket_delivery,
            websocket_requested,
            routes,
            termination_notif_uri,
            events_notif_uri,
        })
    }

    /// Point an event subscription at the gateway, returning the consumer's address
    pub fn rewrite_events_subscription(&self, subscription: &mut EventsSubscReqData) -> Option<String> {
        subscription
            .notif_uri
            .replace(self.callbacks.session_events.clone())
    }

    /// Put the consumer's own addresses back into a payload echoed to it
    pub fn restore<R: SessionRequest>(&self, payload: &mut R, info: &EventInfo) {
        for requirement in payload.routing_requirements_mut() {
            let Some(subscription) = requirement.up_path_chg_sub.as_mut() else {
                continue;
            };
            let route = subscription
                .notif_corre_id
                .as_ref()
                .and_then(|id| info.up_path_routes.get(id));
            if let Some(route) = route {
                subscription.notification_uri = (!route.is_empty()).then(|| route.clone());
            }
        }
        if let Some(slot) = payload.termination_uri_mut() {
            if info.termination_notif_uri.is_some() {
                slot.clone_from(&info.termination_notif_uri);
            }
        }
        if let Some(subscription) = payload.events_subscription_mut() {
            if info.events_notif_uri.is_some() {
                subscription.notif_uri.clone_from(&info.events_notif_uri);
            }
        }
    }

    /// Store a plan produced by [`Self::prepare`]
    pub fn commit(&self, session_id: &str, plan: RoutingPlan) {
        let route_count = plan.routes.len();
        self.events.update(session_id, |info| {
            if plan.consumer_id.is_some() {
                info.consumer_id = plan.consumer_id;
            }
            info.socket_delivery |= plan.socket_delivery;
            info.up_path_routes.extend(plan.routes);
            if plan.termination_notif_uri.is_some() {
                info.termination_notif_uri = plan.termination_notif_uri;
            }
            if plan.events_notif_uri.is_some() {
                info.events_notif_uri = plan.events_notif_uri;
            }
        });
        debug!(
            app_session_id = %session_id,
            routes = route_count,
            socket = plan.socket_delivery,
            "Committed session routing"
        );
    }

    /// Relay a user plane path change to the consumer owning its correlation id
    pub fn dispatch_up_path_change(
        &self,
        notification: &NsmfEventExposureNotification,
    ) -> Result<DeliveryChannel> {
        let correlation_id = notification.notif_id.as_str();
        if correlation_id.is_empty() {
            return Err(Error::Validation("notifId is required".to_string()));
        }
        let (session_id, info) = self
            .events
            .resolve_correlation(correlation_id)
            .ok_or_else(|| Error::NotFound(format!("correlation id {correlation_id}")))?;
        let route = info
            .up_path_routes
            .get(correlation_id)
            .cloned()
            .unwrap_or_default();

        if route.is_empty() {
            let envelope = AfNotification::new(
                NotificationKind::UpPathChange,
                session_id,
                serde_json::to_value(notification)?,
            )
            .with_correlation_id(correlation_id);
            self.relay_over_socket(&info, &envelope)
        } else {
            Ok(self.relay_to_webhook(route, serde_json::to_value(notification)?))
        }
    }

    /// Relay an application session event
    pub fn dispatch_session_event(&self, notification: &EventsNotification) -> Result<DeliveryChannel> {
        let uri = notification
            .ev_subs_uri
            .as_deref()
            .ok_or_else(|| Error::Validation("evSubsUri is required".to_string()))?;
        let (session_id, info) = self.session_for_uri(uri)?;
        let payload = serde_json::to_value(notification)?;

        if info.socket_delivery {
            let envelope = AfNotification::new(NotificationKind::SessionEvent, session_id, payload);
            return self.relay_over_socket(&info, &envelope);
        }
        let url = info
            .events_notif_uri
            .clone()
            .ok_or_else(|| Error::NotFound(format!("event address for session {session_id}")))?;
        Ok(self.relay_to_webhook(url, payload))
    }

    /// Relay an application session termination request
    pub fn dispatch_termination(&self, notification: &TerminationInfo) -> Result<DeliveryChannel> {
        let uri = notification
            .res_uri
            .as_deref()
            .ok_or_else(|| Error::Validation("resUri is required".to_string()))?;
        let (session_id, info) = self.session_for_uri(uri)?;
        let payload = serde_json::to_value(notification)?;

        if info.socket_delivery {
            let envelope = AfNotification::new(NotificationKind::Termination, session_id, payload);
            return self.relay_over_socket(&info, &envelope);
        }
        let url = info
            .termination_notif_uri
            .clone()
            .ok_or_else(|| Error::NotFound(format!("termination address for session {session_id}")))?;
        Ok(self.relay_to_webhook(url, payload))
    }

    /// Relay a steering event notification to the subscription's consumer
    pub fn dispatch_traffic_influence(&self, notification: &EventNotification) -> Result<DeliveryChannel> {
        let raw = notification
            .af_trans_id
            .as_deref()
            .ok_or_else(|| Error::Validation("afTransId is required".to_string()))?;
        let transaction_id: TransactionId = raw
            .parse()
            .map_err(|_| Error::Validation(format!("afTransId {raw} is not a transaction id")))?;
        let url = self
            .transactions
            .get(transaction_id)
            .and_then(|entry| entry.notification_destination)
            .ok_or_else(|| Error::NotFound(format!("destination for transaction {transaction_id}")))?;

        Ok(self.relay_to_webhook(url, serde_json::to_value(notification)?))
    }

    fn session_for_uri(&self, uri: &str) -> Result<(String, EventInfo)> {
        let session_id = session_id_from_uri(uri)
            .ok_or_else(|| Error::Validation(format!("no app session id in {uri}")))?;
        let info = self
            .events
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("app session {session_id}")))?;
        Ok((session_id.to_string(), info))
    }

    fn relay_over_socket<T: Serialize>(&self, info: &EventInfo, envelope: &T) -> Result<DeliveryChannel> {
        let consumer_id = info
            .consumer_id
            .clone()
            .ok_or_else(|| Error::Internal("socket delivery without a consumer id".to_string()))?;
        let text = serde_json::to_string(envelope)?;

        let connections = Arc::clone(&self.connections);
        let target = consumer_id.clone();
        tokio::spawn(async move {
            match connections.send(&target, text).await {
                Ok(()) => debug!(consumer_id = %target, "Notification sent over socket"),
                Err(e) => warn!(consumer_id = %target, error = %e, "Socket delivery failed"),
            }
        });

        Ok(DeliveryChannel::Socket { consumer_id })
    }

    fn relay_to_webhook(&self, url: String, payload: Value) -> DeliveryChannel {
        let webhooks = Arc::clone(&self.webhooks);
        let target = url.clone();
        tokio::spawn(async move {
            match webhooks.deliver(&target, &payload).await {
                Ok(()) => info!(url = %target, "Notification relayed to webhook"),
                Err(e) => warn!(url = %target, error = %e, "Webhook delivery failed"),
            }
        });

        DeliveryChannel::Webhook { url }
    }
}

fn validate_address(address: &str) -> Result<()> {
    let url = Url::parse(address)
        .map_err(|e| Error::Validation(format!("invalid notification address {address}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(Error::UnsupportedScheme(address.to_string())),
    }
}

/// Application session id embedded in a resource or subscription URI
#[must_use]
pub fn session_id_from_uri(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once("/app-sessions/")?;
    rest.split(['/', '?']).next().filter(|id| !id.is_empty())
}
