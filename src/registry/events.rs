//! Per-session notification routing state

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

/// Delivery state of an application session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// No event state recorded
    NoEvents,
    /// Event state recorded, no path change routes yet
    RoutingOnly,
    /// Path change notifications go to consumer webhooks
    WebhookActive,
    /// Notifications go over the consumer WebSocket
    SocketActive,
}

/// Notification routing state of one application session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventInfo {
    /// Consumer identity taken from the handshake header
    pub consumer_id: Option<String>,
    /// Consumer asked for WebSocket delivery
    pub socket_delivery: bool,
    /// Correlation id -> consumer notification address (empty = socket)
    pub up_path_routes: HashMap<String, String>,
    /// Consumer's own termination address
    pub termination_notif_uri: Option<String>,
    /// Consumer's own session event address
    pub events_notif_uri: Option<String>,
    /// Session was deleted but its state is retained
    pub retired: bool,
}

impl EventInfo {
    /// Current delivery state
    #[must_use]
    pub fn state(&self) -> DeliveryState {
        if self.socket_delivery {
            DeliveryState::SocketActive
        } else if self.up_path_routes.is_empty() {
            DeliveryState::RoutingOnly
        } else {
            DeliveryState::WebhookActive
        }
    }

    fn is_live_socket_consumer(&self, consumer_id: &str) -> bool {
        !self.retired && self.socket_delivery && self.consumer_id.as_deref() == Some(consumer_id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, EventInfo>,
    correlations: HashMap<String, String>,
}

impl Inner {
    fn unindex(&mut self, session_id: &str) {
        if let Some(info) = self.sessions.get(session_id) {
            for correlation_id in info.up_path_routes.keys() {
                if self.correlations.get(correlation_id).map(String::as_str) == Some(session_id) {
                    self.correlations.remove(correlation_id);
                }
            }
        }
    }

    fn index(&mut self, session_id: &str) {
        if let Some(info) = self.sessions.get(session_id) {
            for correlation_id in info.up_path_routes.keys() {
                self.correlations
                    .insert(correlation_id.clone(), session_id.to_string());
            }
        }
    }
}

/// Registry of [`EventInfo`] keyed by application session id, with a
/// correlation id index for notification lookup.
#[derive(Debug, Default)]
pub struct EventRegistry {
    inner: RwLock<Inner>,
}

impl EventRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state of a session
    pub fn insert(&self, session_id: &str, info: EventInfo) {
        let mut inner = self.inner.write();
        inner.unindex(session_id);
        inner.sessions.insert(session_id.to_string(), info);
        inner.index(session_id);
        debug!(app_session_id = %session_id, "Stored session event state");
    }

    /// Apply `update` to the session state, creating it if absent
    pub fn update<F>(&self, session_id: &str, update: F)
    where
        F: FnOnce(&mut EventInfo),
    {
        let mut inner = self.inner.write();
        inner.unindex(session_id);
        update(inner.sessions.entry(session_id.to_string()).or_default());
        inner.index(session_id);
    }

    /// Snapshot of a session's state
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<EventInfo> {
        self.inner.read().sessions.get(session_id).cloned()
    }

    /// Delivery state of a session
    #[must_use]
    pub fn state(&self, session_id: &str) -> DeliveryState {
        self.inner
            .read()
            .sessions
            .get(session_id)
            .map_or(DeliveryState::NoEvents, EventInfo::state)
    }

    /// Find the session owning a correlation id
    #[must_use]
    pub fn resolve_correlation(&self, correlation_id: &str) -> Option<(String, EventInfo)> {
        let inner = self.inner.read();
        let session_id = inner.correlations.get(correlation_id)?;
        let info = inner.sessions.get(session_id)?;
        Some((session_id.clone(), info.clone()))
    }

    /// Mark a session deleted while keeping its state
    pub fn retire(&self, session_id: &str) {
        if let Some(info) = self.inner.write().sessions.get_mut(session_id) {
            info.retired = true;
        }
    }

    /// Drop a session's state entirely
    pub fn remove(&self, session_id: &str) -> Option<EventInfo> {
        let mut inner = self.inner.write();
        inner.unindex(session_id);
        inner.sessions.remove(session_id)
    }

    /// Whether a live session asked for WebSocket delivery on behalf of `consumer_id`
    #[must_use]
    pub fn consumer_requests_socket(&self, consumer_id: &str) -> bool {
        self.inner
            .read()
            .sessions
            .values()
            .any(|info| info.is_live_socket_consumer(consumer_id))
    }

    /// Same as [`Self::consumer_requests_socket`], ignoring one session
    #[must_use]
    pub fn consumer_referenced_except(&self, consumer_id: &str, session_id: &str) -> bool {
        self.inner
            .read()
            .sessions
            .iter()
            .any(|(id, info)| id != session_id && info.is_live_socket_consumer(consumer_id))
    }

    /// Number of sessions with recorded state
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Whether no session has recorded state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
