//! Persistent notification connections, one per consumer
//!
//! A consumer that asked for socket delivery upgrades `GET /notifications`
//! into a WebSocket. The manager keeps at most one live connection per
//! consumer id; each connection owns a liveness reader task that only
//! watches for the peer going away.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::EventRegistry;
use crate::{Error, Result};

/// Failure writing to a connection
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The peer or the gateway already closed the connection
    #[error("connection already closed")]
    Closed,
    /// Any other transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Write half of a consumer connection
#[async_trait]
pub trait NotificationSink: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: String) -> std::result::Result<(), SinkError>;

    /// Send a close frame and shut the transport down
    async fn close(&mut self) -> std::result::Result<(), SinkError>;
}

/// What the liveness reader saw on the read half
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Any data or ping/pong frame
    Data,
    /// Peer sent a close frame
    Close,
    /// Read failed
    Error(String),
}

type SharedSink = Arc<Mutex<Box<dyn NotificationSink>>>;

struct Connection {
    generation: u64,
    sink: SharedSink,
    cancel: CancellationToken,
}

/// Per-consumer persistent connections
pub struct ConnectionManager {
    connections: DashMap<String, Connection>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
    events: Arc<EventRegistry>,
}

impl ConnectionManager {
    /// Create a manager that authenticates against `events`
    pub fn new(events: Arc<EventRegistry>) -> Self {
        Self {
            connections: DashMap::new(),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            events,
        }
    }

    /// Whether `consumer_id` may open a connection.
    ///
    /// Only consumers named by a live session that requested socket
    /// delivery are admitted.
    #[must_use]
    pub fn authenticate(&self, consumer_id: &str) -> bool {
        self.events.consumer_requests_socket(consumer_id)
    }

    /// Register a new connection for `consumer_id`.
    ///
    /// Any existing connection for the consumer is closed before the new
    /// one becomes reachable through [`Self::send`].
    pub async fn open<S>(self: &Arc<Self>, consumer_id: &str, sink: Box<dyn NotificationSink>, inbound: S)
    where
        S: Stream<Item = InboundFrame> + Send + Unpin + 'static,
    {
        if let Some((_, previous)) = self.connections.remove(consumer_id) {
            info!(consumer_id = %consumer_id, "Replacing existing connection");
            teardown(previous).await;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let connection = Connection {
            generation,
            sink: Arc::new(Mutex::new(sink)),
            cancel: cancel.clone(),
        };

        // A concurrent open may have slipped in between remove and insert
        if let Some(raced) = self.connections.insert(consumer_id.to_string(), connection) {
            teardown(raced).await;
        }
        info!(consumer_id = %consumer_id, generation, "Consumer connection opened");

        let manager = Arc::clone(self);
        let consumer_id = consumer_id.to_string();
        tokio::spawn(async move {
            manager.watch(consumer_id, generation, inbound, cancel).await;
        });
    }

    async fn watch<S>(&self, consumer_id: String, generation: u64, mut inbound: S, cancel: CancellationToken)
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                frame = inbound.next() => match frame {
                    Some(InboundFrame::Data) => {}
                    Some(InboundFrame::Close) | None => {
                        debug!(consumer_id = %consumer_id, "Consumer closed connection");
                        break;
                    }
                    Some(InboundFrame::Error(e)) => {
                        warn!(consumer_id = %consumer_id, error = %e, "Connection read failed");
                        break;
                    }
                }
            }
        }

        if let Some((_, stale)) = self
            .connections
            .remove_if(&consumer_id, |_, c| c.generation == generation)
        {
            teardown(stale).await;
            info!(consumer_id = %consumer_id, generation, "Consumer connection removed");
        }
    }

    /// Write one notification to the consumer's connection
    pub async fn send(&self, consumer_id: &str, text: String) -> Result<()> {
        let (generation, sink) = self
            .connections
            .get(consumer_id)
            .map(|c| (c.generation, Arc::clone(&c.sink)))
            .ok_or_else(|| Error::NotFound(format!("connection for consumer {consumer_id}")))?;

        let result = sink.lock().await.send_text(text).await;
        match result {
            Ok(()) => Ok(()),
            Err(SinkError::Closed) => {
                if let Some((_, stale)) = self
                    .connections
                    .remove_if(consumer_id, |_, c| c.generation == generation)
                {
                    stale.cancel.cancel();
                }
                warn!(consumer_id = %consumer_id, "Purged closed connection");
                Err(Error::ConnectionClosed(consumer_id.to_string()))
            }
            Err(SinkError::Transport(e)) => Err(Error::Transport(e)),
        }
    }

    /// Close the consumer's connection on behalf of an ending session.
    ///
    /// Returns `false` without touching the connection when another live
    /// session still routes notifications to this consumer.
    pub async fn close(&self, consumer_id: &str, ending_session: &str) -> bool {
        if self.events.consumer_referenced_except(consumer_id, ending_session) {
            debug!(
                consumer_id = %consumer_id,
                app_session_id = %ending_session,
                "Connection still referenced, keeping it open"
            );
            return false;
        }

        match self.connections.remove(consumer_id) {
            Some((_, connection)) => {
                teardown(connection).await;
                info!(consumer_id = %consumer_id, "Consumer connection closed");
                true
            }
            None => false,
        }
    }

    /// Close every connection
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let consumers: Vec<String> = self.connections.iter().map(|c| c.key().clone()).collect();
        for consumer_id in consumers {
            if let Some((_, connection)) = self.connections.remove(&consumer_id) {
                teardown(connection).await;
            }
        }
        info!("All consumer connections closed");
    }

    /// Whether the consumer has a live connection
    #[must_use]
    pub fn is_connected(&self, consumer_id: &str) -> bool {
        self.connections.contains_key(consumer_id)
    }

    /// Number of live connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

async fn teardown(connection: Connection) {
    connection.cancel.cancel();
    if let Err(e) = connection.sink.lock().await.close().await {
        debug!(error = %e, "Close frame not delivered");
    }
}
