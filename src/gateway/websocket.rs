//! WebSocket upgrade endpoint for socket delivery

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::response::consumer_id;
use super::router::AppState;
use crate::model::ProblemDetails;
use crate::notify::{InboundFrame, NotificationSink, SinkError};

/// GET /notifications
///
/// The consumer identity header is checked before the handshake; only a
/// consumer named by a live session that requested socket delivery is
/// upgraded.
pub async fn upgrade_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(consumer) = consumer_id(&headers, &state.consumer_header) else {
        warn!("WebSocket upgrade without consumer id");
        return unauthorized("consumer id header is required");
    };

    if !state.connections.authenticate(&consumer) {
        warn!(consumer_id = %consumer, "WebSocket upgrade for unknown consumer");
        return unauthorized("no session requested socket delivery for this consumer");
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    upgrade.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        let inbound = stream.map(|frame| match frame {
            Ok(Message::Close(_)) => InboundFrame::Close,
            Ok(_) => InboundFrame::Data,
            Err(e) => InboundFrame::Error(e.to_string()),
        });
        state.connections.open(&consumer, Box::new(sink), inbound).await;
        debug!(consumer_id = %consumer, "WebSocket upgraded");
    })
}

fn unauthorized(detail: &str) -> Response {
    let problem = ProblemDetails::with_status(StatusCode::UNAUTHORIZED).with_detail(detail);
    (StatusCode::UNAUTHORIZED, Json(problem)).into_response()
}

fn sink_error(err: axum::Error) -> SinkError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("closed") {
        SinkError::Closed
    } else {
        SinkError::Transport(message)
    }
}

#[async_trait]
impl NotificationSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), SinkError> {
        self.send(Message::Text(text.into())).await.map_err(sink_error)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "gateway closing connection".into(),
        };
        self.send(Message::Close(Some(frame))).await.map_err(sink_error)?;
        SinkExt::close(self).await.map_err(sink_error)
    }
}
