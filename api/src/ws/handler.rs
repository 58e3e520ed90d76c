//! WebSocket connection handler.
//!
//! Upgrades `/watch` requests and binds each connection to one
//! [`WatchSession`] driven by a [`SessionLifecycle`].

use std::future;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lifecycle::{SessionEnd, SessionLifecycle};
use super::messages::{ApiEvent, ServerMessage};
use super::metrics::WatchMetrics;
use super::session::{WatchContext, WatchSession};
use crate::error::WatchError;

/// Capacity of the per-connection reply channel.
const REPLY_BUFFER: usize = 16;

/// WebSocket state shared across connections.
#[derive(Debug, Clone)]
pub struct WsState {
    /// Collaborators and settings of every session.
    pub context: WatchContext,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

impl WsState {
    /// Creates a new WebSocket state.
    #[must_use]
    pub fn new(context: WatchContext, shutdown: CancellationToken) -> Self {
        Self { context, shutdown }
    }
}

/// WebSocket upgrade handler.
///
/// Upgrades an HTTP connection to a watch session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Handles a WebSocket connection.
async fn handle_connection(socket: WebSocket, state: WsState) {
    let (ws_sender, ws_receiver) = socket.split();

    let connection = state.shutdown.child_token();
    let (session, events) = WatchSession::new(state.context.clone(), &connection);
    let session_id = session.id();
    info!(session = session_id, "WebSocket connection opened");

    let lifecycle = SessionLifecycle::from_config(&state.context.config, connection.clone());
    let (replies_tx, replies) = mpsc::channel::<ServerMessage>(REPLY_BUFFER);

    let sender_task = spawn_sender(
        ws_sender,
        events,
        replies,
        Arc::clone(&state.context.metrics),
        connection.clone(),
    );

    let messages = ws_receiver
        .take_while(move |frame| {
            future::ready(match frame {
                Ok(Message::Close(_)) => {
                    debug!(session = session_id, "WebSocket close requested");
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!(session = session_id, "WebSocket error: {}", e);
                    false
                }
            })
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        })
        .boxed();

    let end = lifecycle.run(session, messages, replies_tx).await;
    connection.cancel();

    match sender_task.await {
        Ok(mut sink) if end == SessionEnd::Expired => {
            let frame = CloseFrame {
                code: close_code::NORMAL,
                reason: WatchError::SessionExpired.to_string().into(),
            };
            if sink.send(Message::Close(Some(frame))).await.is_err() {
                debug!(session = session_id, "close frame not delivered");
            }
        }
        Ok(_) => {}
        Err(e) => error!(session = session_id, "sender task failed: {}", e),
    }

    info!(session = session_id, end = ?end, "WebSocket connection closed");
}

/// Spawns the task that writes session events and replies to the socket.
///
/// The task ends once the session's event sequence closes and returns the
/// socket's sink. A failed write cancels `connection`.
fn spawn_sender(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: mpsc::Receiver<ApiEvent>,
    mut replies: mpsc::Receiver<ServerMessage>,
    metrics: Arc<WatchMetrics>,
    connection: CancellationToken,
) -> JoinHandle<SplitSink<WebSocket, Message>> {
    tokio::spawn(async move {
        let mut replies_open = true;
        let mut writable = true;

        loop {
            let (frame, is_event) = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => (encode(&event), true),
                    None => break,
                },
                reply = replies.recv(), if replies_open => match reply {
                    Some(reply) => (encode(&reply), false),
                    None => {
                        replies_open = false;
                        continue;
                    }
                },
            };

            // Keep draining after a failed write so pumps never block.
            let Some(frame) = frame else { continue };
            if !writable {
                continue;
            }
            if sink.send(frame).await.is_err() {
                writable = false;
                connection.cancel();
                continue;
            }
            if is_event {
                metrics.record_event_sent();
            }
        }
        sink
    })
}

/// Serializes a value into a text frame.
fn encode<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            None
        }
    }
}
