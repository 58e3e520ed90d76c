//! Session lifecycle: binds a watch session to its connection.
//!
//! [`SessionLifecycle::run`] feeds client control messages to the session
//! in arrival order until the client goes away, the connection is
//! cancelled, or the maximum session duration elapses. Only expiry emits a
//! terminal `resource.stop`; on cancellation the transport teardown is the
//! signal.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::session::WatchSession;
use crate::config::WatchConfig;
use crate::error::WatchError;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client stopped sending (disconnect or close frame).
    ClientClosed,
    /// The connection's cancellation signal fired.
    Cancelled,
    /// The maximum session duration elapsed.
    Expired,
}

/// Connection-wide bounds of a watch session.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    max_duration: Duration,
    cancel: CancellationToken,
}

impl SessionLifecycle {
    /// Creates a lifecycle bound to `cancel`.
    #[must_use]
    pub fn new(max_duration: Duration, cancel: CancellationToken) -> Self {
        Self {
            max_duration,
            cancel,
        }
    }

    /// Creates a lifecycle using the configured maximum session duration.
    #[must_use]
    pub fn from_config(config: &WatchConfig, cancel: CancellationToken) -> Self {
        Self::new(config.max_session_duration(), cancel)
    }

    /// Returns the maximum session duration.
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Drives `session` with the client's `messages` until it ends.
    ///
    /// Rejected control messages are answered on `replies`; the session
    /// keeps running.
    pub async fn run<S>(
        self,
        mut session: WatchSession,
        mut messages: S,
        replies: mpsc::Sender<ServerMessage>,
    ) -> SessionEnd
    where
        S: Stream<Item = String> + Unpin,
    {
        debug!(
            session = session.id(),
            max_secs = self.max_duration().as_secs(),
            "session lifecycle started"
        );
        let deadline = tokio::time::sleep(self.max_duration());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!(session = session.id(), "session cancelled");
                    session.close().await;
                    return SessionEnd::Cancelled;
                }

                () = &mut deadline => {
                    info!(session = session.id(), "{}", WatchError::SessionExpired);
                    session.expire().await;
                    return SessionEnd::Expired;
                }

                message = messages.next() => {
                    let Some(text) = message else {
                        debug!(session = session.id(), "client closed");
                        session.close().await;
                        return SessionEnd::ClientClosed;
                    };

                    if let Err(err) = session.dispatch(&text).await {
                        if !err.is_start_failure() {
                            debug!(session = session.id(), "rejected control message: {}", err);
                        }
                        let reply = ServerMessage::rejected(&err, err.resource_type());
                        if replies.send(reply).await.is_err() {
                            debug!(session = session.id(), "reply channel closed");
                        }
                    }
                }
            }
        }
    }
}
