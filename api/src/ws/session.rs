//! Watch session: the set of active watches of one connection.
//!
//! Control messages are applied one at a time through `&mut self`, so the
//! pump map needs no lock. Every pump writes into the session's single
//! outbound channel; [`WatchSession::close`] stops them all and waits until
//! each has stopped writing before the session's own sender is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::key::WatchKey;
use super::messages::{ApiEvent, EventName, SubscribeRequest, WatchMode};
use super::metrics::WatchMetrics;
use super::pump::{PumpHandle, WatchPump};
use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::schema::{AccessControl, SchemaRegistry};

/// Global session ID counter.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique session ID.
#[must_use]
pub fn next_session_id() -> u64 {
    SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Collaborators and settings shared by every session of a server.
#[derive(Clone)]
pub struct WatchContext {
    /// Schema lookup.
    pub schemas: Arc<dyn SchemaRegistry>,
    /// Access control for the connected caller.
    pub access: Arc<dyn AccessControl>,
    /// Session configuration.
    pub config: WatchConfig,
    /// Metrics.
    pub metrics: Arc<WatchMetrics>,
}

impl WatchContext {
    /// Creates a context; metrics follow `config.metrics_enabled`.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaRegistry>,
        access: Arc<dyn AccessControl>,
        config: WatchConfig,
    ) -> Self {
        let metrics = Arc::new(WatchMetrics::new(config.metrics_enabled));
        Self {
            schemas,
            access,
            config,
            metrics,
        }
    }
}

impl fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchContext")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Active watches of one connection.
pub struct WatchSession {
    id: u64,
    context: WatchContext,
    pumps: HashMap<WatchKey, PumpHandle>,
    outbound: mpsc::Sender<ApiEvent>,
    cancel: CancellationToken,
    parent: CancellationToken,
}

impl WatchSession {
    /// Creates a session bound to `shutdown` and returns it with its
    /// outbound event sequence.
    #[must_use]
    pub fn new(
        context: WatchContext,
        shutdown: &CancellationToken,
    ) -> (Self, mpsc::Receiver<ApiEvent>) {
        let (outbound, events) = mpsc::channel(context.config.outbound_buffer.max(1));
        context.metrics.record_session_opened();

        let session = Self {
            id: next_session_id(),
            context,
            pumps: HashMap::new(),
            outbound,
            cancel: shutdown.child_token(),
            parent: shutdown.clone(),
        };
        (session, events)
    }

    /// Returns the session ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the number of running watches.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.pumps.values().filter(|p| !p.is_stopped()).count()
    }

    /// Returns true if a watch is running for the key.
    #[must_use]
    pub fn is_watching(&self, key: &WatchKey) -> bool {
        self.pumps.get(key).is_some_and(|p| !p.is_stopped())
    }

    /// Parses a control message and applies it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for an undecodable message, or the start
    /// failure of a rejected start request.
    pub async fn dispatch(&mut self, text: &str) -> Result<(), WatchError> {
        let request = SubscribeRequest::parse(text)?;
        self.handle(&request).await
    }

    /// Routes a request to [`stop`](Self::stop) or [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns the start failure of a rejected start request.
    pub async fn handle(&mut self, request: &SubscribeRequest) -> Result<(), WatchError> {
        if request.stop {
            self.stop(request).await;
            Ok(())
        } else {
            self.start(request).await.map(|_| ())
        }
    }

    /// Starts a watch and emits its `resource.start` before any relayed
    /// event. Returns false if the watch was already running, or if the
    /// session shut down before the start event was delivered.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound`, `UnsupportedOperation`, `Forbidden`, or
    /// `StartFailed`; nothing is registered or emitted in that case.
    pub async fn start(&mut self, request: &SubscribeRequest) -> Result<bool, WatchError> {
        let key = request.key();
        if self.is_watching(&key) {
            debug!(session = self.id, watch = %key, "watch already active");
            return Ok(false);
        }
        self.pumps.retain(|_, p| !p.is_stopped());

        let cancel = self.cancel.child_token();
        let pump = WatchPump::open(
            request,
            self.context.schemas.as_ref(),
            self.context.access.as_ref(),
            self.context.config.debounce_interval(),
            &cancel,
        )
        .map_err(|e| {
            warn!(session = self.id, watch = %key, "watch rejected: {}", e);
            self.context.metrics.record_start_rejected();
            e
        })?;

        if !self.send(pump.start_event()).await {
            debug!(session = self.id, watch = %key, "session closed before watch started");
            cancel.cancel();
            return Ok(false);
        }

        let handle = pump.spawn(
            self.outbound.clone(),
            cancel,
            Arc::clone(&self.context.metrics),
        );
        self.pumps.insert(key.clone(), handle);
        self.context.metrics.record_watch_started();

        info!(
            session = self.id,
            watch = %key,
            mode = ?request.mode,
            global = key.scope.is_global(),
            "watch started"
        );
        Ok(true)
    }

    /// Stops a watch and emits `resource.stop` once its pump has stopped
    /// writing. Returns false, emitting nothing, if no watch was running.
    pub async fn stop(&mut self, request: &SubscribeRequest) -> bool {
        let key = request.key();
        let Some(handle) = self.pumps.remove(&key) else {
            debug!(session = self.id, watch = %key, "stop for unknown watch");
            return false;
        };

        let was_running = !handle.is_stopped();
        handle.stop();
        handle.finished().await;
        if !was_running {
            return false;
        }

        self.context.metrics.record_watch_stopped();
        info!(session = self.id, watch = %key, "watch stopped");

        let event =
            ApiEvent::new(EventName::Stop).scoped(&key.resource_type, &key.scope, WatchMode::Default);
        if !self.send(event).await {
            debug!(session = self.id, "outbound closed before stop event");
        }
        true
    }

    /// Stops every watch and closes the outbound sequence.
    pub async fn close(mut self) {
        self.shutdown().await;
        debug!(session = self.id, "session closed");
    }

    /// Stops every watch, emits the terminal `resource.stop`, and closes
    /// the outbound sequence.
    ///
    /// The terminal event is abandoned if the token the session was created
    /// from fires while the outbound channel is full.
    pub async fn expire(mut self) {
        self.shutdown().await;
        self.context.metrics.record_session_expired();
        info!(session = self.id, "session expired");

        tokio::select! {
            biased;
            () = self.parent.cancelled() => {
                debug!(session = self.id, "connection cancelled before expiry event");
            }
            sent = self.outbound.send(ApiEvent::session_stop()) => {
                if sent.is_err() {
                    debug!(session = self.id, "outbound closed before expiry event");
                }
            }
        }
    }

    /// Sends an event unless the session is cancelled first.
    async fn send(&self, event: ApiEvent) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.outbound.send(event) => sent.is_ok(),
        }
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        for (key, handle) in self.pumps.drain() {
            handle.stop();
            handle.finished().await;
            debug!(session = self.id, watch = %key, "pump released");
        }
    }
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("watches", &self.pumps.len())
            .finish_non_exhaustive()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.context.metrics.record_session_closed();
    }
}
