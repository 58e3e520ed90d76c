//! Watch pump: drives one active watch.
//!
//! [`WatchPump::open`] performs every check that can reject a watch
//! (schema, watch support, access control, upstream open) so failures are
//! returned to the caller before anything is spawned. The caller delivers
//! [`WatchPump::start_event`] itself, then [`WatchPump::spawn`] relays
//! upstream events to the session's outbound channel, through a
//! [`Debouncer`] in notification mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::debouncer::Debouncer;
use super::key::{WatchKey, WatchRequest};
use super::messages::{ApiEvent, EventName, SubscribeRequest, WatchMode};
use super::metrics::WatchMetrics;
use crate::error::WatchError;
use crate::schema::{AccessControl, EventReceiver, SchemaRegistry};

/// An opened watch, ready to relay.
#[derive(Debug)]
pub struct WatchPump {
    key: WatchKey,
    mode: WatchMode,
    upstream: EventReceiver,
    debouncer: Option<Debouncer>,
}

impl WatchPump {
    /// Resolves, authorizes, and opens the upstream watch for `request`.
    ///
    /// `cancel` is handed to the store and must be the token later passed
    /// to [`spawn`](Self::spawn).
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound`, `UnsupportedOperation`, `Forbidden`, or
    /// `StartFailed`.
    pub fn open(
        request: &SubscribeRequest,
        schemas: &dyn SchemaRegistry,
        access: &dyn AccessControl,
        default_debounce: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self, WatchError> {
        let resource_type = &request.resource_type;

        let schema = schemas
            .resolve(resource_type)
            .ok_or_else(|| WatchError::SchemaNotFound(resource_type.clone()))?;
        let store = schema
            .store
            .as_ref()
            .ok_or_else(|| WatchError::UnsupportedOperation(resource_type.clone()))?;

        let scope = request.scope();
        access
            .can_watch(&schema, &scope)
            .map_err(|source| WatchError::Forbidden {
                resource_type: resource_type.clone(),
                source,
            })?;

        let watch = WatchRequest {
            scope: scope.clone(),
            revision: request
                .resource_version
                .clone()
                .filter(|rv| !rv.is_empty()),
        };
        let upstream =
            store
                .watch(watch, cancel.clone())
                .map_err(|source| WatchError::StartFailed {
                    resource_type: resource_type.clone(),
                    source,
                })?;

        let debouncer = (request.mode == WatchMode::Notification).then(|| {
            let interval = request
                .debounce_ms
                .filter(|ms| *ms > 0)
                .map_or(default_debounce, Duration::from_millis);
            Debouncer::new(interval)
        });

        Ok(Self {
            key: WatchKey::new(resource_type.clone(), scope),
            mode: request.mode,
            upstream,
            debouncer,
        })
    }

    /// Returns the key of the watch.
    #[must_use]
    pub fn key(&self) -> &WatchKey {
        &self.key
    }

    /// Returns the `resource.start` event announcing the watch.
    ///
    /// It must be delivered before [`spawn`](Self::spawn) so it precedes
    /// every relayed event of the watch.
    #[must_use]
    pub fn start_event(&self) -> ApiEvent {
        ApiEvent::new(EventName::Start).scoped(&self.key.resource_type, &self.key.scope, self.mode)
    }

    /// Spawns the relay task.
    ///
    /// The returned handle resolves once the pump has stopped writing to
    /// `outbound` and, in notification mode, its debouncer has finished.
    /// The pump cancels `cancel` itself when it finishes, which releases the
    /// upstream watch.
    pub fn spawn(
        self,
        outbound: mpsc::Sender<ApiEvent>,
        cancel: CancellationToken,
        metrics: Arc<WatchMetrics>,
    ) -> PumpHandle {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(self.run(outbound, cancel.clone(), metrics, done_tx));
        PumpHandle {
            cancel,
            done: done_rx,
        }
    }

    async fn run(
        self,
        outbound: mpsc::Sender<ApiEvent>,
        cancel: CancellationToken,
        metrics: Arc<WatchMetrics>,
        done: oneshot::Sender<()>,
    ) {
        let Self {
            key,
            mode,
            upstream,
            debouncer,
        } = self;

        let (mut source, debouncing) = match debouncer {
            Some(debouncer) => {
                debug!(
                    watch = %key,
                    interval_ms = debouncer.interval().as_millis(),
                    "debouncing notifications"
                );
                let (notifications, task) = debouncer.spawn(upstream, cancel.clone());
                (notifications, Some(task))
            }
            None => (upstream, None),
        };

        relay(&key, mode, &mut source, &outbound, &cancel, &metrics).await;

        cancel.cancel();
        drop(outbound);

        match debouncing {
            Some(task) => {
                // The debouncer closes its output once cancelled and ends
                // when the store closes the upstream.
                while source.recv().await.is_some() {}
                if let Err(e) = task.await {
                    warn!(watch = %key, "debouncer task failed: {}", e);
                }
                drop(done);
            }
            None => {
                drop(done);
                while source.recv().await.is_some() {}
            }
        }
        debug!(watch = %key, "pump finished");
    }
}

async fn relay(
    key: &WatchKey,
    mode: WatchMode,
    source: &mut EventReceiver,
    outbound: &mpsc::Sender<ApiEvent>,
    cancel: &CancellationToken,
    metrics: &WatchMetrics,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            event = source.recv() => event,
        };

        let Some(event) = event else {
            debug!(watch = %key, "upstream closed");
            return;
        };

        if let Some(error) = event.error {
            warn!(watch = %key, "upstream watch failed: {}", error);
            metrics.record_upstream_error();
            let event = ApiEvent::from_error(error).scoped(&key.resource_type, &key.scope, mode);
            send(outbound, event, cancel).await;
            return;
        }

        let event = event.scoped(&key.resource_type, &key.scope, mode);
        if !send(outbound, event, cancel).await {
            return;
        }
    }
}

/// Sends `event` unless `cancel` fires first. Returns false if it was not delivered.
async fn send(
    outbound: &mpsc::Sender<ApiEvent>,
    event: ApiEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = outbound.send(event) => sent.is_ok(),
    }
}

/// Session-side handle of a running pump.
#[derive(Debug)]
pub struct PumpHandle {
    cancel: CancellationToken,
    done: oneshot::Receiver<()>,
}

impl PumpHandle {
    /// Stops the pump. It emits nothing further.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the pump has stopped or finished on its own.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until the pump no longer writes to the outbound channel.
    pub async fn finished(self) {
        // The sender is dropped, never sent on.
        let _ = self.done.await;
    }
}
