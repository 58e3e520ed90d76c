//! In-memory watchable store.
//!
//! Every published change is broadcast to the open watches, each of which
//! filters by scope, label selector, and resume revision before relaying.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::schema::{EventReceiver, WatchStore};
use crate::ws::key::{WatchRequest, WatchScope};
use crate::ws::messages::{ApiEvent, EventName};

/// Capacity of the broadcast bus.
const BUS_CAPACITY: usize = 1024;

/// Capacity of each watch's upstream channel.
const WATCH_BUFFER: usize = 64;

/// Watchable store holding no state beyond its change feed.
#[derive(Debug)]
pub struct MemoryStore {
    resource_type: String,
    bus: broadcast::Sender<ApiEvent>,
    revision: AtomicU64,
    watches_opened: AtomicUsize,
}

impl MemoryStore {
    /// Creates a store for a resource type.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            resource_type: resource_type.into(),
            bus,
            revision: AtomicU64::new(0),
            watches_opened: AtomicUsize::new(0),
        }
    }

    /// Publishes a change and returns its revision.
    pub fn publish(
        &self,
        name: EventName,
        namespace: Option<&str>,
        id: &str,
        data: Value,
    ) -> String {
        let revision = (self.revision.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let mut event = ApiEvent::new(name)
            .with_resource_type(self.resource_type.clone())
            .with_id(id)
            .with_revision(revision.clone())
            .with_data(data);
        event.namespace = namespace.map(str::to_string);

        // No open watch is not an error.
        let _ = self.bus.send(event);
        revision
    }

    /// Fails every open watch.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.bus.send(ApiEvent::upstream_error(message));
    }

    /// Returns the latest published revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }

    /// Returns the number of watches opened so far.
    #[must_use]
    pub fn watches_opened(&self) -> usize {
        self.watches_opened.load(Ordering::Relaxed)
    }

    /// Returns the number of watches still attached to the change feed.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.bus.receiver_count()
    }
}

impl WatchStore for MemoryStore {
    /// Opens a watch. Must be called from within a tokio runtime.
    fn watch(
        &self,
        request: WatchRequest,
        cancel: CancellationToken,
    ) -> Result<EventReceiver, StoreError> {
        let since = request
            .revision
            .as_deref()
            .filter(|rv| !rv.is_empty())
            .map(|rv| {
                rv.parse::<u64>()
                    .map_err(|_| StoreError::new(format!("invalid resource version {rv}")))
            })
            .transpose()?;
        let selector = request
            .scope
            .selector
            .as_deref()
            .map(LabelSelector::parse)
            .transpose()?;

        let mut feed = self.bus.subscribe();
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        self.watches_opened.fetch_add(1, Ordering::Relaxed);
        let scope = request.scope;

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    received = feed.recv() => received,
                };

                let event = match received {
                    Ok(event) if event.is_error() => event,
                    Ok(event) => {
                        if !matches(&scope, selector.as_ref(), since, &event) {
                            continue;
                        }
                        event
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("watch fell behind by {} events", skipped);
                        ApiEvent::upstream_error(format!("watch fell behind by {skipped} events"))
                    }
                    Err(RecvError::Closed) => break,
                };

                let terminal = event.is_error();
                let sent = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    sent = tx.send(event) => sent.is_ok(),
                };
                if !sent || terminal {
                    break;
                }
            }
            debug!("memory watch closed");
        });

        Ok(rx)
    }
}

fn matches(
    scope: &WatchScope,
    selector: Option<&LabelSelector>,
    since: Option<u64>,
    event: &ApiEvent,
) -> bool {
    if scope.id.is_some() && event.id != scope.id {
        return false;
    }
    if scope.namespace.is_some() && event.namespace != scope.namespace {
        return false;
    }
    if let Some(since) = since {
        match event.revision.parse::<u64>() {
            Ok(revision) if revision > since => {}
            _ => return false,
        }
    }
    selector.map_or(true, |s| s.matches(event.data.as_ref()))
}

/// Equality-based label selector, e.g. `app=web,tier!=db`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String, bool)>,
}

impl LabelSelector {
    /// Parses a comma-separated list of `key=value`, `key==value`, or
    /// `key!=value` requirements.
    ///
    /// # Errors
    ///
    /// Returns an error for a requirement without an operator or key.
    pub fn parse(selector: &str) -> Result<Self, StoreError> {
        let mut requirements = Vec::new();
        for part in selector.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value, equal) = if let Some((k, v)) = part.split_once("!=") {
                (k, v, false)
            } else if let Some((k, v)) = part.split_once("==") {
                (k, v, true)
            } else if let Some((k, v)) = part.split_once('=') {
                (k, v, true)
            } else {
                return Err(StoreError::new(format!("invalid selector requirement {part}")));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(StoreError::new(format!("invalid selector requirement {part}")));
            }
            requirements.push((key.to_string(), value.trim().to_string(), equal));
        }
        Ok(Self { requirements })
    }

    /// Returns true if the labels under `metadata.labels` satisfy every requirement.
    #[must_use]
    pub fn matches(&self, data: Option<&Value>) -> bool {
        let labels: BTreeMap<&str, &str> = data
            .and_then(|d| d.get("metadata"))
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
                    .collect()
            })
            .unwrap_or_default();

        self.requirements.iter().all(|(key, value, equal)| {
            let actual = labels.get(key.as_str());
            if *equal {
                actual == Some(&value.as_str())
            } else {
                actual != Some(&value.as_str())
            }
        })
    }
}
