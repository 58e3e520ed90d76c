//! Test doubles shared by the watch tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AccessError, StoreError};
use crate::memory::MemoryStore;
use crate::schema::{AccessControl, EventReceiver, Schema, Schemas, WatchStore};
use crate::ws::key::{WatchRequest, WatchScope};
use crate::ws::messages::ApiEvent;

/// Access control that denies every watch.
pub struct DenyAll;

impl AccessControl for DenyAll {
    fn can_watch(&self, schema: &Schema, _scope: &WatchScope) -> Result<(), AccessError> {
        Err(AccessError::new(format!("cannot watch {}", schema.id)))
    }
}

/// Store whose watch always fails.
pub struct FailingStore;

impl WatchStore for FailingStore {
    fn watch(
        &self,
        _request: WatchRequest,
        _cancel: CancellationToken,
    ) -> Result<EventReceiver, StoreError> {
        Err(StoreError::new("backend unavailable"))
    }
}

/// Registry with `widgets` (watchable), `reports` (list only), and
/// `broken` (watch fails).
pub fn registry() -> (Schemas, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new("widgets"));
    let schemas = Schemas::new()
        .with(Schema::watchable("widgets", Arc::<MemoryStore>::clone(&store)))
        .with(Schema::list_only("reports"))
        .with(Schema::watchable("broken", Arc::new(FailingStore)));
    (schemas, store)
}

/// Receives the next event, or `None` if nothing arrives within a second.
pub async fn recv(rx: &mut mpsc::Receiver<ApiEvent>) -> Option<ApiEvent> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Returns true if no event arrives within 50ms.
pub async fn quiet(rx: &mut mpsc::Receiver<ApiEvent>) -> bool {
    !matches!(
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await,
        Ok(Some(_))
    )
}
