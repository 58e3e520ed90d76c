//! Schema, store, and access-control seams consumed by watch sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AccessError, StoreError};
use crate::ws::key::{WatchRequest, WatchScope};
use crate::ws::messages::ApiEvent;

/// Upstream change events produced by a store watch.
pub type EventReceiver = mpsc::Receiver<ApiEvent>;

/// Store capable of watching a resource type.
///
/// The returned channel must close once `cancel` fires. A mid-stream
/// failure is reported as an event with `error` set, after which the
/// store should close the channel.
pub trait WatchStore: Send + Sync {
    /// Opens an upstream watch.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch cannot be opened.
    fn watch(
        &self,
        request: WatchRequest,
        cancel: CancellationToken,
    ) -> Result<EventReceiver, StoreError>;
}

/// Access control for watches.
pub trait AccessControl: Send + Sync {
    /// Checks whether the caller may watch the schema within the scope.
    ///
    /// # Errors
    ///
    /// Returns the denial if the watch is not allowed.
    fn can_watch(&self, schema: &Schema, scope: &WatchScope) -> Result<(), AccessError>;
}

/// Access control that permits every watch.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_watch(&self, _schema: &Schema, _scope: &WatchScope) -> Result<(), AccessError> {
        Ok(())
    }
}

/// A registered resource type.
#[derive(Clone)]
pub struct Schema {
    /// Resource type ID.
    pub id: String,
    /// Store backing the type; `None` if it cannot be watched.
    pub store: Option<Arc<dyn WatchStore>>,
}

impl Schema {
    /// Creates a schema backed by a watchable store.
    #[must_use]
    pub fn watchable(id: impl Into<String>, store: Arc<dyn WatchStore>) -> Self {
        Self {
            id: id.into(),
            store: Some(store),
        }
    }

    /// Creates a schema without watch support.
    #[must_use]
    pub fn list_only(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            store: None,
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("watchable", &self.store.is_some())
            .finish()
    }
}

/// Lookup of schemas by resource type.
pub trait SchemaRegistry: Send + Sync {
    /// Resolves the schema for a resource type.
    fn resolve(&self, resource_type: &str) -> Option<Arc<Schema>>;
}

/// In-memory schema registry.
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    schemas: HashMap<String, Arc<Schema>>,
}

impl Schemas {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous schema with the same ID.
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.id.clone(), Arc::new(schema));
    }

    /// Registers a schema and returns the registry.
    #[must_use]
    pub fn with(mut self, schema: Schema) -> Self {
        self.register(schema);
        self
    }

    /// Returns the number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no schema is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaRegistry for Schemas {
    fn resolve(&self, resource_type: &str) -> Option<Arc<Schema>> {
        self.schemas.get(resource_type).cloned()
    }
}
