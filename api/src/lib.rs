//! Resource Watch API - WebSocket watch sessions for resource change events.
//!
//! A client opens one WebSocket and starts any number of watches, each
//! scoped to a resource type and optional id, namespace, or label
//! selector. Every watch is served by an independent pump that relays the
//! store's change events, or debounced payload-free notifications, into the
//! connection's single outbound sequence.
//!
//! # Components
//!
//! - [`config`]: Session configuration
//! - [`error`]: Error taxonomy
//! - [`schema`]: Schema registry, store, and access control seams
//! - [`memory`]: In-process watchable store
//! - [`ws`]: Watch sessions, pumps, debouncer, and the WebSocket handler
//! - [`server`]: HTTP server and routes

pub mod config;
pub mod error;
pub mod memory;
pub mod schema;
pub mod server;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, WatchConfig};
pub use error::{AccessError, StoreError, WatchError};
pub use memory::{LabelSelector, MemoryStore};
pub use schema::{AccessControl, AllowAll, Schema, SchemaRegistry, Schemas, WatchStore};
pub use server::{router, AppState, Server, ServerConfig};
pub use ws::{ApiEvent, EventName, SubscribeRequest, WatchContext, WatchMode, WatchSession};
