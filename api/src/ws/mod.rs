//! WebSocket watch sessions.
//!
//! A client opens a socket on `/watch` and sends control messages to start
//! and stop watches. Each watch is served by its own pump; all pumps of a
//! connection write into one ordered event sequence.
//!
//! # Control messages
//!
//! - `{"resourceType": "widgets"}` starts a watch
//! - `{"resourceType": "widgets", "mode": "notification"}` starts a
//!   debounced, payload-free watch
//! - `{"resourceType": "widgets", "stop": true}` stops it
//!
//! # Events
//!
//! - `resource.start` / `resource.stop` bracket a watch
//! - `resource.create`, `resource.change`, `resource.remove` relay changes
//! - `resource.changes` is the notification-mode signal
//! - `resource.error` reports an upstream failure and ends the watch

pub mod debouncer;
pub mod handler;
pub mod key;
pub mod lifecycle;
pub mod messages;
pub mod metrics;
pub mod pump;
pub mod session;

pub use debouncer::Debouncer;
pub use handler::{ws_handler, WsState};
pub use key::{WatchKey, WatchRequest, WatchScope};
pub use lifecycle::{SessionEnd, SessionLifecycle};
pub use messages::{ApiEvent, EventName, ServerMessage, SubscribeRequest, WatchMode};
pub use metrics::{WatchMetrics, WatchMetricsSnapshot};
pub use pump::{PumpHandle, WatchPump};
pub use session::{WatchContext, WatchSession};
