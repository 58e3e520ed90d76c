//! WebSocket message types.
//!
//! Client control messages are untagged JSON objects; `"stop": true`
//! distinguishes a stop request from a start request. Server events are
//! serialized [`ApiEvent`]s, and synchronous rejections are
//! [`ServerMessage`]s.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::key::{WatchKey, WatchScope};
use crate::error::WatchError;

/// Delivery mode of a watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchMode {
    /// Full change events with data.
    #[default]
    #[serde(rename = "")]
    Default,

    /// Debounced notifications without data.
    #[serde(rename = "notification")]
    Notification,
}

impl WatchMode {
    /// Returns true for the default mode.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::Default
    }
}

/// Start or stop request sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Resource type to watch.
    #[serde(default)]
    pub resource_type: String,

    /// Single resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Namespace filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Revision to resume from, passed to the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Delivery mode.
    #[serde(default, skip_serializing_if = "WatchMode::is_default")]
    pub mode: WatchMode,

    /// Debounce interval override for notification mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// True for a stop request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stop: bool,
}

impl SubscribeRequest {
    /// Creates a start request for a resource type.
    #[must_use]
    pub fn watch(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Parses a control message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if the text is not a valid request.
    pub fn parse(text: &str) -> Result<Self, WatchError> {
        serde_json::from_str(text).map_err(|e| WatchError::InvalidMessage(e.to_string()))
    }

    /// Sets the resource ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the label selector.
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Sets the delivery mode.
    #[must_use]
    pub fn with_mode(mut self, mode: WatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Turns this request into a stop request.
    #[must_use]
    pub fn into_stop(mut self) -> Self {
        self.stop = true;
        self
    }

    /// Returns the scope of the watch, ignoring empty fields.
    #[must_use]
    pub fn scope(&self) -> WatchScope {
        WatchScope::new(
            self.id.as_deref(),
            self.namespace.as_deref(),
            self.selector.as_deref(),
        )
    }

    /// Returns the key matching this request to an active watch.
    #[must_use]
    pub fn key(&self) -> WatchKey {
        WatchKey::new(&self.resource_type, self.scope())
    }
}

/// Name of an event on the outbound sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// Watch established.
    #[serde(rename = "resource.start")]
    Start,

    /// Resource created.
    #[serde(rename = "resource.create")]
    Create,

    /// Resource changed.
    #[serde(rename = "resource.change")]
    Change,

    /// Resource removed.
    #[serde(rename = "resource.remove")]
    Remove,

    /// Debounced notification.
    #[serde(rename = "resource.changes")]
    Changes,

    /// Watch or session terminated.
    #[serde(rename = "resource.stop")]
    Stop,

    /// Terminal failure.
    #[serde(rename = "resource.error")]
    Error,
}

impl EventName {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "resource.start",
            Self::Create => "resource.create",
            Self::Change => "resource.change",
            Self::Remove => "resource.remove",
            Self::Changes => "resource.changes",
            Self::Stop => "resource.stop",
            Self::Error => "resource.error",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    /// Event name.
    pub name: EventName,

    /// Resource type.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,

    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector of the watch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Delivery mode of the watch.
    #[serde(default, skip_serializing_if = "WatchMode::is_default")]
    pub mode: WatchMode,

    /// Payload; absent in notification mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Latest known revision.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Terminal failure carried by the event.
    #[serde(skip)]
    pub error: Option<WatchError>,
}

impl ApiEvent {
    /// Creates an empty event with the given name.
    #[must_use]
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            resource_type: String::new(),
            namespace: None,
            selector: None,
            id: None,
            mode: WatchMode::Default,
            data: None,
            revision: String::new(),
            error: None,
        }
    }

    /// Creates the terminal event of an expired session.
    #[must_use]
    pub fn session_stop() -> Self {
        Self::new(EventName::Stop)
    }

    /// Creates an upstream failure as a store would report it.
    #[must_use]
    pub fn upstream_error(message: impl Into<String>) -> Self {
        let mut event = Self::new(EventName::Error);
        event.error = Some(WatchError::Upstream(message.into()));
        event
    }

    /// Sets the resource type.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the resource ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Copies the watch scope onto the event where the event has none.
    #[must_use]
    pub fn scoped(mut self, resource_type: &str, scope: &WatchScope, mode: WatchMode) -> Self {
        if self.resource_type.is_empty() {
            self.resource_type = resource_type.to_string();
        }
        if self.namespace.is_none() {
            self.namespace.clone_from(&scope.namespace);
        }
        if scope.id.is_some() {
            self.id.clone_from(&scope.id);
        }
        self.selector.clone_from(&scope.selector);
        self.mode = mode;
        self
    }

    /// Turns the error into a `resource.error` event with the error detail as data.
    #[must_use]
    pub fn from_error(error: WatchError) -> Self {
        let mut event = Self::new(EventName::Error);
        event.data = Some(json!({
            "type": "error",
            "code": error.code(),
            "message": error.to_string(),
        }));
        event.error = Some(error);
        event
    }

    /// Returns true if the event signals a terminal failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Protocol response sent directly to the client, outside the event sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Rejected control message.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// Resource type of the rejected request.
        #[serde(
            rename = "resourceType",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        resource_type: Option<String>,
    },
}

impl ServerMessage {
    /// Creates the rejection of a control message.
    #[must_use]
    pub fn rejected(error: &WatchError, resource_type: Option<&str>) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            resource_type: resource_type
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_start() {
        let json = r#"{"resourceType":"widgets","namespace":"default","resourceVersion":"42"}"#;
        let req = SubscribeRequest::parse(json).expect("parse");
        assert_eq!(req.resource_type, "widgets");
        assert_eq!(req.namespace.as_deref(), Some("default"));
        assert_eq!(req.resource_version.as_deref(), Some("42"));
        assert_eq!(req.mode, WatchMode::Default);
        assert!(!req.stop);
    }

    #[test]
    fn test_deserialize_notification_mode() {
        let json = r#"{"resourceType":"widgets","mode":"notification","debounceMs":250}"#;
        let req = SubscribeRequest::parse(json).expect("parse");
        assert_eq!(req.mode, WatchMode::Notification);
        assert_eq!(req.debounce_ms, Some(250));

        let json = r#"{"resourceType":"widgets","mode":""}"#;
        let req = SubscribeRequest::parse(json).expect("parse");
        assert_eq!(req.mode, WatchMode::Default);
    }

    #[test]
    fn test_deserialize_stop() {
        let json = r#"{"stop":true,"resourceType":"widgets","id":"w1"}"#;
        let req = SubscribeRequest::parse(json).expect("parse");
        assert!(req.stop);
        assert_eq!(req.key(), SubscribeRequest::watch("widgets").with_id("w1").key());
    }

    #[test]
    fn test_deserialize_invalid() {
        let err = SubscribeRequest::parse("not json").expect_err("error");
        assert_eq!(err.code(), "INVALID_MESSAGE");

        let err = SubscribeRequest::parse(r#"{"resourceType":"w","mode":"loud"}"#)
            .expect_err("error");
        assert_eq!(err.code(), "INVALID_MESSAGE");
    }

    #[test]
    fn test_request_scope_ignores_empty_fields() {
        let json = r#"{"resourceType":"widgets","id":"","namespace":"ns","selector":""}"#;
        let req = SubscribeRequest::parse(json).expect("parse");
        let scope = req.scope();
        assert_eq!(scope.id, None);
        assert_eq!(scope.namespace.as_deref(), Some("ns"));
        assert_eq!(scope.selector, None);
    }

    #[test]
    fn test_serialize_start_event() {
        let event = ApiEvent::new(EventName::Start).with_resource_type("widgets");
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"name": "resource.start", "resourceType": "widgets"})
        );
    }

    #[test]
    fn test_serialize_notification_event_has_no_data() {
        let mut event = ApiEvent::new(EventName::Changes)
            .with_resource_type("widgets")
            .with_revision("7");
        event.mode = WatchMode::Notification;
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains(r#""mode":"notification""#));
        assert!(json.contains(r#""revision":"7""#));
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_scoped_fills_missing_fields() {
        let scope = WatchScope::new(None, Some("ns"), Some("app=web"));
        let event = ApiEvent::new(EventName::Change)
            .with_id("w1")
            .scoped("widgets", &scope, WatchMode::Default);
        assert_eq!(event.resource_type, "widgets");
        assert_eq!(event.namespace.as_deref(), Some("ns"));
        assert_eq!(event.selector.as_deref(), Some("app=web"));
        assert_eq!(event.id.as_deref(), Some("w1"));
    }

    #[test]
    fn test_error_event_data() {
        let event = ApiEvent::from_error(WatchError::Upstream("boom".to_string()));
        assert_eq!(event.name, EventName::Error);
        assert!(event.is_error());
        let data = event.data.expect("data");
        assert_eq!(data["code"], "UPSTREAM_ERROR");
        assert_eq!(data["message"], "upstream watch error: boom");
    }

    #[test]
    fn test_server_message_rejected() {
        let msg = ServerMessage::rejected(
            &WatchError::SchemaNotFound("gizmos".to_string()),
            Some("gizmos"),
        );
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "SCHEMA_NOT_FOUND");
        assert_eq!(json["resourceType"], "gizmos");
    }

    #[test]
    fn test_rejected_without_resource_type() {
        let msg = ServerMessage::rejected(&WatchError::InvalidMessage("bad".to_string()), None);
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains("INVALID_MESSAGE"));
        assert!(!json.contains("resourceType"));
    }
}
