//! Error types for watch sessions.
//!
//! Start-time failures (`SchemaNotFound`, `UnsupportedOperation`,
//! `Forbidden`, `StartFailed`) are returned synchronously from a start
//! request and never reach the outbound event sequence. `Upstream` is
//! delivered as a `resource.error` event and ends only the watch that
//! produced it.

use thiserror::Error;

/// Errors raised by the watch session, its pumps, and their collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// No schema is registered for the resource type.
    #[error("failed to find schema {0}")]
    SchemaNotFound(String),

    /// The schema's store cannot watch.
    #[error("schema {0} does not support watching")]
    UnsupportedOperation(String),

    /// Access control denied the watch.
    #[error("watch on {resource_type} forbidden: {source}")]
    Forbidden {
        /// Resource type of the rejected watch.
        resource_type: String,
        /// Denial reported by access control.
        #[source]
        source: AccessError,
    },

    /// The store refused to open the upstream watch.
    #[error("failed to start watch on {resource_type}: {source}")]
    StartFailed {
        /// Resource type of the failed watch.
        resource_type: String,
        /// Error returned by the store.
        #[source]
        source: StoreError,
    },

    /// The upstream watch channel surfaced an error mid-stream.
    #[error("upstream watch error: {0}")]
    Upstream(String),

    /// The session reached its maximum duration.
    #[error("watch session expired")]
    SessionExpired,

    /// A control message could not be decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl WatchError {
    /// Returns the stable error code sent to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            Self::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::StartFailed { .. } => "START_FAILED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
        }
    }

    /// Returns the resource type the error refers to, if any.
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            Self::SchemaNotFound(resource_type) | Self::UnsupportedOperation(resource_type) => {
                Some(resource_type.as_str())
            }
            Self::Forbidden { resource_type, .. } | Self::StartFailed { resource_type, .. } => {
                Some(resource_type.as_str())
            }
            Self::Upstream(_) | Self::SessionExpired | Self::InvalidMessage(_) => None,
        }
    }

    /// Returns true for failures returned synchronously from a start request.
    #[must_use]
    pub const fn is_start_failure(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound(_)
                | Self::UnsupportedOperation(_)
                | Self::Forbidden { .. }
                | Self::StartFailed { .. }
        )
    }
}

/// Error returned by a store when opening a watch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Creates a store error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Denial returned by access control.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AccessError(pub String);

impl AccessError {
    /// Creates an access denial from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchError::SchemaNotFound("widgets".to_string());
        assert_eq!(err.to_string(), "failed to find schema widgets");

        let err = WatchError::UnsupportedOperation("widgets".to_string());
        assert_eq!(err.to_string(), "schema widgets does not support watching");
    }

    #[test]
    fn test_error_display_wraps_source() {
        let err = WatchError::Forbidden {
            resource_type: "widgets".to_string(),
            source: AccessError::new("user cannot watch widgets"),
        };
        assert_eq!(
            err.to_string(),
            "watch on widgets forbidden: user cannot watch widgets"
        );

        let err = WatchError::StartFailed {
            resource_type: "widgets".to_string(),
            source: StoreError::new("backend unavailable"),
        };
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            WatchError::SchemaNotFound(String::new()).code(),
            "SCHEMA_NOT_FOUND"
        );
        assert_eq!(WatchError::Upstream(String::new()).code(), "UPSTREAM_ERROR");
        assert_eq!(WatchError::SessionExpired.code(), "SESSION_EXPIRED");
    }

    #[test]
    fn test_error_resource_type() {
        let err = WatchError::StartFailed {
            resource_type: "widgets".to_string(),
            source: StoreError::new("backend unavailable"),
        };
        assert_eq!(err.resource_type(), Some("widgets"));
        assert_eq!(WatchError::InvalidMessage(String::new()).resource_type(), None);
    }

    #[test]
    fn test_start_failures() {
        assert!(WatchError::SchemaNotFound(String::new()).is_start_failure());
        assert!(WatchError::UnsupportedOperation(String::new()).is_start_failure());
        assert!(!WatchError::Upstream(String::new()).is_start_failure());
        assert!(!WatchError::SessionExpired.is_start_failure());
        assert!(!WatchError::InvalidMessage(String::new()).is_start_failure());
    }
}
