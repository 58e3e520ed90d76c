//! Watch scope and identity.
//!
//! A [`WatchKey`] matches a stop request to the pump started for the same
//! resource type and scope.

use std::fmt;

/// Scope of a watch: a single resource, a namespace, or a label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WatchScope {
    /// Single resource ID.
    pub id: Option<String>,
    /// Namespace.
    pub namespace: Option<String>,
    /// Label selector.
    pub selector: Option<String>,
}

impl WatchScope {
    /// Creates a scope, treating empty strings as absent.
    #[must_use]
    pub fn new(id: Option<&str>, namespace: Option<&str>, selector: Option<&str>) -> Self {
        fn present(value: Option<&str>) -> Option<String> {
            value.filter(|v| !v.is_empty()).map(str::to_string)
        }

        Self {
            id: present(id),
            namespace: present(namespace),
            selector: present(selector),
        }
    }

    /// Returns true if the scope covers every resource of the type.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.id.is_none() && self.namespace.is_none() && self.selector.is_none()
    }
}

/// Identity of an active watch within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    /// Resource type.
    pub resource_type: String,
    /// Scope supplied at start.
    pub scope: WatchScope,
}

impl WatchKey {
    /// Creates a key.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, scope: WatchScope) -> Self {
        Self {
            resource_type: resource_type.into(),
            scope,
        }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_type)?;
        let parts = [
            ("id", &self.scope.id),
            ("namespace", &self.scope.namespace),
            ("selector", &self.scope.selector),
        ];
        let mut first = true;
        for (label, value) in parts {
            if let Some(value) = value {
                f.write_str(if first { "[" } else { "," })?;
                write!(f, "{label}={value}")?;
                first = false;
            }
        }
        if !first {
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// Arguments passed to a store's watch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchRequest {
    /// Scope of the watch.
    pub scope: WatchScope,
    /// Revision to resume from.
    pub revision: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_new_drops_empty() {
        let scope = WatchScope::new(Some(""), Some("ns"), None);
        assert_eq!(scope.id, None);
        assert_eq!(scope.namespace.as_deref(), Some("ns"));
        assert!(!scope.is_global());
        assert!(WatchScope::new(Some(""), Some(""), Some("")).is_global());
    }

    #[test]
    fn test_key_equality_by_scope() {
        let a = WatchKey::new("widgets", WatchScope::new(Some("w1"), None, None));
        let b = WatchKey::new("widgets", WatchScope::new(Some("w1"), Some(""), None));
        let c = WatchKey::new("widgets", WatchScope::new(None, Some("w1"), None));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_display() {
        let key = WatchKey::new("widgets", WatchScope::default());
        assert_eq!(key.to_string(), "widgets");

        let key = WatchKey::new(
            "widgets",
            WatchScope::new(Some("w1"), Some("ns"), Some("app=web")),
        );
        assert_eq!(key.to_string(), "widgets[id=w1,namespace=ns,selector=app=web]");
    }
}
