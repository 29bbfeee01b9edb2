//! Resource - What a query touches
//!
//! TigerStyle: Explicit operation kinds; the direct SQL tier only accepts reads.

use serde::{Deserialize, Serialize};

use crate::constants::RESOURCE_NAME_BYTES_MAX;

// =============================================================================
// Operation Kind
// =============================================================================

/// The kind of operation a query performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read rows
    Read,
    /// Insert rows
    Insert,
    /// Update rows
    Update,
    /// Delete rows
    Delete,
}

impl OperationKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse from string. Accepts `select` as an alias for `read`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" | "select" => Some(Self::Read),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// True if the operation does not modify the store.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Resource Descriptor
// =============================================================================

/// Identifies the resource a query targets and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Logical resource (table) name
    pub name: String,
    /// Kind of operation
    pub operation: OperationKind,
}

impl ResourceDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            name: name.into(),
            operation,
        }
    }

    /// Shorthand for a read descriptor.
    #[must_use]
    pub fn read(name: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Read)
    }

    /// True if `name` is safe to interpolate into a SQL statement.
    ///
    /// Accepts `ident` or `schema.ident`, where each part matches
    /// `[A-Za-z_][A-Za-z0-9_]*`.
    #[must_use]
    pub fn has_sql_safe_name(&self) -> bool {
        if self.name.is_empty() || self.name.len() > RESOURCE_NAME_BYTES_MAX {
            return false;
        }

        let parts: Vec<&str> = self.name.split('.').collect();
        if parts.len() > 2 {
            return false;
        }

        parts.iter().all(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                _ => false,
            }
        })
    }
}

impl std::fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation, self.name)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_round_trip_names() {
        for kind in [
            OperationKind::Read,
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete,
        ] {
            assert_eq!(OperationKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(OperationKind::from_str("SELECT"), Some(OperationKind::Read));
        assert_eq!(OperationKind::from_str("upsert"), None);
    }

    #[test]
    fn test_only_read_is_read() {
        assert!(OperationKind::Read.is_read());
        assert!(!OperationKind::Insert.is_read());
        assert!(!OperationKind::Update.is_read());
        assert!(!OperationKind::Delete.is_read());
    }

    #[test]
    fn test_sql_safe_names() {
        assert!(ResourceDescriptor::read("trades").has_sql_safe_name());
        assert!(ResourceDescriptor::read("public.strategy_rules").has_sql_safe_name());
        assert!(ResourceDescriptor::read("_t1").has_sql_safe_name());

        assert!(!ResourceDescriptor::read("").has_sql_safe_name());
        assert!(!ResourceDescriptor::read("1trades").has_sql_safe_name());
        assert!(!ResourceDescriptor::read("trades; drop table users").has_sql_safe_name());
        assert!(!ResourceDescriptor::read("a.b.c").has_sql_safe_name());
        assert!(!ResourceDescriptor::read("trades.").has_sql_safe_name());
        assert!(!ResourceDescriptor::read("x".repeat(RESOURCE_NAME_BYTES_MAX + 1)).has_sql_safe_name());
    }

    #[test]
    fn test_display() {
        let resource = ResourceDescriptor::new("trades", OperationKind::Delete);
        assert_eq!(resource.to_string(), "delete trades");
    }
}
