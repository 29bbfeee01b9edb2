//! StoreClient - Structured operations against the data store

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;

/// Shared handle passed to every query operation.
pub type StoreHandle = Arc<dyn StoreClient>;

// =============================================================================
// Query Types
// =============================================================================

/// Comparison used by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal
    Eq,
    /// Not equal
    Neq,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
}

impl FilterOp {
    /// Operator token as used in REST query strings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// A single `column <op> value` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Column name
    pub column: String,
    /// Comparison
    pub op: FilterOp,
    /// Right-hand value, as text
    pub value: String,
}

impl Filter {
    /// Create a filter.
    #[must_use]
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.to_string(),
        }
    }

    /// Shorthand for an equality filter.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }
}

/// A structured read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Column list, `*` for all
    pub columns: String,
    /// Conditions, combined with AND
    pub filters: Vec<Filter>,
    /// Sort column and direction (`true` = descending)
    pub order: Option<(String, bool)>,
    /// Row limit
    pub limit: Option<usize>,
}

impl Default for SelectQuery {
    fn default() -> Self {
        Self {
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }
}

impl SelectQuery {
    /// Select every column of every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict the column list.
    #[must_use]
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Add a condition.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sort by a column.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some((column.into(), descending));
        self
    }

    /// Limit the row count.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// =============================================================================
// StoreClient
// =============================================================================

/// Structured access to the data store. Payloads are JSON rows.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Name used in logs (e.g. `primary`, `cache_bypass`).
    fn label(&self) -> &str;

    /// Read rows.
    async fn select(&self, table: &str, query: &SelectQuery) -> StoreResult<Value>;

    /// Insert one row (object) or many (array); returns the stored rows.
    async fn insert(&self, table: &str, rows: Value) -> StoreResult<Value>;

    /// Patch matching rows; returns the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> StoreResult<Value>;

    /// Delete matching rows; returns the deleted rows.
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Value>;

    /// Call a server-side function.
    async fn rpc(&self, function: &str, params: Value) -> StoreResult<Value>;

    /// Ask the store to discard its cached schema metadata.
    async fn reload_schema(&self) -> StoreResult<()>;
}
