//! SqlExecutor - Literal statements with elevated credentials
//!
//! TigerStyle: Only the direct SQL tier holds one of these. Statements are
//! built here from validated identifiers, never from caller-supplied text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::StoreClient;
use super::rest::RestClient;
use crate::constants::{EXEC_SQL_RPC, PROBE_ROWS_COUNT_MAX};
use crate::error::{StoreError, StoreResult};
use crate::resource::ResourceDescriptor;

/// Shared handle to the direct SQL executor.
pub type SqlHandle = Arc<dyn SqlExecutor>;

/// Runs a literal SQL statement and returns its rows as a JSON array.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// Run `sql` and return the rows.
    async fn query(&self, sql: &str) -> StoreResult<Value>;
}

/// Build the bounded read-only probe for a resource.
///
/// # Errors
/// Returns [`StoreError::InvalidRequest`] if the resource name is not a plain
/// (optionally schema-qualified) identifier.
pub fn probe_statement(resource: &ResourceDescriptor) -> StoreResult<String> {
    if !resource.has_sql_safe_name() {
        return Err(StoreError::invalid_request(format!(
            "resource name {:?} is not a plain identifier",
            resource.name
        )));
    }
    Ok(format!(
        "SELECT * FROM {} LIMIT {PROBE_ROWS_COUNT_MAX}",
        resource.name
    ))
}

// =============================================================================
// RpcSqlExecutor
// =============================================================================

/// Runs statements through the store's `exec_sql` function.
///
/// The wrapped client must use the service profile; the function is expected
/// to return the statement's rows as JSON.
#[derive(Debug, Clone)]
pub struct RpcSqlExecutor {
    client: RestClient,
}

impl RpcSqlExecutor {
    /// Wrap a service-profile client.
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SqlExecutor for RpcSqlExecutor {
    fn label(&self) -> &str {
        self.client.label()
    }

    async fn query(&self, sql: &str) -> StoreResult<Value> {
        let rows = self.client.rpc(EXEC_SQL_RPC, json!({ "query": sql })).await?;
        Ok(match rows {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        })
    }
}
