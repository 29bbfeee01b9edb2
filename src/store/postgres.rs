//! PostgresSqlExecutor - Native direct SQL tier
//!
//! TigerStyle: Lazy connection pool, rows returned as one JSON aggregate.
//!
//! # Statement Shape
//!
//! ```sql
//! SELECT coalesce(json_agg(t), '[]'::json) FROM (<statement>) t
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::sql::SqlExecutor;
use crate::constants::POSTGRES_CONNECTIONS_COUNT_MAX;
use crate::error::{StoreError, StoreResult};

/// Direct SQL over a Postgres connection pool.
pub struct PostgresSqlExecutor {
    pool: PgPool,
}

impl PostgresSqlExecutor {
    /// Create an executor whose pool connects on first use.
    ///
    /// # Errors
    /// Returns error if the connection string cannot be parsed.
    pub fn connect_lazy(connection_string: &str) -> StoreResult<Self> {
        if !(connection_string.starts_with("postgres://")
            || connection_string.starts_with("postgresql://"))
        {
            return Err(StoreError::invalid_request(
                "connection string must be postgres URL",
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(POSTGRES_CONNECTIONS_COUNT_MAX)
            .connect_lazy(connection_string)
            .map_err(|e| StoreError::connection(format!("failed to configure pool: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SqlExecutor for PostgresSqlExecutor {
    fn label(&self) -> &str {
        "direct_sql"
    }

    async fn query(&self, sql: &str) -> StoreResult<Value> {
        let wrapped = format!("SELECT coalesce(json_agg(t), '[]'::json) FROM ({sql}) t");

        sqlx::query_scalar::<_, Value>(&wrapped)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) => StoreError::Query {
                    message: db.message().to_string(),
                    code: db.code().map(|c| c.to_string()),
                    details: None,
                    hint: None,
                },
                other => StoreError::connection(other.to_string()),
            })
    }
}

// =============================================================================
// Tests (require running Postgres)
// =============================================================================
