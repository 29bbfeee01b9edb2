//! Tiered Fallback - Recovery from stale schema cache failures
//!
//! TigerStyle: Fixed escalation chain, bounded waits, injectable everything.
//!
//! # Philosophy
//!
//! A hosted data store occasionally serves queries from stale schema
//! metadata and fails them with ordinary-looking errors. Retrying blindly
//! masks real bugs; giving up surfaces transient noise to users. The
//! executor classifies each failure and escalates only the recoverable ones:
//!
//! 1. Every tier is reached through an injectable interface
//! 2. Every escalated attempt is bounded by a timeout
//! 3. Writes are never replayed as raw SQL
//! 4. Outcomes are counted, including failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    FallbackExecutor                     │
//! ├─────────────────────────────────────────────────────────┤
//! │  ErrorClassifier      │ Is this a stale schema cache?   │
//! │  FallbackConfig       │ enable / delay / timeout        │
//! │  FallbackStatistics   │ Atomic counters, shared by Arc  │
//! ├─────────────────────────────────────────────────────────┤
//! │  TierSet: Primary ─► CacheBypass ─► DirectSql (reads)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  StoreClient: RestClient | SimStore                     │
//! │  SqlExecutor: RpcSqlExecutor | PostgresSqlExecutor      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use serde_json::json;
//! use tiered_fallback::{
//!     FallbackConfig, FallbackExecutor, ResourceDescriptor, SelectQuery, SimStore, StoreClient,
//!     StoreHandle,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let primary = Arc::new(SimStore::new("primary").with_table("trades", vec![json!({"id": 1})]));
//! let executor = FallbackExecutor::builder()
//!     .primary(primary.clone())
//!     .cache_bypass(Arc::new(primary.sharing("cache_bypass")))
//!     .direct_sql(Arc::new(primary.sharing("direct_sql")))
//!     .config(FallbackConfig {
//!         retry_delay: Duration::ZERO,
//!         ..FallbackConfig::default()
//!     })
//!     .build()?;
//!
//! primary.fail_next("Could not find the table 'public.trades' in the schema cache");
//!
//! let result = executor
//!     .execute_with_fallback(
//!         |store: StoreHandle| async move { store.select("trades", &SelectQuery::all()).await },
//!         &ResourceDescriptor::read("trades"),
//!     )
//!     .await;
//!
//! assert!(result.used_fallback);
//! assert_eq!(result.data, Some(json!([{"id": 1}])));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod resource;
pub mod result;
pub mod stats;
pub mod store;
pub mod tier;

// Re-export common types
pub use batch::{run_batch, BatchQuery, BatchSummary, CoreResourceReport, ResourceHealth};
pub use classifier::{
    is_recoverable_schema_error, ErrorClassifier, SchemaCacheClassifier,
    DEFAULT_SCHEMA_ERROR_INDICATORS,
};
pub use config::{ConfigError, ConnectionConfig, FallbackConfig, FallbackConfigUpdate};
pub use error::{FallbackError, StoreError, StoreResult, TierFailure};
pub use executor::{FallbackExecutor, FallbackExecutorBuilder};
pub use resource::{OperationKind, ResourceDescriptor};
pub use result::FallbackResult;
pub use stats::{FallbackStatistics, StatEvent, StatsSnapshot};
pub use store::{
    Fault, FaultInjector, Filter, FilterOp, RestClient, RestClientOptions, RpcSqlExecutor,
    SelectQuery, SimStore, SqlExecutor, SqlHandle, StoreClient, StoreHandle,
};
pub use tier::{DirectSqlFactory, ExecutionTier, TierSet};

#[cfg(feature = "postgres")]
pub use store::PostgresSqlExecutor;
