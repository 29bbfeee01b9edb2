//! Tiers - The three ways to reach the data
//!
//! TigerStyle: Fixed escalation order, every escalated attempt bounded.
//!
//! ```text
//! ┌──────────────┐  recoverable  ┌──────────────┐  failed/timeout  ┌──────────────┐
//! │   Primary    │──────────────►│ Cache Bypass │─────────────────►│  Direct SQL  │
//! │ (anon, hot)  │               │ (no-cache)   │                  │ (probe only) │
//! └──────────────┘               └──────────────┘                  └──────────────┘
//! ```
//!
//! The direct SQL executor is created on first use and reused afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FallbackError, StoreResult};
use crate::resource::ResourceDescriptor;
use crate::store::{probe_statement, SqlHandle, StoreHandle};

// =============================================================================
// ExecutionTier
// =============================================================================

/// One step of the escalation chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTier {
    /// Normal client
    Primary,
    /// Client that asks every intermediary to skip caches
    CacheBypass,
    /// Generic probe with elevated credentials
    DirectSql,
}

impl ExecutionTier {
    /// Stable name for logs and reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::CacheBypass => "cache_bypass",
            Self::DirectSql => "direct_sql",
        }
    }

    /// Parse from a stable name.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "cache_bypass" => Some(Self::CacheBypass),
            "direct_sql" => Some(Self::DirectSql),
            _ => None,
        }
    }

    /// True for every tier past primary.
    #[must_use]
    pub fn is_escalated(&self) -> bool {
        !matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for ExecutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TierSet
// =============================================================================

/// Creates the direct SQL executor on first use.
pub type DirectSqlFactory = Arc<dyn Fn() -> StoreResult<SqlHandle> + Send + Sync>;

/// The clients behind each tier.
pub struct TierSet {
    primary: StoreHandle,
    cache_bypass: StoreHandle,
    direct: OnceCell<SqlHandle>,
    direct_factory: DirectSqlFactory,
}

impl TierSet {
    /// Tiers with a lazily created direct SQL executor.
    #[must_use]
    pub fn new(
        primary: StoreHandle,
        cache_bypass: StoreHandle,
        direct_factory: DirectSqlFactory,
    ) -> Self {
        Self {
            primary,
            cache_bypass,
            direct: OnceCell::new(),
            direct_factory,
        }
    }

    /// Tiers with an already constructed direct SQL executor.
    #[must_use]
    pub fn with_direct(primary: StoreHandle, cache_bypass: StoreHandle, direct: SqlHandle) -> Self {
        let tiers = Self::new(
            primary,
            cache_bypass,
            Arc::new(|| {
                Err(crate::error::StoreError::invalid_request(
                    "direct SQL executor already set",
                ))
            }),
        );
        // Fresh cell, cannot already be set.
        let _ = tiers.direct.set(direct);
        tiers
    }

    /// Primary client.
    #[must_use]
    pub fn primary(&self) -> &StoreHandle {
        &self.primary
    }

    /// Cache-bypass client.
    #[must_use]
    pub fn cache_bypass(&self) -> &StoreHandle {
        &self.cache_bypass
    }

    /// True once the direct SQL executor exists.
    #[must_use]
    pub fn direct_sql_ready(&self) -> bool {
        self.direct.get().is_some()
    }

    /// Direct SQL executor, created on first call.
    ///
    /// # Errors
    /// Returns the factory's error. A failed creation is retried next call.
    pub fn direct_sql(&self) -> StoreResult<&SqlHandle> {
        self.direct.get_or_try_init(|| (self.direct_factory)())
    }

    /// Run `operation` against the cache-bypass client within `timeout`.
    ///
    /// # Errors
    /// Returns the store error, or [`FallbackError::Timeout`] if the attempt
    /// did not finish in time. The attempt is dropped on timeout.
    pub async fn run_cache_bypass<T, F, Fut>(
        &self,
        operation: &F,
        timeout: Duration,
    ) -> Result<T, FallbackError>
    where
        F: Fn(StoreHandle) -> Fut + ?Sized,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempt = operation(Arc::clone(&self.cache_bypass));
        bounded(ExecutionTier::CacheBypass, timeout, attempt).await
    }

    /// Run the generic probe for `resource` within `timeout`.
    ///
    /// Only reads are replayed; any other operation kind is refused here
    /// without contacting the store.
    ///
    /// # Errors
    /// - [`FallbackError::UnsupportedOperation`] for anything but reads
    /// - [`FallbackError::Store`] if the name is unsafe, the executor cannot be
    ///   created, or the probe fails
    /// - [`FallbackError::Timeout`] if the probe did not finish in time
    pub async fn run_direct_probe(
        &self,
        resource: &ResourceDescriptor,
        timeout: Duration,
    ) -> Result<Value, FallbackError> {
        if !resource.operation.is_read() {
            return Err(FallbackError::UnsupportedOperation {
                operation: resource.operation.as_str().to_string(),
                resource: resource.name.clone(),
            });
        }

        let sql = probe_statement(resource)?;
        let executor = Arc::clone(self.direct_sql()?);
        tracing::debug!(executor = executor.label(), %sql, "running direct SQL probe");

        bounded(ExecutionTier::DirectSql, timeout, executor.query(&sql)).await
    }
}

impl std::fmt::Debug for TierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierSet")
            .field("primary", &self.primary.label())
            .field("cache_bypass", &self.cache_bypass.label())
            .field("direct_sql_ready", &self.direct_sql_ready())
            .finish()
    }
}

/// Await `attempt` for at most `timeout`.
async fn bounded<T, Fut>(
    tier: ExecutionTier,
    timeout: Duration,
    attempt: Fut,
) -> Result<T, FallbackError>
where
    Fut: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, attempt).await {
        Ok(outcome) => outcome.map_err(FallbackError::from),
        Err(_) => Err(FallbackError::Timeout {
            tier,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
