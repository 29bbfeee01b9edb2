//! FallbackExecutor - Tiered escalation for stale schema cache failures
//!
//! TigerStyle: Fixed chain, bounded waits, errors returned as data.
//!
//! # Algorithm
//!
//! ```text
//! execute_with_fallback(operation, resource)
//!   │
//!   ├─ total_queries += 1
//!   ├─ Primary ──────────────── ok ──► data (used_fallback = false)
//!   │     │ err
//!   ├─ classifier ───────── not recoverable ──► original error
//!   ├─ enable_fallback? ──────── no ──► FallbackDisabled
//!   ├─ fallback_used += 1, sleep(retry_delay)
//!   ├─ CacheBypass (timeout) ── ok ──► data, reason = original
//!   │     │ err / timeout
//!   └─ DirectSql probe (timeout) ok ──► data, probe_only, "(direct SQL)"
//!         │ write ──────────────────► UnsupportedOperation, store untouched
//!         │ err / timeout / decode
//!         └──────────────────────────► last error, "(direct SQL failed)"
//! ```
//!
//! Losing a timeout race drops the attempt's future. The remote call may
//! still complete server-side; its result is discarded.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::classifier::{ErrorClassifier, SchemaCacheClassifier};
use crate::config::{ConfigError, ConnectionConfig, FallbackConfig, FallbackConfigUpdate};
use crate::constants::ENV_STORE_URL;
use crate::error::{FallbackError, StoreResult, TierFailure};
use crate::resource::ResourceDescriptor;
use crate::result::FallbackResult;
use crate::stats::{FallbackStatistics, StatEvent, StatsSnapshot};
use crate::store::{
    RestClient, RestClientOptions, RpcSqlExecutor, SqlHandle, StoreClient, StoreHandle,
};
use crate::tier::{DirectSqlFactory, ExecutionTier, TierSet};

// =============================================================================
// FallbackExecutor
// =============================================================================

/// Runs operations against the primary tier and escalates classified
/// failures through cache bypass and direct SQL.
pub struct FallbackExecutor {
    tiers: TierSet,
    classifier: Arc<dyn ErrorClassifier>,
    config: RwLock<FallbackConfig>,
    stats: Arc<FallbackStatistics>,
}

impl FallbackExecutor {
    /// Start building an executor from explicit tiers.
    #[must_use]
    pub fn builder() -> FallbackExecutorBuilder {
        FallbackExecutorBuilder::default()
    }

    /// Executor over the store's REST endpoint with default configuration.
    ///
    /// # Errors
    /// Returns an error if the connection settings are invalid.
    pub fn connect(conn: &ConnectionConfig) -> Result<Self, ConfigError> {
        Self::connect_with_config(conn, FallbackConfig::default())
    }

    /// Executor over the store's REST endpoint.
    ///
    /// Primary and cache-bypass clients are built eagerly. The direct SQL
    /// executor is built on first escalation to that tier: a Postgres pool if
    /// `database_url` is set and the `postgres` feature is enabled, otherwise
    /// the store's `exec_sql` function over a service-key client.
    ///
    /// # Errors
    /// Returns an error if the connection settings or `config` are invalid.
    pub fn connect_with_config(
        conn: &ConnectionConfig,
        config: FallbackConfig,
    ) -> Result<Self, ConfigError> {
        conn.validate()?;

        let rest = |options: RestClientOptions| -> Result<StoreHandle, ConfigError> {
            RestClient::new(options)
                .map(|client| Arc::new(client) as StoreHandle)
                .map_err(|e| ConfigError::Invalid {
                    field: ENV_STORE_URL,
                    reason: e.to_string(),
                })
        };

        Self::builder()
            .primary(rest(RestClientOptions::primary(conn))?)
            .cache_bypass(rest(RestClientOptions::cache_bypass(conn))?)
            .direct_sql_factory(direct_sql_factory(conn))
            .config(config)
            .build()
    }

    /// Run `operation` with tiered fallback.
    ///
    /// Every outcome is a [`FallbackResult`]; nothing is raised to the caller.
    /// Probe rows from the direct SQL tier are decoded into `T`.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        operation: F,
        resource: &ResourceDescriptor,
    ) -> FallbackResult<T>
    where
        T: DeserializeOwned,
        F: Fn(StoreHandle) -> Fut + Send + Sync,
        Fut: Future<Output = StoreResult<T>> + Send,
    {
        let execution_id = Uuid::new_v4();
        let config = self.config.read().await.clone();
        self.stats.record(StatEvent::Query);

        let primary_error = match operation(Arc::clone(self.tiers.primary())).await {
            Ok(data) => {
                tracing::debug!(
                    %execution_id,
                    resource = %resource.name,
                    operation = %resource.operation,
                    "primary tier succeeded"
                );
                return FallbackResult::primary(data);
            }
            Err(err) => err,
        };

        if !self.classifier.is_recoverable(&primary_error) {
            tracing::debug!(
                %execution_id,
                resource = %resource.name,
                error = %primary_error,
                "primary failure not recoverable"
            );
            return FallbackResult::unescalated(primary_error.into(), None);
        }

        let reason = primary_error.full_message();
        tracing::warn!(
            %execution_id,
            resource = %resource.name,
            operation = %resource.operation,
            %reason,
            "schema cache failure on primary tier"
        );

        if !config.enable_fallback {
            return FallbackResult::unescalated(
                FallbackError::FallbackDisabled {
                    reason: reason.clone(),
                },
                Some(reason),
            );
        }

        self.stats.record(StatEvent::FallbackUsed);
        if !config.retry_delay.is_zero() {
            tokio::time::sleep(config.retry_delay).await;
        }

        let bypass_error = match self
            .tiers
            .run_cache_bypass(&operation, config.fallback_timeout)
            .await
        {
            Ok(data) => {
                self.stats.record(StatEvent::FallbackSucceeded);
                tracing::info!(
                    %execution_id,
                    resource = %resource.name,
                    tier = %ExecutionTier::CacheBypass,
                    "fallback recovered"
                );
                return FallbackResult::recovered(data, ExecutionTier::CacheBypass, reason);
            }
            Err(err) => err,
        };
        tracing::warn!(
            %execution_id,
            resource = %resource.name,
            tier = %ExecutionTier::CacheBypass,
            error = %bypass_error,
            "cache bypass attempt failed"
        );

        let decoded = self
            .tiers
            .run_direct_probe(resource, config.fallback_timeout)
            .await
            .and_then(|rows| {
                serde_json::from_value::<T>(rows).map_err(|e| FallbackError::Decode {
                    message: e.to_string(),
                })
            });

        match decoded {
            Ok(data) => {
                self.stats.record(StatEvent::FallbackSucceeded);
                tracing::info!(
                    %execution_id,
                    resource = %resource.name,
                    tier = %ExecutionTier::DirectSql,
                    "fallback recovered with direct SQL probe"
                );
                FallbackResult::recovered(
                    data,
                    ExecutionTier::DirectSql,
                    format!("{reason} (direct SQL)"),
                )
            }
            Err(err @ FallbackError::UnsupportedOperation { .. }) => {
                self.stats.record(StatEvent::FallbackFailed);
                tracing::info!(
                    %execution_id,
                    resource = %resource.name,
                    operation = %resource.operation,
                    "direct SQL not legal for operation, chain exhausted"
                );
                FallbackResult::exhausted(
                    err,
                    ExecutionTier::CacheBypass,
                    format!(
                        "{reason} (direct SQL not supported for {})",
                        resource.operation
                    ),
                )
            }
            Err(err) => {
                self.stats.record(StatEvent::FallbackFailed);
                tracing::warn!(
                    %execution_id,
                    resource = %resource.name,
                    tier = %ExecutionTier::DirectSql,
                    error = %err,
                    "fallback chain exhausted"
                );
                FallbackResult::exhausted(
                    err,
                    ExecutionTier::DirectSql,
                    format!("{reason} (direct SQL failed)"),
                )
            }
        }
    }

    /// Current configuration.
    pub async fn config(&self) -> FallbackConfig {
        self.config.read().await.clone()
    }

    /// Apply a partial configuration update. Last write wins.
    ///
    /// # Errors
    /// Returns an error, and keeps the current configuration, if the merged
    /// result is invalid.
    pub async fn update_config(
        &self,
        update: FallbackConfigUpdate,
    ) -> Result<FallbackConfig, ConfigError> {
        let merged = {
            let mut config = self.config.write().await;
            let merged = config.merged(&update);
            merged.validate()?;
            *config = merged.clone();
            merged
        };
        tracing::info!(?update, "fallback config updated");
        Ok(merged)
    }

    /// Snapshot of the statistics counters.
    #[must_use]
    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zero the statistics counters.
    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// The shared statistics recorder.
    #[must_use]
    pub fn stats_handle(&self) -> Arc<FallbackStatistics> {
        Arc::clone(&self.stats)
    }

    /// The tier clients.
    #[must_use]
    pub fn tiers(&self) -> &TierSet {
        &self.tiers
    }

    /// Ask primary and cache-bypass to discard their schema cache.
    ///
    /// Both tiers are always attempted.
    ///
    /// # Errors
    /// Returns [`FallbackError::CacheClear`] listing every tier that failed.
    pub async fn clear_all_caches(&self) -> Result<(), FallbackError> {
        let mut failures = Vec::new();

        for (tier, client) in [
            (ExecutionTier::Primary, self.tiers.primary()),
            (ExecutionTier::CacheBypass, self.tiers.cache_bypass()),
        ] {
            match client.reload_schema().await {
                Ok(()) => tracing::info!(%tier, "schema cache cleared"),
                Err(err) => {
                    tracing::warn!(%tier, error = %err, "schema cache clear failed");
                    failures.push(TierFailure {
                        tier,
                        message: err.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FallbackError::CacheClear { failures })
        }
    }
}

impl std::fmt::Debug for FallbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExecutor")
            .field("tiers", &self.tiers)
            .finish_non_exhaustive()
    }
}

fn direct_sql_factory(conn: &ConnectionConfig) -> DirectSqlFactory {
    if let Some(factory) = postgres_factory(conn) {
        return factory;
    }

    let options = RestClientOptions::service(conn);
    Arc::new(move || {
        let client = RestClient::new(options.clone())?;
        Ok(Arc::new(RpcSqlExecutor::new(client)) as SqlHandle)
    })
}

#[cfg(feature = "postgres")]
fn postgres_factory(conn: &ConnectionConfig) -> Option<DirectSqlFactory> {
    let database_url = conn.database_url.clone()?;
    Some(Arc::new(move || {
        let executor = crate::store::PostgresSqlExecutor::connect_lazy(&database_url)?;
        Ok(Arc::new(executor) as SqlHandle)
    }))
}

#[cfg(not(feature = "postgres"))]
fn postgres_factory(_conn: &ConnectionConfig) -> Option<DirectSqlFactory> {
    None
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`FallbackExecutor`].
#[derive(Default)]
pub struct FallbackExecutorBuilder {
    primary: Option<StoreHandle>,
    cache_bypass: Option<StoreHandle>,
    direct_factory: Option<DirectSqlFactory>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
    config: Option<FallbackConfig>,
    stats: Option<Arc<FallbackStatistics>>,
}

impl FallbackExecutorBuilder {
    /// Set the primary client.
    #[must_use]
    pub fn primary(mut self, client: StoreHandle) -> Self {
        self.primary = Some(client);
        self
    }

    /// Set the cache-bypass client.
    #[must_use]
    pub fn cache_bypass(mut self, client: StoreHandle) -> Self {
        self.cache_bypass = Some(client);
        self
    }

    /// Set an already constructed direct SQL executor.
    #[must_use]
    pub fn direct_sql(mut self, executor: SqlHandle) -> Self {
        self.direct_factory = Some(Arc::new(move || Ok(Arc::clone(&executor))));
        self
    }

    /// Set a factory for the direct SQL executor, run on first use.
    #[must_use]
    pub fn direct_sql_factory(mut self, factory: DirectSqlFactory) -> Self {
        self.direct_factory = Some(factory);
        self
    }

    /// Replace the default schema cache classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the initial configuration.
    #[must_use]
    pub fn config(mut self, config: FallbackConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a statistics recorder.
    #[must_use]
    pub fn statistics(mut self, stats: Arc<FallbackStatistics>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Build the executor.
    ///
    /// # Errors
    /// Returns an error if a tier is missing or the configuration is invalid.
    pub fn build(self) -> Result<FallbackExecutor, ConfigError> {
        let primary = self.primary.ok_or(ConfigError::Missing("primary tier"))?;
        let cache_bypass = self
            .cache_bypass
            .ok_or(ConfigError::Missing("cache bypass tier"))?;
        let direct_factory = self
            .direct_factory
            .ok_or(ConfigError::Missing("direct SQL tier"))?;

        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(FallbackExecutor {
            tiers: TierSet::new(primary, cache_bypass, direct_factory),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(SchemaCacheClassifier::new())),
            config: RwLock::new(config),
            stats: self.stats.unwrap_or_default(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
