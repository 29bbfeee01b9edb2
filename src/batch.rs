//! Batch - Sequential multi-query runs and the core resource health check
//!
//! TigerStyle: Order-preserving, one executor, one statistics recorder.
//!
//! Used by operational tooling, not by request-serving code paths.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CORE_RESOURCES, PROBE_ROWS_COUNT_MAX};
use crate::error::StoreResult;
use crate::executor::FallbackExecutor;
use crate::resource::{OperationKind, ResourceDescriptor};
use crate::result::FallbackResult;
use crate::store::{SelectQuery, StoreHandle};
use crate::tier::ExecutionTier;

/// Type-erased query operation.
pub type BoxedOperation<T> =
    Arc<dyn Fn(StoreHandle) -> BoxFuture<'static, StoreResult<T>> + Send + Sync>;

// =============================================================================
// BatchQuery
// =============================================================================

/// One entry of a batch: an operation and the resource it targets.
pub struct BatchQuery<T> {
    /// Target resource
    pub resource: ResourceDescriptor,
    operation: BoxedOperation<T>,
}

impl<T: 'static> BatchQuery<T> {
    /// Wrap an operation.
    pub fn new<F, Fut>(resource: ResourceDescriptor, operation: F) -> Self
    where
        F: Fn(StoreHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
    {
        Self {
            resource,
            operation: Arc::new(move |store| operation(store).boxed()),
        }
    }
}

impl BatchQuery<Value> {
    /// Read at most `limit` rows of `table`.
    #[must_use]
    pub fn read_rows(table: &str, limit: usize) -> Self {
        let name = table.to_string();
        Self::new(ResourceDescriptor::read(table), move |store: StoreHandle| {
            let name = name.clone();
            async move { store.select(&name, &SelectQuery::all().limit(limit)).await }
        })
    }
}

impl<T> Clone for BatchQuery<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<T> std::fmt::Debug for BatchQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQuery")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Run every query in order, one at a time.
///
/// Results line up with `queries` index for index.
pub async fn run_batch<T>(
    executor: &FallbackExecutor,
    queries: Vec<BatchQuery<T>>,
) -> Vec<FallbackResult<T>>
where
    T: DeserializeOwned,
{
    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        let operation = Arc::clone(&query.operation);
        let result = executor
            .execute_with_fallback(move |store| operation(store), &query.resource)
            .await;
        results.push(result);
    }
    results
}

impl FallbackExecutor {
    /// Run several queries sequentially with fallback. See [`run_batch`].
    pub async fn execute_multiple_with_fallback<T>(
        &self,
        queries: Vec<BatchQuery<T>>,
    ) -> Vec<FallbackResult<T>>
    where
        T: DeserializeOwned,
    {
        run_batch(self, queries).await
    }

    /// Probe every core resource.
    pub async fn test_core_resources(&self) -> CoreResourceReport {
        self.test_resources(CORE_RESOURCES).await
    }

    /// Read up to `PROBE_ROWS_COUNT_MAX` rows of each named resource.
    pub async fn test_resources(&self, names: &[&str]) -> CoreResourceReport {
        let queries: Vec<_> = names
            .iter()
            .map(|name| BatchQuery::read_rows(name, PROBE_ROWS_COUNT_MAX))
            .collect();
        let resources: Vec<ResourceDescriptor> =
            queries.iter().map(|q| q.resource.clone()).collect();

        let results = run_batch(self, queries).await;

        let report = CoreResourceReport::from_results(&resources, &results);
        tracing::info!(
            total = report.summary.total,
            success = report.summary.success,
            fallback_used = report.summary.fallback_used,
            failed = report.summary.failed,
            "core resource check finished"
        );
        report
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Serializable outcome for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHealth {
    /// Resource name
    pub resource: String,
    /// Operation kind
    pub operation: OperationKind,
    /// True if data was produced
    pub success: bool,
    /// True if escalation past primary happened
    pub used_fallback: bool,
    /// Tier that produced the outcome
    pub tier: Option<ExecutionTier>,
    /// True if the rows came from the direct SQL probe
    pub probe_only: bool,
    /// Rows returned, when the data is an array
    pub row_count: Option<usize>,
    /// Fallback reason, if any
    pub fallback_reason: Option<String>,
    /// Error text, if any
    pub error: Option<String>,
}

impl ResourceHealth {
    /// Summarize one result.
    #[must_use]
    pub fn from_result(resource: &ResourceDescriptor, result: &FallbackResult<Value>) -> Self {
        Self {
            resource: resource.name.clone(),
            operation: resource.operation,
            success: result.is_ok(),
            used_fallback: result.used_fallback,
            tier: result.tier,
            probe_only: result.probe_only,
            row_count: result
                .data
                .as_ref()
                .and_then(Value::as_array)
                .map(Vec::len),
            fallback_reason: result.fallback_reason.clone(),
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Counts across a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Queries run
    pub total: usize,
    /// Queries that produced data
    pub success: usize,
    /// Queries that escalated
    pub fallback_used: usize,
    /// Queries that produced no data
    pub failed: usize,
}

impl BatchSummary {
    /// Tally a set of results.
    #[must_use]
    pub fn from_results<T>(results: &[FallbackResult<T>]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            summary.total += 1;
            if result.is_ok() {
                summary.success += 1;
            } else {
                summary.failed += 1;
            }
            if result.used_fallback {
                summary.fallback_used += 1;
            }
            summary
        })
    }
}

/// Health of a set of resources at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreResourceReport {
    /// When the check finished
    pub checked_at: DateTime<Utc>,
    /// Per-resource outcomes, in request order
    pub resources: Vec<ResourceHealth>,
    /// Totals
    pub summary: BatchSummary,
}

impl CoreResourceReport {
    /// Build a report from parallel descriptor and result slices.
    #[must_use]
    pub fn from_results(
        resources: &[ResourceDescriptor],
        results: &[FallbackResult<Value>],
    ) -> Self {
        Self {
            checked_at: Utc::now(),
            resources: resources
                .iter()
                .zip(results)
                .map(|(resource, result)| ResourceHealth::from_result(resource, result))
                .collect(),
            summary: BatchSummary::from_results(results),
        }
    }

    /// True if every resource produced data.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.summary.failed == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
