//! Escalation behaviour of the fallback executor against simulated tiers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tiered_fallback::{
    ExecutionTier, FallbackConfig, FallbackError, FallbackExecutor, FallbackStatistics, Fault,
    OperationKind, ResourceDescriptor, SelectQuery, SimStore, StoreClient, StoreError,
    StoreHandle, StoreResult,
};
use tokio_test::{assert_err, assert_ok};

const SCHEMA_ERROR: &str = "Could not find the table 'public.trades' in the schema cache";

struct Tiers {
    primary: Arc<SimStore>,
    bypass: Arc<SimStore>,
    direct: Arc<SimStore>,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn tiers() -> Tiers {
    let primary = Arc::new(SimStore::new("primary").with_table(
        "trades",
        vec![
            json!({"id": 1, "symbol": "AAPL"}),
            json!({"id": 2, "symbol": "MSFT"}),
        ],
    ));
    Tiers {
        bypass: Arc::new(primary.sharing("cache_bypass")),
        direct: Arc::new(primary.sharing("direct_sql")),
        primary,
    }
}

fn executor(tiers: &Tiers, config: FallbackConfig) -> FallbackExecutor {
    FallbackExecutor::builder()
        .primary(tiers.primary.clone())
        .cache_bypass(tiers.bypass.clone())
        .direct_sql(tiers.direct.clone())
        .config(config)
        .build()
        .unwrap()
}

fn fast_config() -> FallbackConfig {
    FallbackConfig {
        retry_delay: Duration::ZERO,
        fallback_timeout: Duration::from_millis(500),
        ..FallbackConfig::default()
    }
}

async fn select_trades(store: StoreHandle) -> StoreResult<Value> {
    store.select("trades", &SelectQuery::all()).await
}

#[tokio::test]
async fn test_primary_success_is_fast_path() {
    init_logging();
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    let invocations = Arc::new(AtomicUsize::new(0));

    let counter = invocations.clone();
    let result = executor
        .execute_with_fallback(
            move |store: StoreHandle| {
                counter.fetch_add(1, Ordering::SeqCst);
                select_trades(store)
            },
            &ResourceDescriptor::read("trades"),
        )
        .await;

    assert!(result.is_ok());
    assert!(!result.used_fallback);
    assert_eq!(result.fallback_reason, None);
    assert_eq!(result.tier, Some(ExecutionTier::Primary));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let stats = executor.statistics();
    assert_eq!(stats.total_queries, 1);
    assert_eq!(stats.fallback_used, 0);
}

#[tokio::test]
async fn test_unrecognized_error_is_returned_verbatim() {
    init_logging();
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    let original = StoreError::query_with_code("permission denied for table trades", "42501");
    tiers.primary.push_fault(Fault::Error(original.clone()));

    let result = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    assert_eq!(result.error, Some(FallbackError::Store(original)));
    assert!(!result.used_fallback);
    assert_eq!(tiers.bypass.calls(), 0);
    assert_eq!(tiers.direct.calls(), 0);
    assert_eq!(executor.statistics().fallback_used, 0);
}

#[tokio::test]
async fn test_disabled_fallback_is_honored() {
    init_logging();
    let tiers = tiers();
    let executor = executor(
        &tiers,
        FallbackConfig {
            enable_fallback: false,
            ..fast_config()
        },
    );
    tiers.primary.fail_next(SCHEMA_ERROR);

    let result = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    assert!(!result.used_fallback);
    let error = result.error.unwrap();
    assert!(error.to_string().contains("disabled"));
    assert_eq!(result.fallback_reason.as_deref(), Some(SCHEMA_ERROR));
    assert_eq!(tiers.bypass.calls(), 0);
    assert_eq!(executor.statistics().fallback_used, 0);
}

#[tokio::test]
async fn test_cache_bypass_recovers() {
    init_logging();
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    tiers.primary.fail_next(SCHEMA_ERROR);

    let result = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    assert!(result.used_fallback);
    assert!(!result.probe_only);
    assert_eq!(result.tier, Some(ExecutionTier::CacheBypass));
    assert_eq!(
        result.data,
        Some(json!([{"id": 1, "symbol": "AAPL"}, {"id": 2, "symbol": "MSFT"}]))
    );
    assert_eq!(executor.statistics().fallback_success, 1);
    assert_eq!(tiers.direct.calls(), 0);
}

#[tokio::test]
async fn test_writes_never_reach_direct_sql() {
    init_logging();
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    tiers.primary.fail_next(SCHEMA_ERROR);
    tiers.bypass.fail_next(SCHEMA_ERROR);

    let result = executor
        .execute_with_fallback(
            |store: StoreHandle| async move {
                store
                    .insert("trades", json!({"id": 3, "symbol": "TSLA"}))
                    .await
            },
            &ResourceDescriptor::new("trades", OperationKind::Insert),
        )
        .await;

    assert!(result.used_fallback);
    let error = assert_err!(result.clone().into_result());
    assert!(error.to_string().contains("not supported for insert"));
    assert!(result
        .fallback_reason
        .as_deref()
        .unwrap()
        .contains("direct SQL not supported for insert"));
    assert_eq!(result.tier, Some(ExecutionTier::CacheBypass));
    assert_eq!(tiers.direct.calls(), 0);
    assert_eq!(tiers.primary.rows("trades").unwrap().len(), 2);
    assert_eq!(executor.statistics().fallback_failed, 1);
}

#[tokio::test]
async fn test_direct_sql_probe_is_last_resort_for_reads() {
    init_logging();
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    tiers.primary.fail_next(SCHEMA_ERROR);
    tiers.bypass.fail_next(SCHEMA_ERROR);

    let result = executor
        .execute_with_fallback(
            |store: StoreHandle| async move {
                store
                    .select(
                        "trades",
                        &SelectQuery::all().filter(tiered_fallback::Filter::eq("symbol", "MSFT")),
                    )
                    .await
            },
            &ResourceDescriptor::read("trades"),
        )
        .await;

    assert!(result.probe_only);
    assert_eq!(result.tier, Some(ExecutionTier::DirectSql));
    // Probe ignores the caller's filter.
    assert_eq!(result.data.as_ref().and_then(Value::as_array).map(Vec::len), Some(2));
    assert!(result.fallback_reason.unwrap().ends_with("(direct SQL)"));
    assert_eq!(executor.statistics().fallback_success, 1);
}

#[tokio::test]
async fn test_fresh_statistics_rates_are_zero() {
    let tiers = tiers();
    let executor = executor(&tiers, fast_config());
    tiers.primary.fail_next(SCHEMA_ERROR);
    let _ = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    executor.reset_statistics();
    let stats = executor.statistics();

    assert_eq!(stats.total_queries, 0);
    assert_eq!(stats.fallback_usage_rate, "0%");
    assert_eq!(stats.fallback_success_rate, "0%");
}

#[tokio::test]
async fn test_hanging_tiers_are_bounded_by_timeout() {
    init_logging();
    let tiers = tiers();
    let executor = executor(
        &tiers,
        FallbackConfig {
            retry_delay: Duration::ZERO,
            fallback_timeout: Duration::from_millis(100),
            ..FallbackConfig::default()
        },
    );
    tiers.primary.fail_next(SCHEMA_ERROR);
    tiers.bypass.hang_next();
    tiers.direct.hang_next();

    let started = Instant::now();
    let result = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;
    let elapsed = started.elapsed();

    let error = result.error.unwrap();
    assert!(error.is_timeout());
    assert!(error.to_string().contains("fallback query timeout"));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    assert_eq!(executor.statistics().fallback_failed, 1);
}

#[tokio::test]
async fn test_hanging_cache_bypass_on_write_is_bounded() {
    let tiers = tiers();
    let executor = executor(
        &tiers,
        FallbackConfig {
            retry_delay: Duration::ZERO,
            fallback_timeout: Duration::from_millis(100),
            ..FallbackConfig::default()
        },
    );
    tiers.primary.fail_next(SCHEMA_ERROR);
    tiers.bypass.hang_next();

    let started = Instant::now();
    let result = executor
        .execute_with_fallback(
            |store: StoreHandle| async move {
                store.delete("trades", &[tiered_fallback::Filter::eq("id", 1)]).await
            },
            &ResourceDescriptor::new("trades", OperationKind::Delete),
        )
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(250));
    assert!(result.error.is_some());
    assert_eq!(result.tier, Some(ExecutionTier::CacheBypass));
    assert_eq!(tiers.direct.calls(), 0);
}

#[tokio::test]
async fn test_schema_cache_scenario() {
    init_logging();
    let tiers = tiers();
    let executor = executor(
        &tiers,
        FallbackConfig {
            retry_delay: Duration::from_millis(10),
            ..FallbackConfig::default()
        },
    );
    tiers.primary.fail_next(SCHEMA_ERROR);

    let result = executor
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    assert!(result.used_fallback);
    assert!(result.fallback_reason.as_deref().unwrap().contains("schema cache"));
    let rows = assert_ok!(result.into_result());
    assert_eq!(rows, json!([{"id": 1, "symbol": "AAPL"}, {"id": 2, "symbol": "MSFT"}]));

    let stats = executor.statistics();
    assert_eq!(stats.fallback_used, 1);
    assert_eq!(stats.fallback_success, 1);
    assert_eq!(stats.fallback_usage_rate, "100.00%");
}

#[tokio::test]
async fn test_shared_statistics_aggregate_across_executors() {
    let stats = Arc::new(FallbackStatistics::new());
    let first = tiers();
    let second = tiers();
    let build = |t: &Tiers| {
        FallbackExecutor::builder()
            .primary(t.primary.clone())
            .cache_bypass(t.bypass.clone())
            .direct_sql(t.direct.clone())
            .statistics(stats.clone())
            .config(fast_config())
            .build()
            .unwrap()
    };
    let (a, b) = (build(&first), build(&second));

    let _ = a
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;
    let _ = b
        .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
        .await;

    assert_eq!(stats.snapshot().total_queries, 2);
    assert!(Arc::ptr_eq(&a.stats_handle(), &b.stats_handle()));
}

#[tokio::test]
async fn test_concurrent_executions_count_exactly() {
    let tiers = tiers();
    let executor = Arc::new(executor(&tiers, fast_config()));
    for _ in 0..5 {
        tiers.primary.fail_next(SCHEMA_ERROR);
    }

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let stats = executor.statistics();
    assert_eq!(stats.total_queries, 20);
    assert_eq!(stats.fallback_used, 5);
    assert_eq!(stats.fallback_success, 5);
}

#[tokio::test]
async fn test_probabilistic_faults_always_resolve() {
    let primary = Arc::new(
        SimStore::new("primary")
            .with_table("trades", vec![json!({"id": 1})])
            .with_injector(tiered_fallback::FaultInjector::new(
                7,
                0.5,
                StoreError::query(SCHEMA_ERROR),
            )),
    );
    let tiers = Tiers {
        bypass: Arc::new(primary.sharing("cache_bypass")),
        direct: Arc::new(primary.sharing("direct_sql")),
        primary,
    };
    let executor = executor(&tiers, fast_config());

    for _ in 0..50 {
        let result = executor
            .execute_with_fallback(select_trades, &ResourceDescriptor::read("trades"))
            .await;
        assert_eq!(result.data, Some(json!([{"id": 1}])));
    }

    let stats = executor.statistics();
    assert_eq!(stats.total_queries, 50);
    assert_eq!(stats.fallback_used, stats.fallback_success);
    assert_eq!(stats.fallback_failed, 0);
    assert!(stats.fallback_used > 0);
}
