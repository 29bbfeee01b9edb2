//! SimStore - In-memory store with fault injection
//!
//! TigerStyle: Simulation-first. Every tier can be replaced by a SimStore so
//! escalation paths are testable without a network.
//!
//! Several SimStores can share one set of tables (`sharing`) while keeping
//! their own fault queue and call counter, which is how tests model the
//! primary, cache-bypass and direct SQL tiers of a single database.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use super::client::{Filter, FilterOp, SelectQuery, StoreClient};
use super::sql::SqlExecutor;
use crate::constants::ENV_SIM_SEED;
use crate::error::{StoreError, StoreResult};

type Tables = Arc<RwLock<HashMap<String, Vec<Value>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Faults
// =============================================================================

/// A scripted misbehaviour consumed by the next call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail with this error
    Error(StoreError),
    /// Never complete
    Hang,
    /// Complete normally after a delay
    Delay(Duration),
}

/// Seeded probabilistic fault source.
///
/// TigerStyle: Same seed, same fault sequence. The seed is logged on creation.
#[derive(Debug)]
pub struct FaultInjector {
    seed: u64,
    rng: ChaCha8Rng,
    probability: f64,
    error: StoreError,
}

impl FaultInjector {
    /// Create an injector that fails each call with `probability`.
    ///
    /// # Panics
    /// Panics if `probability` is outside `0.0..=1.0`.
    #[must_use]
    pub fn new(seed: u64, probability: f64, error: StoreError) -> Self {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        tracing::info!(seed, probability, "fault injector seeded");
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            probability,
            error,
        }
    }

    /// Seed from `SIM_SEED` if set, otherwise from entropy.
    #[must_use]
    pub fn from_env(probability: f64, error: StoreError) -> Self {
        let seed = std::env::var(ENV_SIM_SEED)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(rand::random);
        Self::new(seed, probability, error)
    }

    /// Seed in use, for reproduction.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn roll(&mut self) -> Option<StoreError> {
        self.rng
            .gen_bool(self.probability)
            .then(|| self.error.clone())
    }
}

// =============================================================================
// SimStore
// =============================================================================

/// In-memory [`StoreClient`] and [`SqlExecutor`] for tests and demos.
pub struct SimStore {
    label: String,
    tables: Tables,
    faults: Mutex<VecDeque<Fault>>,
    injector: Option<Mutex<FaultInjector>>,
    calls: AtomicU64,
    schema_reloads: AtomicU64,
}

impl SimStore {
    /// Empty store.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self::with_tables(label, Arc::new(RwLock::new(HashMap::new())))
    }

    fn with_tables(label: &str, tables: Tables) -> Self {
        Self {
            label: label.to_string(),
            tables,
            faults: Mutex::new(VecDeque::new()),
            injector: None,
            calls: AtomicU64::new(0),
            schema_reloads: AtomicU64::new(0),
        }
    }

    /// A second view of the same tables with its own faults and counters.
    #[must_use]
    pub fn sharing(&self, label: &str) -> Self {
        Self::with_tables(label, Arc::clone(&self.tables))
    }

    /// Builder-style table creation.
    #[must_use]
    pub fn with_table(self, name: &str, rows: Vec<Value>) -> Self {
        self.create_table(name, rows);
        self
    }

    /// Attach a probabilistic fault source.
    #[must_use]
    pub fn with_injector(mut self, injector: FaultInjector) -> Self {
        self.injector = Some(Mutex::new(injector));
        self
    }

    /// Create or replace a table.
    pub fn create_table(&self, name: &str, rows: Vec<Value>) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), rows);
    }

    /// Remove a table.
    pub fn drop_table(&self, name: &str) {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Current rows of a table.
    #[must_use]
    pub fn rows(&self, name: &str) -> Option<Vec<Value>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Queue a fault for a future call.
    pub fn push_fault(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    /// Fail the next call with a query error carrying `message`.
    pub fn fail_next(&self, message: &str) {
        self.push_fault(Fault::Error(StoreError::query(message)));
    }

    /// Make the next call never complete.
    pub fn hang_next(&self) {
        self.push_fault(Fault::Hang);
    }

    /// Calls made against this store.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Successful schema reloads.
    #[must_use]
    pub fn schema_reloads(&self) -> u64 {
        self.schema_reloads.load(AtomicOrdering::SeqCst)
    }

    /// Count the call and apply any pending fault.
    async fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);

        let fault = lock(&self.faults).pop_front();
        match fault {
            Some(Fault::Error(err)) => return Err(err),
            Some(Fault::Hang) => std::future::pending::<()>().await,
            Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        if let Some(injector) = &self.injector {
            if let Some(err) = lock(injector).roll() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> StoreResult<R> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let rows = tables
            .get_mut(table_key(table))
            .ok_or_else(|| missing_relation(table))?;
        Ok(f(rows))
    }
}

impl std::fmt::Debug for SimStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimStore")
            .field("label", &self.label)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

fn table_key(table: &str) -> &str {
    table.strip_prefix("public.").unwrap_or(table)
}

fn missing_relation(table: &str) -> StoreError {
    StoreError::query_with_code(
        format!("relation \"public.{}\" does not exist", table_key(table)),
        "42P01",
    )
}

// =============================================================================
// Row Matching
// =============================================================================

fn compare_text(field: &Value, value: &str) -> Option<Ordering> {
    match field {
        Value::Number(n) => n.as_f64()?.partial_cmp(&value.parse::<f64>().ok()?),
        Value::String(s) => Some(s.as_str().cmp(value)),
        Value::Bool(b) => Some(b.to_string().as_str().cmp(value)),
        Value::Null => (value == "null").then_some(Ordering::Equal),
        _ => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let ordering = row
            .get(&filter.column)
            .and_then(|field| compare_text(field, &filter.value));
        match filter.op {
            FilterOp::Eq => ordering == Some(Ordering::Equal),
            FilterOp::Neq => ordering != Some(Ordering::Equal),
            FilterOp::Gt => ordering == Some(Ordering::Greater),
            FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => ordering == Some(Ordering::Less),
            FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    })
}

fn project(row: &Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row.clone();
    }
    let Some(object) = row.as_object() else {
        return row.clone();
    };
    let projected: Map<String, Value> = columns
        .split(',')
        .map(str::trim)
        .filter_map(|c| object.get(c).map(|v| (c.to_string(), v.clone())))
        .collect();
    Value::Object(projected)
}

/// Parse `SELECT * FROM <table> LIMIT <n>`.
fn parse_probe(sql: &str) -> Option<(&str, usize)> {
    let tokens: Vec<&str> = sql.trim().trim_end_matches(';').split_whitespace().collect();
    match tokens.as_slice() {
        [select, "*", from, table, limit, n]
            if select.eq_ignore_ascii_case("select")
                && from.eq_ignore_ascii_case("from")
                && limit.eq_ignore_ascii_case("limit") =>
        {
            Some((table, n.parse().ok()?))
        }
        _ => None,
    }
}

// =============================================================================
// StoreClient Implementation
// =============================================================================

#[async_trait]
impl StoreClient for SimStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> StoreResult<Value> {
        self.enter().await?;

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let rows = tables
            .get(table_key(table))
            .ok_or_else(|| missing_relation(table))?;

        let mut selected: Vec<&Value> = rows
            .iter()
            .filter(|row| row_matches(row, &query.filters))
            .collect();
        if let Some((column, descending)) = &query.order {
            selected.sort_by(|a, b| compare_values(a.get(column), b.get(column)));
            if *descending {
                selected.reverse();
            }
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(Value::Array(
            selected
                .into_iter()
                .take(limit)
                .map(|row| project(row, &query.columns))
                .collect(),
        ))
    }

    async fn insert(&self, table: &str, rows: Value) -> StoreResult<Value> {
        self.enter().await?;

        let new_rows = match rows {
            Value::Array(rows) => rows,
            row @ Value::Object(_) => vec![row],
            other => {
                return Err(StoreError::invalid_request(format!(
                    "insert expects an object or array, got {other}"
                )))
            }
        };
        self.with_table_mut(table, |existing| {
            existing.extend(new_rows.iter().cloned());
            Value::Array(new_rows)
        })
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> StoreResult<Value> {
        self.enter().await?;

        let Value::Object(patch) = patch else {
            return Err(StoreError::invalid_request("update expects an object"));
        };
        self.with_table_mut(table, |rows| {
            let mut updated = Vec::new();
            for row in rows.iter_mut().filter(|row| row_matches(row, filters)) {
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
            Value::Array(updated)
        })
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Value> {
        self.enter().await?;

        self.with_table_mut(table, |rows| {
            let (deleted, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| row_matches(row, filters));
            *rows = kept;
            Value::Array(deleted)
        })
    }

    async fn rpc(&self, function: &str, _params: Value) -> StoreResult<Value> {
        self.enter().await?;
        Err(StoreError::query_with_code(
            format!("Could not find the function public.{function} in the schema cache"),
            "PGRST202",
        ))
    }

    async fn reload_schema(&self) -> StoreResult<()> {
        self.enter().await?;
        self.schema_reloads.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// SqlExecutor Implementation
// =============================================================================

#[async_trait]
impl SqlExecutor for SimStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn query(&self, sql: &str) -> StoreResult<Value> {
        self.enter().await?;

        let (table, limit) = parse_probe(sql).ok_or_else(|| {
            StoreError::invalid_request(format!("unsupported statement: {sql}"))
        })?;

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let rows = tables
            .get(table_key(table))
            .ok_or_else(|| missing_relation(table))?;
        Ok(Value::Array(rows.iter().take(limit).cloned().collect()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trades() -> Vec<Value> {
        vec![
            json!({"id": 1, "symbol": "AAPL", "pnl": 120.5}),
            json!({"id": 2, "symbol": "MSFT", "pnl": -40.0}),
            json!({"id": 3, "symbol": "AAPL", "pnl": 15.0}),
        ]
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let store = SimStore::new("primary").with_table("trades", trades());
        let query = SelectQuery::all()
            .columns("id, pnl")
            .filter(Filter::eq("symbol", "AAPL"))
            .order_by("pnl", true)
            .limit(1);

        let rows = store.select("trades", &query).await.unwrap();

        assert_eq!(rows, json!([{"id": 1, "pnl": 120.5}]));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_numeric_filters() {
        let store = SimStore::new("primary").with_table("trades", trades());
        let query = SelectQuery::all().filter(Filter::new("pnl", FilterOp::Lt, 0));

        let rows = store.select("trades", &query).await.unwrap();

        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["symbol"], "MSFT");
    }

    #[tokio::test]
    async fn test_missing_table_reports_relation_error() {
        let store = SimStore::new("primary");
        let err = store.select("public.trades", &SelectQuery::all()).await.unwrap_err();

        assert_eq!(err.to_string(), "relation \"public.trades\" does not exist");
        assert_eq!(err.code(), Some("42P01"));
    }

    #[tokio::test]
    async fn test_write_operations() {
        let store = SimStore::new("primary").with_table("trades", trades());

        let inserted = store
            .insert("trades", json!({"id": 4, "symbol": "TSLA", "pnl": 0}))
            .await
            .unwrap();
        assert_eq!(inserted.as_array().unwrap().len(), 1);

        let updated = store
            .update("trades", &[Filter::eq("symbol", "AAPL")], json!({"closed": true}))
            .await
            .unwrap();
        assert_eq!(updated.as_array().unwrap().len(), 2);

        let deleted = store
            .delete("trades", &[Filter::eq("id", 2)])
            .await
            .unwrap();
        assert_eq!(deleted, json!([{"id": 2, "symbol": "MSFT", "pnl": -40.0}]));
        assert_eq!(store.rows("trades").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_fault_is_consumed_once() {
        let store = SimStore::new("primary").with_table("trades", trades());
        store.fail_next("Could not find the table 'public.trades' in the schema cache");

        assert!(store.select("trades", &SelectQuery::all()).await.is_err());
        assert!(store.select("trades", &SelectQuery::all()).await.is_ok());
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_hang_fault_never_resolves() {
        let store = SimStore::new("primary").with_table("trades", trades());
        store.hang_next();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            store.select("trades", &SelectQuery::all()),
        )
        .await;

        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_sharing_views_share_rows_not_faults() {
        let primary = SimStore::new("primary").with_table("trades", trades());
        let bypass = primary.sharing("cache_bypass");
        primary.fail_next("schema cache");

        assert!(bypass.select("trades", &SelectQuery::all()).await.is_ok());
        assert_eq!(primary.calls(), 0);
        assert_eq!(bypass.calls(), 1);

        bypass.drop_table("trades");
        assert!(primary.rows("trades").is_none());
    }

    #[tokio::test]
    async fn test_sql_probe() {
        let store = SimStore::new("direct_sql").with_table("trades", trades());

        let rows = SqlExecutor::query(&store, "SELECT * FROM public.trades LIMIT 2")
            .await
            .unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);

        let err = SqlExecutor::query(&store, "DELETE FROM trades")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_injector_is_deterministic() {
        let run = |seed| async move {
            let store = SimStore::new("primary")
                .with_table("trades", trades())
                .with_injector(FaultInjector::new(seed, 0.5, StoreError::query("schema cache")));
            let mut outcomes = Vec::new();
            for _ in 0..32 {
                outcomes.push(store.select("trades", &SelectQuery::all()).await.is_ok());
            }
            outcomes
        };

        let first = run(42).await;
        let second = run(42).await;

        assert_eq!(first, second);
        assert!(first.iter().any(|ok| *ok));
        assert!(first.iter().any(|ok| !*ok));
    }

    #[test]
    #[should_panic(expected = "probability")]
    fn test_injector_rejects_bad_probability() {
        let _ = FaultInjector::new(1, 1.5, StoreError::query("x"));
    }
}
