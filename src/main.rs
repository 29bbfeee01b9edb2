//! Tiered Fallback CLI - Operational checks for the fallback executor
//!
//! Commands:
//! - `health`: probe core resources and print a report with statistics
//! - `probe`: run one read through the executor
//! - `clear-cache`: ask the store to reload its schema cache
//!
//! Connection settings come from `DATA_STORE_*` variables (a `.env` file is
//! loaded first). With `--simulate`, every command runs against in-memory
//! tiers with seeded schema cache faults instead.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tiered_fallback::{
    ConnectionConfig, FallbackConfig, FallbackExecutor, FaultInjector, ResourceDescriptor,
    SelectQuery, SimStore, StoreClient, StoreError, StoreHandle,
};
use tiered_fallback::constants::CORE_RESOURCES;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "tiered-fallback";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default rows shown by `probe`
pub const PROBE_ROWS_COUNT_DEFAULT: usize = 10;

/// Default primary-tier fault probability under `--simulate`
pub const SIM_FAULT_PROBABILITY_DEFAULT: f64 = 0.3;

/// Rows seeded into each simulated core table
pub const SIM_SAMPLE_ROWS_COUNT: usize = 3;

// =============================================================================
// CLI
// =============================================================================

/// Tiered Fallback - Operational checks for schema cache recovery
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Operational checks for the tiered query fallback executor")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Run against in-memory tiers with injected schema cache faults
    #[arg(long, global = true)]
    simulate: bool,

    /// Primary-tier fault probability under --simulate (seed from SIM_SEED)
    #[arg(long, default_value_t = SIM_FAULT_PROBABILITY_DEFAULT, global = true)]
    fault_rate: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe core resources and report their health
    Health {
        /// Resource to check instead of the core set (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read rows from one resource through the executor
    Probe {
        /// Resource (table) name
        table: String,

        /// Maximum rows to read
        #[arg(long, default_value_t = PROBE_ROWS_COUNT_DEFAULT)]
        limit: usize,
    },

    /// Ask primary and cache-bypass tiers to reload their schema cache
    ClearCache,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn,tiered_fallback=info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::debug!("{} v{}", APP_NAME, APP_VERSION);

    let config = FallbackConfig::from_env().context("invalid fallback configuration")?;
    let executor = if cli.simulate {
        simulated_executor(config, cli.fault_rate)?
    } else {
        let conn = ConnectionConfig::from_env().context("invalid data store configuration")?;
        FallbackExecutor::connect_with_config(&conn, config)
            .context("failed to build fallback executor")?
    };

    match cli.command {
        Command::Health { tables, json } => health(&executor, &tables, json).await,
        Command::Probe { table, limit } => probe(&executor, &table, limit).await,
        Command::ClearCache => {
            executor.clear_all_caches().await?;
            println!("schema cache cleared on primary and cache_bypass tiers");
            Ok(())
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn health(executor: &FallbackExecutor, tables: &[String], as_json: bool) -> anyhow::Result<()> {
    let report = if tables.is_empty() {
        executor.test_core_resources().await
    } else {
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        executor.test_resources(&names).await
    };
    let statistics = executor.statistics();

    if as_json {
        let output = json!({ "report": report, "statistics": statistics });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("checked at {}", report.checked_at.to_rfc3339());
        for resource in &report.resources {
            let tier = resource.tier.map_or("-", |t| t.as_str());
            match &resource.error {
                None => println!(
                    "  ok    {:<20} tier={:<12} rows={}{}",
                    resource.resource,
                    tier,
                    resource.row_count.unwrap_or(0),
                    if resource.probe_only { " (probe)" } else { "" },
                ),
                Some(error) => println!("  FAIL  {:<20} tier={:<12} {}", resource.resource, tier, error),
            }
        }
        println!(
            "total={} success={} fallback_used={} failed={}",
            report.summary.total,
            report.summary.success,
            report.summary.fallback_used,
            report.summary.failed
        );
        println!(
            "fallback usage {} / success {}",
            statistics.fallback_usage_rate, statistics.fallback_success_rate
        );
    }

    if !report.is_healthy() {
        anyhow::bail!(
            "{} of {} resources failed",
            report.summary.failed,
            report.summary.total
        );
    }
    Ok(())
}

async fn probe(executor: &FallbackExecutor, table: &str, limit: usize) -> anyhow::Result<()> {
    let name = table.to_string();
    let result = executor
        .execute_with_fallback(
            move |store: StoreHandle| {
                let name = name.clone();
                async move { store.select(&name, &SelectQuery::all().limit(limit)).await }
            },
            &ResourceDescriptor::read(table),
        )
        .await;

    if let Some(reason) = &result.fallback_reason {
        eprintln!("fallback: {reason}");
    }
    if result.probe_only {
        eprintln!("note: rows come from the direct SQL probe, not the original query");
    }

    let rows: Value = result.into_result()?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

// =============================================================================
// Simulation
// =============================================================================

fn simulated_executor(config: FallbackConfig, fault_rate: f64) -> anyhow::Result<FallbackExecutor> {
    if !(0.0..=1.0).contains(&fault_rate) {
        anyhow::bail!("--fault-rate must be between 0 and 1, got {fault_rate}");
    }

    let injector = FaultInjector::from_env(
        fault_rate,
        StoreError::query_with_code(
            "Could not find the table in the schema cache",
            "PGRST205",
        ),
    );
    let primary = SimStore::new("primary").with_injector(injector);
    for (index, name) in CORE_RESOURCES.iter().enumerate() {
        let rows = (0..SIM_SAMPLE_ROWS_COUNT)
            .map(|n| json!({ "id": index * SIM_SAMPLE_ROWS_COUNT + n + 1 }))
            .collect();
        primary.create_table(name, rows);
    }

    let cache_bypass = Arc::new(primary.sharing("cache_bypass"));
    let direct_sql = Arc::new(primary.sharing("direct_sql"));

    FallbackExecutor::builder()
        .primary(Arc::new(primary))
        .cache_bypass(cache_bypass)
        .direct_sql(direct_sql)
        .config(config)
        .build()
        .context("failed to build simulated executor")
}
