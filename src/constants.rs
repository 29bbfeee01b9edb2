//! Constants
//!
//! TigerStyle: Every limit and default has a name, a unit suffix, and lives here.

// =============================================================================
// Fallback Defaults
// =============================================================================

/// Fallback escalation is enabled unless configured otherwise
pub const FALLBACK_ENABLED_DEFAULT: bool = true;

/// Default retry budget carried in the configuration
pub const FALLBACK_RETRIES_COUNT_DEFAULT: u32 = 3;

/// Upper bound accepted for the retry budget
pub const FALLBACK_RETRIES_COUNT_MAX: u32 = 10;

/// Settle delay before escalating to the cache-bypass tier
pub const FALLBACK_RETRY_DELAY_MS_DEFAULT: u64 = 1_000;

/// Upper bound accepted for the settle delay
pub const FALLBACK_RETRY_DELAY_MS_MAX: u64 = 60_000;

/// Timeout applied to each escalated attempt
pub const FALLBACK_TIMEOUT_MS_DEFAULT: u64 = 10_000;

/// Upper bound accepted for the escalation timeout
pub const FALLBACK_TIMEOUT_MS_MAX: u64 = 300_000;

// =============================================================================
// Direct SQL Probe
// =============================================================================

/// Rows returned by the direct SQL probe
pub const PROBE_ROWS_COUNT_MAX: usize = 5;

/// Maximum length of a resource name accepted by the direct SQL tier
pub const RESOURCE_NAME_BYTES_MAX: usize = 128;

// =============================================================================
// Data Store
// =============================================================================

/// REST path prefix for table access
pub const REST_PATH_PREFIX: &str = "rest/v1/";

/// RPC invoked to discard the server-side schema cache
pub const SCHEMA_RELOAD_RPC: &str = "reload_schema";

/// RPC invoked by the direct SQL tier to run a literal statement
pub const EXEC_SQL_RPC: &str = "exec_sql";

/// Per-request HTTP timeout for tier clients
pub const HTTP_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 30_000;

/// Client tag sent by the primary tier
pub const CLIENT_INFO_PRIMARY: &str = "tiered-fallback/primary";

/// Client tag sent by the cache-bypass tier
pub const CLIENT_INFO_CACHE_BYPASS: &str = "tiered-fallback/cache-bypass";

/// Client tag sent by the service (direct SQL) tier
pub const CLIENT_INFO_SERVICE: &str = "tiered-fallback/direct-sql";

/// Connections kept by the optional Postgres direct SQL pool
pub const POSTGRES_CONNECTIONS_COUNT_MAX: u32 = 4;

// =============================================================================
// Health Checks
// =============================================================================

/// Resources probed by the core health check
pub const CORE_RESOURCES: &[&str] = &["trades", "strategies", "strategy_rules", "profiles"];

// =============================================================================
// Environment
// =============================================================================

/// Data store endpoint URL
pub const ENV_STORE_URL: &str = "DATA_STORE_URL";

/// Public (anonymous) API key
pub const ENV_STORE_ANON_KEY: &str = "DATA_STORE_ANON_KEY";

/// Elevated (service) API key
pub const ENV_STORE_SERVICE_KEY: &str = "DATA_STORE_SERVICE_KEY";

/// Optional direct Postgres connection URL
pub const ENV_STORE_DATABASE_URL: &str = "DATA_STORE_DATABASE_URL";

/// Fallback enable flag
pub const ENV_FALLBACK_ENABLED: &str = "FALLBACK_ENABLED";

/// Fallback retry budget
pub const ENV_FALLBACK_MAX_RETRIES: &str = "FALLBACK_MAX_RETRIES";

/// Fallback settle delay in milliseconds
pub const ENV_FALLBACK_RETRY_DELAY_MS: &str = "FALLBACK_RETRY_DELAY_MS";

/// Fallback timeout in milliseconds
pub const ENV_FALLBACK_TIMEOUT_MS: &str = "FALLBACK_TIMEOUT_MS";

/// Seed for simulated fault injection
pub const ENV_SIM_SEED: &str = "SIM_SEED";
