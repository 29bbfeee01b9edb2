//! Configuration
//!
//! TigerStyle: Defaults from constants, explicit validation, environment read
//! only by the surrounding application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ENV_FALLBACK_ENABLED, ENV_FALLBACK_MAX_RETRIES, ENV_FALLBACK_RETRY_DELAY_MS,
    ENV_FALLBACK_TIMEOUT_MS, ENV_STORE_ANON_KEY, ENV_STORE_DATABASE_URL, ENV_STORE_SERVICE_KEY,
    ENV_STORE_URL, FALLBACK_ENABLED_DEFAULT, FALLBACK_RETRIES_COUNT_DEFAULT,
    FALLBACK_RETRIES_COUNT_MAX, FALLBACK_RETRY_DELAY_MS_DEFAULT, FALLBACK_RETRY_DELAY_MS_MAX,
    FALLBACK_TIMEOUT_MS_DEFAULT, FALLBACK_TIMEOUT_MS_MAX,
};

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors. Fatal to executor construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting is present but unusable.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// FallbackConfig
// =============================================================================

/// Runtime knobs for escalation. Read fresh on every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Escalate classified failures past the primary tier
    pub enable_fallback: bool,
    /// Retry budget. The escalation chain itself is fixed.
    pub max_retries: u32,
    /// Settle delay before the cache-bypass attempt
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Bound on each escalated attempt
    #[serde(with = "duration_ms")]
    pub fallback_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enable_fallback: FALLBACK_ENABLED_DEFAULT,
            max_retries: FALLBACK_RETRIES_COUNT_DEFAULT,
            retry_delay: Duration::from_millis(FALLBACK_RETRY_DELAY_MS_DEFAULT),
            fallback_timeout: Duration::from_millis(FALLBACK_TIMEOUT_MS_DEFAULT),
        }
    }
}

impl FallbackConfig {
    /// Check every field against its limit.
    ///
    /// # Errors
    /// Returns the first field that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 || self.max_retries > FALLBACK_RETRIES_COUNT_MAX {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("must be 1..={FALLBACK_RETRIES_COUNT_MAX}, got {}", self.max_retries),
            ));
        }
        if self.retry_delay > Duration::from_millis(FALLBACK_RETRY_DELAY_MS_MAX) {
            return Err(ConfigError::invalid(
                "retry_delay",
                format!("must be at most {FALLBACK_RETRY_DELAY_MS_MAX}ms"),
            ));
        }
        if self.fallback_timeout.is_zero()
            || self.fallback_timeout > Duration::from_millis(FALLBACK_TIMEOUT_MS_MAX)
        {
            return Err(ConfigError::invalid(
                "fallback_timeout",
                format!("must be 1..={FALLBACK_TIMEOUT_MS_MAX}ms"),
            ));
        }
        Ok(())
    }

    /// Apply a partial update, returning the merged configuration.
    #[must_use]
    pub fn merged(&self, update: &FallbackConfigUpdate) -> Self {
        Self {
            enable_fallback: update.enable_fallback.unwrap_or(self.enable_fallback),
            max_retries: update.max_retries.unwrap_or(self.max_retries),
            retry_delay: update
                .retry_delay_ms
                .map_or(self.retry_delay, Duration::from_millis),
            fallback_timeout: update
                .fallback_timeout_ms
                .map_or(self.fallback_timeout, Duration::from_millis),
        }
    }

    /// Defaults overridden by `FALLBACK_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable is set but unparsable, or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let update = FallbackConfigUpdate {
            enable_fallback: env_parse(ENV_FALLBACK_ENABLED, parse_bool)?,
            max_retries: env_parse(ENV_FALLBACK_MAX_RETRIES, |s| s.parse().ok())?,
            retry_delay_ms: env_parse(ENV_FALLBACK_RETRY_DELAY_MS, |s| s.parse().ok())?,
            fallback_timeout_ms: env_parse(ENV_FALLBACK_TIMEOUT_MS, |s| s.parse().ok())?,
        };
        let config = Self::default().merged(&update);
        config.validate()?;
        Ok(config)
    }
}

/// A partial [`FallbackConfig`]; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfigUpdate {
    /// New enable flag
    #[serde(default)]
    pub enable_fallback: Option<bool>,
    /// New retry budget
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// New settle delay in milliseconds
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    /// New escalation timeout in milliseconds
    #[serde(default)]
    pub fallback_timeout_ms: Option<u64>,
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse<T>(
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse(raw.trim())
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(name, format!("cannot parse {raw:?}"))),
        _ => Ok(None),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// =============================================================================
// ConnectionConfig
// =============================================================================

/// Where and how the tiers reach the data store.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Store endpoint, e.g. `https://project.example.co`
    pub url: String,
    /// Public key used by the primary and cache-bypass tiers
    pub anon_key: String,
    /// Elevated key used only by the direct SQL tier
    pub service_key: String,
    /// Optional Postgres URL for a native direct SQL tier
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("service_key", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionConfig {
    /// Create and validate a connection config.
    ///
    /// # Errors
    /// Returns an error if a required value is empty or the URL is not http(s).
    pub fn new(
        url: impl Into<String>,
        anon_key: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            url: url.into(),
            anon_key: anon_key.into(),
            service_key: service_key.into(),
            database_url: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach a Postgres URL for the native direct SQL tier.
    #[must_use]
    pub fn with_database_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = Some(database_url.into());
        self
    }

    /// Read from `DATA_STORE_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let mut config = Self::new(
            required(ENV_STORE_URL)?,
            required(ENV_STORE_ANON_KEY)?,
            required(ENV_STORE_SERVICE_KEY)?,
        )?;
        config.database_url = std::env::var(ENV_STORE_DATABASE_URL)
            .ok()
            .filter(|v| !v.trim().is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Check that required values are present and the URL is usable.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_STORE_URL));
        }
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_STORE_ANON_KEY));
        }
        if self.service_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_STORE_SERVICE_KEY));
        }

        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|e| ConfigError::invalid(ENV_STORE_URL, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                ENV_STORE_URL,
                format!("unsupported scheme {}", parsed.scheme()),
            ));
        }

        if let Some(db) = &self.database_url {
            if !(db.starts_with("postgres://") || db.starts_with("postgresql://")) {
                return Err(ConfigError::invalid(
                    ENV_STORE_DATABASE_URL,
                    "must be a postgres URL",
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FallbackConfig::default();
        assert!(config.enable_fallback);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.fallback_timeout, Duration::from_millis(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_only_touches_set_fields() {
        let base = FallbackConfig::default();
        let update = FallbackConfigUpdate {
            enable_fallback: Some(false),
            fallback_timeout_ms: Some(250),
            ..Default::default()
        };

        let merged = base.merged(&update);

        assert!(!merged.enable_fallback);
        assert_eq!(merged.fallback_timeout, Duration::from_millis(250));
        assert_eq!(merged.max_retries, base.max_retries);
        assert_eq!(merged.retry_delay, base.retry_delay);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let zero_timeout = FallbackConfig {
            fallback_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::Invalid { field: "fallback_timeout", .. })
        ));

        let too_many = FallbackConfig {
            max_retries: FALLBACK_RETRIES_COUNT_MAX + 1,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());

        let slow = FallbackConfig {
            retry_delay: Duration::from_millis(FALLBACK_RETRY_DELAY_MS_MAX + 1),
            ..Default::default()
        };
        assert!(slow.validate().is_err());
    }

    #[test]
    fn test_update_deserializes_partially() {
        let update: FallbackConfigUpdate =
            serde_json::from_str(r#"{"retry_delay_ms": 0}"#).unwrap();
        assert_eq!(update.retry_delay_ms, Some(0));
        assert_eq!(update.enable_fallback, None);
    }

    #[test]
    fn test_config_serializes_durations_as_ms() {
        let json = serde_json::to_value(FallbackConfig::default()).unwrap();
        assert_eq!(json["retry_delay"], 1000);
        assert_eq!(json["fallback_timeout"], 10_000);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_connection_config_validation() {
        assert!(ConnectionConfig::new("https://db.example.co", "anon", "service").is_ok());

        assert_eq!(
            ConnectionConfig::new("https://db.example.co", "", "service").unwrap_err(),
            ConfigError::Missing(ENV_STORE_ANON_KEY)
        );
        assert_eq!(
            ConnectionConfig::new("https://db.example.co", "anon", " ").unwrap_err(),
            ConfigError::Missing(ENV_STORE_SERVICE_KEY)
        );
        assert!(ConnectionConfig::new("not a url", "anon", "service").is_err());
        assert!(ConnectionConfig::new("ftp://db.example.co", "anon", "service").is_err());

        let with_db = ConnectionConfig::new("https://db.example.co", "anon", "service")
            .unwrap()
            .with_database_url("mysql://nope");
        assert!(with_db.validate().is_err());
    }

    #[test]
    fn test_connection_config_debug_redacts_keys() {
        let config = ConnectionConfig::new("https://db.example.co", "anon-secret", "svc-secret")
            .unwrap();
        let text = format!("{config:?}");
        assert!(!text.contains("anon-secret"));
        assert!(!text.contains("svc-secret"));
    }
}
