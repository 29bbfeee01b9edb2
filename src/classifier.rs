//! Classifier - Is this failure a stale schema cache?
//!
//! TigerStyle: Pure, total, no I/O.
//!
//! The store surfaces metadata staleness as an ordinary query error with no
//! dedicated code, so the only discriminator is the message text. Matching is
//! heuristic: a false positive costs one escalation, a false negative costs one
//! caller-visible failure. Neither corrupts data.

use once_cell::sync::Lazy;

use crate::error::StoreError;

/// Message fragments that mark a stale schema cache failure.
pub const DEFAULT_SCHEMA_ERROR_INDICATORS: &[&str] = &[
    "schema cache",
    "information_schema.columns",
    "relation does not exist",
    "does not exist",
    "cached",
    "cache",
];

static DEFAULT_CLASSIFIER: Lazy<SchemaCacheClassifier> = Lazy::new(SchemaCacheClassifier::new);

// =============================================================================
// ErrorClassifier
// =============================================================================

/// Decides whether a primary-tier failure is worth escalating.
pub trait ErrorClassifier: Send + Sync {
    /// True if the error is a recoverable schema cache failure.
    fn is_recoverable(&self, error: &StoreError) -> bool;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&StoreError) -> bool + Send + Sync,
{
    fn is_recoverable(&self, error: &StoreError) -> bool {
        self(error)
    }
}

// =============================================================================
// SchemaCacheClassifier
// =============================================================================

/// Case-insensitive substring classifier over a configurable indicator list.
#[derive(Debug, Clone)]
pub struct SchemaCacheClassifier {
    indicators: Vec<String>,
}

impl SchemaCacheClassifier {
    /// Classifier with the default indicator list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_indicators(DEFAULT_SCHEMA_ERROR_INDICATORS.iter().copied())
    }

    /// Classifier with a custom indicator list. Empty indicators are ignored.
    #[must_use]
    pub fn with_indicators<I, S>(indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let indicators = indicators
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { indicators }
    }

    /// Add one indicator.
    #[must_use]
    pub fn with_indicator(mut self, indicator: &str) -> Self {
        let indicator = indicator.trim().to_lowercase();
        if !indicator.is_empty() && !self.indicators.contains(&indicator) {
            self.indicators.push(indicator);
        }
        self
    }

    /// Current indicator list (lowercased).
    #[must_use]
    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    /// True if `message` contains any indicator.
    #[must_use]
    pub fn matches_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.indicators.iter().any(|i| message.contains(i.as_str()))
    }
}

impl Default for SchemaCacheClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for SchemaCacheClassifier {
    fn is_recoverable(&self, error: &StoreError) -> bool {
        self.matches_message(&error.full_message())
    }
}

/// Default classification of an optional error. `None` is never recoverable.
#[must_use]
pub fn is_recoverable_schema_error(error: Option<&StoreError>) -> bool {
    match error {
        Some(err) => DEFAULT_CLASSIFIER.is_recoverable(err),
        None => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_not_recoverable() {
        assert!(!is_recoverable_schema_error(None));
    }

    #[test]
    fn test_schema_cache_messages_are_recoverable() {
        let messages = [
            "Could not find the table 'public.trades' in the schema cache",
            "Could not find the 'notes' column of 'trades' in the SCHEMA CACHE",
            "relation \"public.strategies\" does not exist",
            "permission denied for information_schema.columns",
            "stale cached plan must not change result type",
        ];
        for message in messages {
            let err = StoreError::query(message);
            assert!(is_recoverable_schema_error(Some(&err)), "{message}");
        }
    }

    #[test]
    fn test_other_errors_are_not_recoverable() {
        let messages = [
            "duplicate key value violates unique constraint \"trades_pkey\"",
            "JWT expired",
            "new row violates row-level security policy",
        ];
        for message in messages {
            let err = StoreError::query(message);
            assert!(!is_recoverable_schema_error(Some(&err)), "{message}");
        }
    }

    #[test]
    fn test_details_and_hint_are_inspected() {
        let err = StoreError::Query {
            message: "bad request".to_string(),
            code: None,
            details: None,
            hint: Some("try reloading the schema cache".to_string()),
        };
        assert!(is_recoverable_schema_error(Some(&err)));
    }

    #[test]
    fn test_connection_errors_use_display_text() {
        let err = StoreError::connection("proxy cache unavailable");
        assert!(is_recoverable_schema_error(Some(&err)));

        let err = StoreError::connection("connection refused");
        assert!(!is_recoverable_schema_error(Some(&err)));
    }

    #[test]
    fn test_custom_indicators() {
        let classifier = SchemaCacheClassifier::with_indicators(["", "  Stale Metadata "])
            .with_indicator("PGRST205")
            .with_indicator("pgrst205");

        assert_eq!(classifier.indicators(), ["stale metadata", "pgrst205"]);
        assert!(classifier.is_recoverable(&StoreError::query("STALE METADATA detected")));
        assert!(!classifier.is_recoverable(&StoreError::query("schema cache")));
    }

    #[test]
    fn test_closure_classifier() {
        let by_code = |err: &StoreError| err.code() == Some("42P01");
        assert!(by_code.is_recoverable(&StoreError::query_with_code("missing", "42P01")));
        assert!(!by_code.is_recoverable(&StoreError::query("missing")));
    }
}
