//! Errors
//!
//! TigerStyle: Explicit error variants, constructor helpers, no panics across
//! the executor boundary.

use std::fmt;

use crate::tier::ExecutionTier;

// =============================================================================
// StoreError
// =============================================================================

/// A failure reported by a data-store tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description
        message: String,
    },

    /// The store rejected or failed the query.
    #[error("{message}")]
    Query {
        /// Message reported by the store
        message: String,
        /// Store-specific error code, if any
        code: Option<String>,
        /// Additional details, if any
        details: Option<String>,
        /// Remediation hint, if any
        hint: Option<String>,
    },

    /// The request was refused before reaching the store.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable description
        message: String,
    },

    /// The response could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Human-readable description
        message: String,
    },
}

impl StoreError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error carrying only a message.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            code: None,
            details: None,
            hint: None,
        }
    }

    /// Create a query error with a store error code.
    #[must_use]
    pub fn query_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            code: Some(code.into()),
            details: None,
            hint: None,
        }
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Full human-readable text, including details and hint when present.
    #[must_use]
    pub fn full_message(&self) -> String {
        match self {
            Self::Query {
                message,
                details,
                hint,
                ..
            } => {
                let mut text = message.clone();
                for extra in [details, hint].into_iter().flatten() {
                    text.push_str(" | ");
                    text.push_str(extra);
                }
                text
            }
            other => other.to_string(),
        }
    }

    /// Store error code, if the store supplied one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else {
            Self::connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Result alias for data-store calls.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// FallbackError
// =============================================================================

/// A tier that failed to discard its schema cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    /// Tier that failed
    pub tier: ExecutionTier,
    /// Failure message
    pub message: String,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.message)
    }
}

/// The error carried by a [`FallbackResult`](crate::FallbackResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    /// A tier returned a store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A recoverable error was seen but escalation is switched off.
    #[error("fallback disabled: {reason}")]
    FallbackDisabled {
        /// The original failure message
        reason: String,
    },

    /// An escalated attempt did not finish in time.
    #[error("fallback query timeout after {timeout_ms}ms on {tier} tier")]
    Timeout {
        /// Tier that timed out
        tier: ExecutionTier,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// The direct SQL tier cannot replay this kind of operation.
    #[error("direct SQL fallback not supported for {operation} operations on '{resource}'")]
    UnsupportedOperation {
        /// Operation kind name
        operation: String,
        /// Resource name
        resource: String,
    },

    /// Probe rows could not be decoded into the caller's type.
    #[error("failed to decode fallback data: {message}")]
    Decode {
        /// Human-readable description
        message: String,
    },

    /// One or more tiers failed to discard their schema cache.
    #[error("cache clear failed on {} tier(s): {}", .failures.len(), join_failures(.failures))]
    CacheClear {
        /// Every tier that failed
        failures: Vec<TierFailure>,
    },
}

fn join_failures(failures: &[TierFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FallbackError {
    /// True if this error came from an escalation timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================
