//! FallbackResult - The outcome handed back to callers
//!
//! TigerStyle: Errors are data. The executor never panics across its boundary.

use crate::error::FallbackError;
use crate::tier::ExecutionTier;

/// Outcome of one [`execute_with_fallback`](crate::FallbackExecutor::execute_with_fallback).
///
/// Invariants:
/// - `used_fallback == false` means any data came from the primary tier.
/// - `used_fallback == true` means `fallback_reason` is non-empty.
/// - `probe_only == true` means `data` came from the direct SQL probe and may
///   be narrower than what the original operation would have returned.
///
/// `data` and `error` are not expected together, but check `error` first.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult<T> {
    /// Rows or value produced, if any
    pub data: Option<T>,
    /// Failure, if the chain did not produce data
    pub error: Option<FallbackError>,
    /// True if any tier past primary was attempted
    pub used_fallback: bool,
    /// Original failure message plus escalation annotations
    pub fallback_reason: Option<String>,
    /// Tier that produced the final outcome
    pub tier: Option<ExecutionTier>,
    /// True if `data` is the generic direct SQL probe
    pub probe_only: bool,
}

impl<T> FallbackResult<T> {
    /// Data produced by the primary tier.
    #[must_use]
    pub fn primary(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            used_fallback: false,
            fallback_reason: None,
            tier: Some(ExecutionTier::Primary),
            probe_only: false,
        }
    }

    /// Failure returned without escalating.
    #[must_use]
    pub fn unescalated(error: FallbackError, reason: Option<String>) -> Self {
        Self {
            data: None,
            error: Some(error),
            used_fallback: false,
            fallback_reason: reason,
            tier: Some(ExecutionTier::Primary),
            probe_only: false,
        }
    }

    /// Data produced by an escalated tier.
    #[must_use]
    pub fn recovered(data: T, tier: ExecutionTier, reason: String) -> Self {
        Self {
            data: Some(data),
            error: None,
            used_fallback: true,
            fallback_reason: Some(reason),
            tier: Some(tier),
            probe_only: tier == ExecutionTier::DirectSql,
        }
    }

    /// Escalation ran out of tiers.
    #[must_use]
    pub fn exhausted(error: FallbackError, tier: ExecutionTier, reason: String) -> Self {
        Self {
            data: None,
            error: Some(error),
            used_fallback: true,
            fallback_reason: Some(reason),
            tier: Some(tier),
            probe_only: false,
        }
    }

    /// True if the result carries data and no error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.data.is_some()
    }

    /// Convert into a plain `Result`, discarding fallback metadata.
    ///
    /// # Errors
    /// Returns the carried error, or a decode error if neither data nor error
    /// is present.
    pub fn into_result(self) -> Result<T, FallbackError> {
        match (self.error, self.data) {
            (Some(err), _) => Err(err),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(FallbackError::Decode {
                message: "result carried neither data nor error".to_string(),
            }),
        }
    }

    /// Map the payload, keeping fallback metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FallbackResult<U> {
        FallbackResult {
            data: self.data.map(f),
            error: self.error,
            used_fallback: self.used_fallback,
            fallback_reason: self.fallback_reason,
            tier: self.tier,
            probe_only: self.probe_only,
        }
    }
}
