//! Error types for acquisition control and data reduction.
//!
//! This module defines [`DaeError`], the single error type returned by every
//! controller, waiter, reducer and orchestrator in the workspace. It is built
//! with `thiserror` so that underlying failures convert with `?`.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: the acquisition is set up in a way that cannot produce
//!   meaningful data (zero monitor counts, mismatched wavelength bands, more
//!   periods requested than the unit supports). Never retried.
//! - **`TransitionTimeout`**: a bounded confirmation wait on a hardware channel
//!   exceeded its deadline. Implies a stuck or misbehaving unit. Never retried.
//! - **`UnitMismatch`**: two measured quantities with incompatible physical units
//!   were combined.
//! - **`InvalidValue`**: a channel rejected a value during validation.
//! - **`Hardware`**: the channel transport itself failed.
//! - **`State`**: an orchestrator was driven out of order (e.g. triggered while
//!   unstaged).
//!
//! Nothing in this workspace recovers locally from any of these. The decision to
//! abort a run or leave it for manual inspection belongs to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::quantity::Unit;

/// Convenience alias for results using [`DaeError`].
pub type DaeResult<T> = std::result::Result<T, DaeError>;

/// Primary error type for DAE control and reduction.
///
/// # Example
///
/// ```rust,ignore
/// use dae_core::error::{DaeError, DaeResult};
///
/// fn check_monitor(counts: f64) -> DaeResult<()> {
///     if counts == 0.0 {
///         return Err(DaeError::Configuration(
///             "Cannot normalize; got zero monitor counts".into(),
///         ));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum DaeError {
    /// The acquisition is configured in a way that cannot produce valid data.
    ///
    /// **Error Type**: Permanent - requires changing the beamline or
    /// reduction configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A bounded wait for hardware confirmation exceeded its deadline.
    ///
    /// **Error Type**: Fatal - the unit is stuck or misconfigured. Callers
    /// should not retry automatically.
    #[error("Timed out after {timeout:?} waiting for '{channel}'")]
    TransitionTimeout {
        /// Name of the channel being waited on.
        channel: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Two quantities with incompatible units were combined.
    #[error("Unit mismatch: expected {expected}, got {actual}")]
    UnitMismatch {
        /// Unit required by the operation.
        expected: Unit,
        /// Unit that was supplied.
        actual: Unit,
    },

    /// A value was rejected by a channel's validator.
    #[error("Invalid value for '{channel}': {reason}")]
    InvalidValue {
        /// Name of the channel that rejected the value.
        channel: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The hardware transport failed.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    State(String),

    /// A reading could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaeError {
    /// Returns true for errors that mean the hardware did not respond in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DaeError::TransitionTimeout { .. })
    }

    /// Returns true for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DaeError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = DaeError::Configuration("zero monitor counts".to_string());
        assert_eq!(err.to_string(), "Configuration error: zero monitor counts");
        assert!(err.is_configuration());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_display() {
        let err = DaeError::TransitionTimeout {
            channel: "run_state".into(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("'run_state'"));
        assert!(err.to_string().contains("10s"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_unit_mismatch_display() {
        let err = DaeError::UnitMismatch {
            expected: Unit::Counts,
            actual: Unit::Angstrom,
        };
        assert_eq!(err.to_string(), "Unit mismatch: expected counts, got Å");
    }
}
