//! Shared constants for hardware waits and numeric reduction policy.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Deadline for every bounded hardware confirmation wait (10 seconds).
///
/// Used by controllers when waiting for run-state transitions, period
/// changes and per-period counter resets. Exceeding it is fatal.
pub const TRANSITION_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Reduction Policy
// =============================================================================

/// Constant added to every summed detector-count variance before division.
///
/// Keeps the propagated uncertainty of an empty or near-empty detector sum
/// non-zero, so that fits weighted by `1/σ²` stay finite.
pub const VARIANCE_ADDITION: f64 = 0.5;

/// Display precision (decimal places) attached to intensity-like outputs.
pub const INTENSITY_PRECISION: usize = 6;

/// Planck constant in J·s.
pub const PLANCK_CONSTANT: f64 = 6.626_070_15e-34;

/// Neutron rest mass in kg.
pub const NEUTRON_MASS: f64 = 1.674_927_498_04e-27;
