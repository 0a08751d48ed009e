//! Failure injection for mock devices.
//!
//! Scenarios model the ways a real unit misbehaves: a transition that never
//! completes, a write the hardware silently ignores, or an outright fault.

use dae_core::error::{DaeError, DaeResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Predefined failure scenarios
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScenario {
    /// The named operation reaches its intermediate state and stays there
    StuckTransition {
        /// Operation name (e.g. "pause_run")
        operation: &'static str,
    },
    /// Period writes are accepted but the readback never changes
    IgnorePeriodWrites,
    /// Per-period frame counters never read zero after a period change
    StaleFrameCounters,
    /// The named operation fails with a hardware error
    HardwareFault {
        /// Operation name
        operation: &'static str,
        /// Fault code reported in the error message
        code: u32,
    },
    /// The named operation succeeds `count` times, then fails every time
    FailAfterN {
        /// Operation name (e.g. "move")
        operation: &'static str,
        /// Number of calls that succeed
        count: u32,
    },
}

/// Error injection configuration for a mock device.
#[derive(Debug, Clone, Default)]
pub struct ErrorConfig {
    scenarios: Vec<ErrorScenario>,
    /// Calls seen per operation, shared between clones
    operation_counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl ErrorConfig {
    /// Create error config with no errors (default)
    pub fn none() -> Self {
        Self::default()
    }

    /// Create error config with one scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self {
            scenarios: vec![scenario],
            ..Self::default()
        }
    }

    /// Add another scenario
    pub fn with_scenario(mut self, scenario: ErrorScenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Fail if a hardware fault is configured for `operation`.
    ///
    /// Every call is counted, so `FailAfterN` sees the calls made before
    /// it starts failing.
    pub fn check_operation(&self, device: &str, operation: &str) -> DaeResult<()> {
        let calls = {
            let mut counts = self.operation_counts.lock();
            let calls = counts.entry(operation.to_string()).or_insert(0);
            *calls += 1;
            *calls
        };

        for scenario in &self.scenarios {
            match scenario {
                ErrorScenario::HardwareFault { operation: op, code } if *op == operation => {
                    return Err(DaeError::Hardware(format!(
                        "{}: fault {} during {}",
                        device, code, operation
                    )));
                }
                ErrorScenario::FailAfterN { operation: op, count } if *op == operation => {
                    if calls > *count {
                        return Err(DaeError::Hardware(format!(
                            "{}: injected failure after {} {} operations",
                            device, count, operation
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether `operation` should stop at its intermediate state.
    pub fn is_stuck(&self, operation: &str) -> bool {
        self.scenarios.iter().any(
            |s| matches!(s, ErrorScenario::StuckTransition { operation: op } if *op == operation),
        )
    }

    /// Whether period writes are ignored.
    pub fn ignores_period_writes(&self) -> bool {
        self.scenarios.contains(&ErrorScenario::IgnorePeriodWrites)
    }

    /// Whether per-period counters stay stale after a period change.
    pub fn stale_frame_counters(&self) -> bool {
        self.scenarios.contains(&ErrorScenario::StaleFrameCounters)
    }
}

/// Ordered record of operations performed on one or more mock devices.
///
/// Share one log between a mock DAE and a mock actuator to assert the
/// relative order of run-control actions and actuator moves.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Forget all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Index of the first event equal to `event` at or after `from`.
    pub fn position_after(&self, event: &str, from: usize) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .skip(from)
            .position(|e| e == event)
            .map(|i| i + from)
    }
}
