//! Timing configuration for realistic mode.
//!
//! Defines hardware-like delays so that integration tests exercise the same
//! suspend points as a real unit.

use serde::Deserialize;
use std::time::Duration;

/// Timing configuration for realistic mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time between an intermediate run state (BEGINNING, PAUSING, ...) and
    /// the settled state, in milliseconds
    pub transition_delay_ms: u64,
    /// Settling time in milliseconds (actuators)
    pub settling_time_ms: u64,
    /// Communication delay in milliseconds applied to channel writes
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Timing typical of the acquisition electronics.
    pub fn dae() -> Self {
        Self {
            transition_delay_ms: 200,
            settling_time_ms: 0,
            communication_delay_ms: 5,
        }
    }

    /// Timing typical of a spin flipper power supply.
    pub fn flipper() -> Self {
        Self {
            transition_delay_ms: 0,
            settling_time_ms: 100,
            communication_delay_ms: 5,
        }
    }

    /// Delay between intermediate and settled run states.
    pub fn transition_delay(&self) -> Duration {
        Duration::from_millis(self.transition_delay_ms)
    }

    /// Actuator settling delay.
    pub fn settling_time(&self) -> Duration {
        Duration::from_millis(self.settling_time_ms)
    }

    /// Delay applied to each channel write.
    pub fn communication_delay(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            transition_delay_ms: 0,
            settling_time_ms: 0,
            communication_delay_ms: 0,
        }
    }
}
