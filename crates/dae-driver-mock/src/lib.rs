//! Mock Hardware Drivers for rust-dae
//!
//! This crate provides simulated hardware for testing acquisition strategies
//! without physical electronics. All mock devices use async-safe operations
//! (tokio::time::sleep, not std::thread::sleep), so tests can run them under
//! paused time.
//!
//! # Available Mock Drivers
//!
//! - [`MockDae`] - Simulated acquisition electronics: run-state machine,
//!   period bank, frame/charge counters and histogram memory
//! - [`MockActuator`] - Simulated two-state actuator (spin flipper)
//!
//! # Failure Injection
//!
//! [`ErrorConfig`] drives stuck transitions, ignored period writes, stale
//! frame counters and hardware faults, so that timeout and configuration
//! error paths can be tested deterministically.
//!
//! ```rust,ignore
//! use dae_driver_mock::{ErrorConfig, ErrorScenario, MockDae, MockDaeConfig};
//!
//! let dae = MockDae::with_errors(
//!     MockDaeConfig::default(),
//!     ErrorConfig::scenario(ErrorScenario::StuckTransition { operation: "pause_run" }),
//! );
//! ```

pub mod common;
mod mock_actuator;
mod mock_dae;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, EventLog, TimingConfig};

// Re-export driver types
pub use mock_actuator::MockActuator;
pub use mock_dae::{MockDae, MockDaeConfig};
