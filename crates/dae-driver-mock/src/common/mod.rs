//! Shared configuration for the mock drivers.

pub mod errors;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario, EventLog};
pub use timing::TimingConfig;
