//! # rust-dae
//!
//! Acquisition control and data reduction for the data acquisition
//! electronics (DAE) of a pulsed neutron or muon source.
//!
//! A measurement point is counted by composing three strategies behind an
//! orchestrator:
//!
//! - a [`Controller`](strategies::Controller) that starts and stops counting,
//!   either one hardware period or one run per point
//! - a [`Waiter`](strategies::Waiter) that blocks until enough has been
//!   counted (frames, charge, events or wall time)
//! - a [`Reducer`](strategies::Reducer) that turns histograms into published
//!   values with propagated uncertainties
//!
//! ## Crate Structure
//!
//! - **`config`**: TOML plus environment configuration via `figment`.
//! - **`factory`**: Ready-made orchestrators built from configuration.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`orchestrator`**: [`Orchestrator`] and its stage/trigger/unstage
//!   state machine.
//! - **`polarising`**: [`PolarisingOrchestrator`], counting each point in two
//!   actuator states.
//! - **`strategies`**: Controllers, waiters and reducers.
//!
//! Hardware-facing types ([`AcquisitionUnit`](dae_core::AcquisitionUnit),
//! channels, spectra, measured quantities) live in [`dae_core`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use rust_dae::{config::DaeConfig, factory};
//!
//! let config = DaeConfig::load()?;
//! let mut dae = factory::monitor_normalising_dae(unit, &config)?;
//! dae.stage().await?;
//! dae.trigger().await?;
//! for (name, reading) in dae.read()? {
//!     println!("{name} = {}", reading.value);
//! }
//! dae.unstage().await?;
//! ```

pub mod config;
pub mod factory;
pub mod logging;
pub mod orchestrator;
pub mod polarising;
pub mod strategies;

pub use dae_core;

pub use config::DaeConfig;
pub use factory::{monitor_normalising_dae, polarising_dae, MonitorNormalisingDae, PolarisingDae};
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use polarising::PolarisingOrchestrator;
pub use strategies::controllers::check_periods;
