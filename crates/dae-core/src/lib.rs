//! Core types for rust-dae.
//!
//! This crate holds everything the acquisition strategies share:
//!
//! - [`observable`] and [`channel`]: watch-backed values with optional async
//!   hardware I/O and bounded or unbounded waits
//! - [`unit`]: the [`AcquisitionUnit`] channel group
//! - [`run_state`]: hardware run states and begin-run flags
//! - [`quantity`]: values with variance and units, [`Interval`]
//! - [`spectrum`]: time-of-flight histograms and raw period blocks
//! - [`capabilities`]: the [`Movable`] actuator trait
//! - [`error`]: [`DaeError`] and [`DaeResult`]
//! - [`limits`]: timeouts and reduction constants

pub mod capabilities;
pub mod channel;
pub mod error;
pub mod limits;
pub mod observable;
pub mod quantity;
pub mod run_state;
pub mod spectrum;
pub mod unit;

pub use capabilities::Movable;
pub use channel::{Action, Channel};
pub use error::{DaeError, DaeResult};
pub use observable::{Observable, ObservableMetadata, Readable, Reading};
pub use quantity::{polarisation, Interval, MeasuredQuantity, Unit};
pub use run_state::{BeginRunExFlags, RunState};
pub use spectrum::{PeriodSpectra, Spectrum};
pub use unit::{AcquisitionUnit, PeriodCounters, RunControls, SpectrumSource};
