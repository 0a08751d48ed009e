//! The acquisition unit: run state, counters, spectra and run controls.
//!
//! [`AcquisitionUnit`] groups the channels that controllers, waiters and
//! reducers consume. Strategies hold a reference to it for the duration of a
//! call but never own it. Channels are named `{unit}-{field}` so they can be
//! published directly in an orchestrator's readable set.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::channel::{Action, Channel};
use crate::error::{DaeError, DaeResult};
use crate::run_state::{BeginRunExFlags, RunState};
use crate::spectrum::{PeriodSpectra, Spectrum};

/// Source of raw histogram data.
///
/// Period `0` means "the current period".
#[async_trait]
pub trait SpectrumSource: Send + Sync {
    /// Read one spectrum as a time-of-flight histogram.
    async fn read_spectrum(&self, spectrum: usize, period: usize) -> DaeResult<Spectrum>;

    /// Read every spectrum of a period as one raw block.
    async fn period_spectra_data(&self, period: usize) -> DaeResult<PeriodSpectra>;
}

/// Counters that reset at the start of each hardware period.
#[derive(Debug, Clone)]
pub struct PeriodCounters {
    /// Good frames counted in the current period.
    pub good_frames: Channel<i64>,
    /// Raw frames counted in the current period.
    pub raw_frames: Channel<i64>,
    /// Good proton charge in the current period.
    pub good_uah: Channel<f64>,
}

/// Triggerable run-control actions.
#[derive(Debug, Clone)]
pub struct RunControls {
    /// Begin a run, counting immediately.
    pub begin_run: Action,
    /// Begin a run with options.
    pub begin_run_ex: Action<BeginRunExFlags>,
    /// End the run, saving data.
    pub end_run: Action,
    /// Pause counting.
    pub pause_run: Action,
    /// Resume counting.
    pub resume_run: Action,
    /// End the run, discarding data.
    pub abort_run: Action,
}

impl RunControls {
    /// Controls that fail until a driver connects real ones.
    pub fn disconnected(unit: &str) -> Self {
        let action = |name: &str| {
            let full = format!("{}-{}", unit, name);
            let message = format!("'{}' is not connected", full);
            Action::new(full, move |_: ()| {
                let message = message.clone();
                Box::pin(async move { Err(DaeError::Hardware(message)) })
            })
        };
        let begin_ex_message = format!("'{}-begin_run_ex' is not connected", unit);
        Self {
            begin_run: action("begin_run"),
            begin_run_ex: Action::new(format!("{}-begin_run_ex", unit), move |_| {
                let message = begin_ex_message.clone();
                Box::pin(async move { Err(DaeError::Hardware(message)) })
            }),
            end_run: action("end_run"),
            pause_run: action("pause_run"),
            resume_run: action("resume_run"),
            abort_run: action("abort_run"),
        }
    }
}

/// Channel group for one data-acquisition electronics unit.
#[derive(Clone)]
pub struct AcquisitionUnit {
    name: String,
    /// Current run state.
    pub run_state: Channel<RunState>,
    /// Active period (1-based; 0 before the first period is selected).
    pub period_num: Channel<i64>,
    /// Number of periods the hardware is configured with.
    pub number_of_periods: Channel<i64>,
    /// Good frames in the whole run.
    pub good_frames: Channel<i64>,
    /// Raw frames in the whole run.
    pub raw_frames: Channel<i64>,
    /// Good proton charge in the whole run.
    pub good_uah: Channel<f64>,
    /// Millions of events counted.
    pub m_events: Channel<f64>,
    /// Per-period counters.
    pub period: PeriodCounters,
    /// Number of the current run, or of the next run if none is open.
    pub current_or_next_run_number: Channel<i64>,
    /// Number of spectra (excluding the junk spectrum 0).
    pub num_spectra: Channel<i64>,
    /// Number of time channels (excluding the junk bin 0).
    pub num_time_channels: Channel<i64>,
    /// Run controls.
    pub controls: RunControls,
    spectra: Arc<dyn SpectrumSource>,
}

impl fmt::Debug for AcquisitionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionUnit")
            .field("name", &self.name)
            .field("run_state", &self.run_state.get())
            .field("period_num", &self.period_num.get())
            .finish_non_exhaustive()
    }
}

impl AcquisitionUnit {
    /// Create a unit with unconnected channels and controls.
    ///
    /// Drivers then attach hardware callbacks to the public channel fields
    /// and install controls with [`AcquisitionUnit::with_controls`].
    pub fn new(name: impl Into<String>, spectra: Arc<dyn SpectrumSource>) -> Self {
        let name = name.into();
        let controls = RunControls::disconnected(&name);
        let ch = |field: &str| format!("{}-{}", name, field);
        Self {
            run_state: Channel::new(ch("run_state"), RunState::Setup).read_only(),
            period_num: Channel::new(ch("period_num"), 0),
            number_of_periods: Channel::new(ch("number_of_periods"), 1),
            good_frames: Channel::new(ch("good_frames"), 0).read_only(),
            raw_frames: Channel::new(ch("raw_frames"), 0).read_only(),
            good_uah: Channel::new(ch("good_uah"), 0.0)
                .with_units("µAh")
                .read_only(),
            m_events: Channel::new(ch("m_events"), 0.0).read_only(),
            period: PeriodCounters {
                good_frames: Channel::new(ch("period-good_frames"), 0).read_only(),
                raw_frames: Channel::new(ch("period-raw_frames"), 0).read_only(),
                good_uah: Channel::new(ch("period-good_uah"), 0.0)
                    .with_units("µAh")
                    .read_only(),
            },
            current_or_next_run_number: Channel::new(ch("current_or_next_run_number"), 0)
                .read_only(),
            num_spectra: Channel::new(ch("num_spectra"), 0).read_only(),
            num_time_channels: Channel::new(ch("num_time_channels"), 0).read_only(),
            controls,
            spectra,
            name,
        }
    }

    /// Replace the run controls.
    pub fn with_controls(mut self, controls: RunControls) -> Self {
        self.controls = controls;
        self
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read one spectrum of the current period.
    pub async fn read_spectrum(&self, spectrum: usize) -> DaeResult<Spectrum> {
        self.spectra.read_spectrum(spectrum, 0).await
    }

    /// Read the raw block of every spectrum in the currently selected period.
    pub async fn current_period_spectra(&self) -> DaeResult<PeriodSpectra> {
        let period = self.period_num.get_value().await?;
        let period = usize::try_from(period).map_err(|_| {
            DaeError::Configuration(format!("Invalid period number {}", period))
        })?;
        self.spectra.period_spectra_data(period).await
    }
}
