//! Mock DAE implementation.
//!
//! Simulates the run-state machine, period bank, frame and charge counters and
//! histogram memory of the acquisition electronics behind an
//! [`AcquisitionUnit`]. Run-control actions move through their intermediate
//! state (BEGINNING, PAUSING, ...) and settle after
//! [`TimingConfig::transition_delay`]. Period writes are confirmed by the
//! device publishing the readback, and are silently ignored when they exceed
//! the configured number of periods, as the real hardware does.
//!
//! Histogram contents are programmed by tests with [`MockDae::set_spectrum`]
//! and survive begin/end of runs; frame counters are cleared on begin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::spectrum::{PeriodSpectra, Spectrum};
use dae_core::unit::{AcquisitionUnit, RunControls, SpectrumSource};
use dae_core::{Action, BeginRunExFlags, RunState};
use parking_lot::Mutex;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::common::{ErrorConfig, EventLog, TimingConfig};

/// Value the electronics write into the junk spectrum and junk time bin.
const JUNK: i64 = 987_654_321;

/// Configuration for MockDae
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockDaeConfig {
    /// Unit name, used as the channel name prefix
    pub name: String,
    /// Number of spectra (excluding the junk spectrum 0)
    pub num_spectra: usize,
    /// Time-of-flight bin edges shared by every spectrum, in µs
    pub tof_edges_us: Vec<f64>,
    /// Number of hardware periods
    pub max_periods: usize,
    /// Run number reported before the first run ends
    pub first_run_number: i64,
    /// Proton charge added per good frame
    pub uah_per_frame: f64,
    /// Millions of events added per good frame
    pub mevents_per_frame: f64,
    /// Simulated delays
    pub timing: TimingConfig,
}

impl Default for MockDaeConfig {
    fn default() -> Self {
        Self {
            name: "dae".to_string(),
            num_spectra: 8,
            tof_edges_us: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            max_periods: 10,
            first_run_number: 1000,
            uah_per_frame: 0.001,
            mevents_per_frame: 0.0001,
            timing: TimingConfig::default(),
        }
    }
}

impl MockDaeConfig {
    /// Parse a TOML table, filling unspecified fields with defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid mock DAE configuration")?;
        if config.tof_edges_us.len() < 2 {
            anyhow::bail!("mock DAE needs at least two time-of-flight edges");
        }
        if config.max_periods == 0 {
            anyhow::bail!("mock DAE needs at least one period");
        }
        Ok(config)
    }

    fn num_time_channels(&self) -> usize {
        self.tof_edges_us.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Default)]
struct PeriodData {
    good_frames: i64,
    raw_frames: i64,
    good_uah: f64,
    /// Indexed by spectrum number; index 0 is the junk spectrum.
    counts: Vec<Vec<f64>>,
}

#[derive(Debug)]
struct DaeState {
    run_state: RunState,
    /// Selected period, 1-based.
    period: usize,
    periods: Vec<PeriodData>,
    good_frames: i64,
    raw_frames: i64,
    good_uah: f64,
    m_events: f64,
    run_number: i64,
    period_writes: Vec<i64>,
}

impl DaeState {
    fn new(config: &MockDaeConfig) -> Self {
        let empty = PeriodData {
            counts: vec![vec![0.0; config.num_time_channels()]; config.num_spectra + 1],
            ..PeriodData::default()
        };
        Self {
            run_state: RunState::Setup,
            period: 1,
            periods: vec![empty; config.max_periods.max(1)],
            good_frames: 0,
            raw_frames: 0,
            good_uah: 0.0,
            m_events: 0.0,
            run_number: config.first_run_number,
            period_writes: Vec::new(),
        }
    }

    fn resolve_period(&self, period: usize) -> DaeResult<usize> {
        let period = if period == 0 { self.period } else { period };
        if period > self.periods.len() {
            return Err(DaeError::Configuration(format!(
                "Period {} not present (unit has {})",
                period,
                self.periods.len()
            )));
        }
        Ok(period)
    }

    fn reset_counters(&mut self) {
        self.good_frames = 0;
        self.raw_frames = 0;
        self.good_uah = 0.0;
        self.m_events = 0.0;
        for period in &mut self.periods {
            period.good_frames = 0;
            period.raw_frames = 0;
            period.good_uah = 0.0;
        }
    }
}

/// Histogram memory view handed to the [`AcquisitionUnit`].
struct MockSpectra {
    state: Arc<Mutex<DaeState>>,
    tof_edges_us: Vec<f64>,
    num_spectra: usize,
}

#[async_trait]
impl SpectrumSource for MockSpectra {
    async fn read_spectrum(&self, spectrum: usize, period: usize) -> DaeResult<Spectrum> {
        if spectrum > self.num_spectra {
            return Err(DaeError::Configuration(format!(
                "Spectrum {} not present (unit has {})",
                spectrum, self.num_spectra
            )));
        }
        let counts = {
            let state = self.state.lock();
            let period = state.resolve_period(period)?;
            state.periods[period - 1].counts[spectrum].clone()
        };
        Spectrum::new(self.tof_edges_us.clone(), counts)
    }

    async fn period_spectra_data(&self, period: usize) -> DaeResult<PeriodSpectra> {
        let num_time_channels = self.tof_edges_us.len().saturating_sub(1);
        let data = {
            let state = self.state.lock();
            let period = state.resolve_period(period)?;
            let mut data = Vec::with_capacity((self.num_spectra + 1) * (num_time_channels + 1));
            for (spectrum, counts) in state.periods[period - 1].counts.iter().enumerate() {
                data.push(JUNK);
                if spectrum == 0 {
                    data.extend(std::iter::repeat(JUNK).take(num_time_channels));
                } else {
                    data.extend(counts.iter().map(|c| c.round() as i64));
                }
            }
            data
        };
        PeriodSpectra::new(self.num_spectra, num_time_channels, data)
    }
}

struct Shared {
    config: MockDaeConfig,
    errors: ErrorConfig,
    state: Arc<Mutex<DaeState>>,
    /// Device-side view of the unit's channels.
    channels: AcquisitionUnit,
    log: EventLog,
}

impl Shared {
    fn publish_counters(&self) {
        let (run, period) = {
            let state = self.state.lock();
            let p = &state.periods[state.period - 1];
            (
                (
                    state.good_frames,
                    state.raw_frames,
                    state.good_uah,
                    state.m_events,
                    state.run_number,
                ),
                (p.good_frames, p.raw_frames, p.good_uah),
            )
        };
        self.channels.good_frames.publish(run.0);
        self.channels.raw_frames.publish(run.1);
        self.channels.good_uah.publish(run.2);
        self.channels.m_events.publish(run.3);
        self.channels.current_or_next_run_number.publish(run.4);
        self.channels.period.good_frames.publish(period.0);
        self.channels.period.raw_frames.publish(period.1);
        self.channels.period.good_uah.publish(period.2);
    }

    fn settle(&self, to: RunState) {
        self.state.lock().run_state = to;
        self.channels.run_state.publish(to);
        tracing::debug!(unit = %self.config.name, state = %to, "MockDae: transition complete");
    }

    async fn transition<F>(
        self: &Arc<Self>,
        operation: &'static str,
        allowed: fn(RunState) -> bool,
        via: RunState,
        to: RunState,
        side_effect: F,
    ) -> DaeResult<()>
    where
        F: FnOnce(&mut DaeState) + Send,
    {
        self.log.record(operation);
        let delay = self.config.timing.communication_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.errors.check_operation(&self.config.name, operation)?;

        {
            let mut state = self.state.lock();
            if !allowed(state.run_state) {
                return Err(DaeError::Hardware(format!(
                    "{}: cannot {} in state {}",
                    self.config.name, operation, state.run_state
                )));
            }
            side_effect(&mut state);
            state.run_state = via;
        }
        self.publish_counters();
        self.channels.run_state.publish(via);
        tracing::debug!(unit = %self.config.name, operation, state = %via, "MockDae: transition started");

        if self.errors.is_stuck(operation) {
            tracing::warn!(unit = %self.config.name, operation, "MockDae: transition stuck");
            return Ok(());
        }

        let delay = self.config.timing.transition_delay();
        if delay.is_zero() {
            self.settle(to);
        } else {
            let shared = Arc::downgrade(self);
            tokio::spawn(async move {
                sleep(delay).await;
                if let Some(shared) = shared.upgrade() {
                    shared.settle(to);
                }
            });
        }
        Ok(())
    }

    async fn begin(self: &Arc<Self>, flags: BeginRunExFlags) -> DaeResult<()> {
        let (operation, to) = match flags {
            BeginRunExFlags::Running => ("begin_run", RunState::Running),
            BeginRunExFlags::BeginPaused | BeginRunExFlags::BeginDelayed => {
                ("begin_run_ex", RunState::Paused)
            }
        };
        self.transition(
            operation,
            |s| s == RunState::Setup,
            RunState::Beginning,
            to,
            DaeState::reset_counters,
        )
        .await
    }

    async fn end(self: &Arc<Self>) -> DaeResult<()> {
        self.transition(
            "end_run",
            |s| s.is_counting() || s == RunState::Paused,
            RunState::Ending,
            RunState::Setup,
            |state| state.run_number += 1,
        )
        .await
    }

    async fn abort(self: &Arc<Self>) -> DaeResult<()> {
        self.transition(
            "abort_run",
            |s| s != RunState::Setup,
            RunState::Aborting,
            RunState::Setup,
            |_| {},
        )
        .await
    }

    async fn pause(self: &Arc<Self>) -> DaeResult<()> {
        self.transition(
            "pause_run",
            RunState::is_counting,
            RunState::Pausing,
            RunState::Paused,
            |_| {},
        )
        .await
    }

    async fn resume(self: &Arc<Self>) -> DaeResult<()> {
        self.transition(
            "resume_run",
            |s| s == RunState::Paused,
            RunState::Resuming,
            RunState::Running,
            |_| {},
        )
        .await
    }

    async fn write_period(self: &Arc<Self>, requested: i64) -> DaeResult<()> {
        self.log.record(format!("period_num={}", requested));
        let delay = self.config.timing.communication_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.errors.check_operation(&self.config.name, "period_num")?;

        let accepted = {
            let mut state = self.state.lock();
            state.period_writes.push(requested);
            let in_range = requested >= 1 && (requested as usize) <= state.periods.len();
            if in_range && !self.errors.ignores_period_writes() {
                state.period = requested as usize;
                true
            } else {
                false
            }
        };

        if !accepted {
            tracing::warn!(
                unit = %self.config.name,
                requested,
                max_periods = self.config.max_periods,
                "MockDae: period write ignored"
            );
            return Ok(());
        }

        self.publish_counters();
        if self.errors.stale_frame_counters() {
            self.channels
                .period
                .good_frames
                .publish_modify(|frames| *frames = (*frames).max(1));
        }
        self.channels.period_num.publish(requested);
        Ok(())
    }

    fn advance_frames(&self, frames: i64) -> bool {
        {
            let mut state = self.state.lock();
            if state.run_state != RunState::Running {
                return false;
            }
            let uah = frames as f64 * self.config.uah_per_frame;
            state.good_frames += frames;
            state.raw_frames += frames;
            state.good_uah += uah;
            state.m_events += frames as f64 * self.config.mevents_per_frame;
            let index = state.period - 1;
            let period = &mut state.periods[index];
            period.good_frames += frames;
            period.raw_frames += frames;
            period.good_uah += uah;
        }
        self.publish_counters();
        true
    }
}

fn connect<A, F, Fut>(shared: &Arc<Shared>, action: &str, handler: F) -> Action<A>
where
    A: Send + 'static,
    F: Fn(Arc<Shared>, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DaeResult<()>> + Send + 'static,
{
    let name = format!("{}-{}", shared.config.name, action);
    let shared = shared.clone();
    Action::new(name, move |arg| Box::pin(handler(shared.clone(), arg)))
}

/// Simulated data-acquisition electronics.
///
/// # Example
///
/// ```rust,ignore
/// let dae = MockDae::new(MockDaeConfig::default());
/// let unit = dae.unit();
/// unit.controls.begin_run.trigger().await?;
/// dae.advance_frames(100);
/// assert_eq!(unit.period.good_frames.get(), 100);
/// ```
pub struct MockDae {
    shared: Arc<Shared>,
    unit: AcquisitionUnit,
}

impl MockDae {
    /// Create a mock DAE with no error injection.
    pub fn new(config: MockDaeConfig) -> Self {
        Self::with_errors(config, ErrorConfig::none())
    }

    /// Create a mock DAE with error injection.
    pub fn with_errors(config: MockDaeConfig, errors: ErrorConfig) -> Self {
        let state = Arc::new(Mutex::new(DaeState::new(&config)));
        let spectra = Arc::new(MockSpectra {
            state: state.clone(),
            tof_edges_us: config.tof_edges_us.clone(),
            num_spectra: config.num_spectra,
        });
        let unit = AcquisitionUnit::new(config.name.clone(), spectra);

        let shared = Arc::new(Shared {
            config,
            errors,
            state,
            channels: unit.clone(),
            log: EventLog::new(),
        });

        let channels = &shared.channels;
        channels.num_spectra.publish(shared.config.num_spectra as i64);
        channels
            .num_time_channels
            .publish(shared.config.num_time_channels() as i64);
        channels
            .number_of_periods
            .publish(shared.config.max_periods as i64);
        channels.period_num.publish(1);
        shared.publish_counters();

        let controls = RunControls {
            begin_run: connect(&shared, "begin_run", |s, ()| async move {
                s.begin(BeginRunExFlags::Running).await
            }),
            begin_run_ex: connect(&shared, "begin_run_ex", |s, flags| async move {
                s.begin(flags).await
            }),
            end_run: connect(&shared, "end_run", |s, ()| async move { s.end().await }),
            pause_run: connect(&shared, "pause_run", |s, ()| async move { s.pause().await }),
            resume_run: connect(&shared, "resume_run", |s, ()| async move { s.resume().await }),
            abort_run: connect(&shared, "abort_run", |s, ()| async move { s.abort().await }),
        };

        let mut unit = unit.with_controls(controls);
        let writer = shared.clone();
        unit.period_num = unit
            .period_num
            .connect_to_hardware_write(move |period| {
                let writer = writer.clone();
                Box::pin(async move { writer.write_period(period).await })
            })
            .confirmed_by_device();

        tracing::debug!(unit = %shared.config.name, "MockDae: created");
        Self { shared, unit }
    }

    /// The acquisition unit driven by this mock.
    pub fn unit(&self) -> AcquisitionUnit {
        self.unit.clone()
    }

    /// Log of actions and writes received, shared with any linked devices.
    pub fn event_log(&self) -> EventLog {
        self.shared.log.clone()
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.shared.state.lock().run_state
    }

    /// Force the run state, bypassing the state machine.
    pub fn set_run_state(&self, state: RunState) {
        self.shared.settle(state);
    }

    /// Every period number written, in order, including ignored writes.
    pub fn period_writes(&self) -> Vec<i64> {
        self.shared.state.lock().period_writes.clone()
    }

    /// Program the counts of one spectrum. Period `0` means the current period.
    pub fn set_spectrum(&self, spectrum: usize, period: usize, counts: Vec<f64>) -> DaeResult<()> {
        let expected = self.shared.config.num_time_channels();
        if counts.len() != expected {
            return Err(DaeError::InvalidValue {
                channel: format!("spectrum {}", spectrum),
                reason: format!("expected {} time channels, got {}", expected, counts.len()),
            });
        }
        if spectrum == 0 || spectrum > self.shared.config.num_spectra {
            return Err(DaeError::Configuration(format!(
                "Spectrum {} not present",
                spectrum
            )));
        }
        let mut state = self.shared.state.lock();
        let period = state.resolve_period(period)?;
        state.periods[period - 1].counts[spectrum] = counts;
        Ok(())
    }

    /// Count `frames` good frames into the run and current period.
    ///
    /// Returns false (and counts nothing) unless the unit is RUNNING.
    pub fn advance_frames(&self, frames: i64) -> bool {
        self.shared.advance_frames(frames)
    }

    /// Start a simulated beam that counts `frames_per_tick` every `interval`
    /// while the unit is RUNNING.
    ///
    /// The task exits once the mock and every unit clone are dropped.
    pub fn start_beam(&self, frames_per_tick: i64, interval: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                match shared.upgrade() {
                    Some(shared) => {
                        shared.advance_frames(frames_per_tick);
                    }
                    None => break,
                }
            }
        })
    }
}
