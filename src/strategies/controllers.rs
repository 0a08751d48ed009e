//! Controllers: how each counting window is opened and closed.
//!
//! Every confirmation wait is bounded (default
//! [`TRANSITION_TIMEOUT`](dae_core::limits::TRANSITION_TIMEOUT)). A wait that
//! exceeds its deadline means the unit is stuck or misconfigured; the error is
//! returned to the caller and never retried.

use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::limits::TRANSITION_TIMEOUT;
use dae_core::{AcquisitionUnit, BeginRunExFlags, Observable, Readable, RunState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Controller, Strategy};

async fn wait_for_counting(unit: &AcquisitionUnit, timeout: Duration) -> DaeResult<RunState> {
    unit.run_state
        .wait_for(|state| state.is_counting(), Some(timeout))
        .await
}

async fn wait_for_paused(unit: &AcquisitionUnit, timeout: Duration) -> DaeResult<RunState> {
    unit.run_state
        .wait_for(|state| *state == RunState::Paused, Some(timeout))
        .await
}

/// Fail unless the unit has at least `periods` hardware periods.
///
/// With period-per-point counting every point needs its own period; checking
/// up front avoids discovering the shortfall part-way through a scan.
pub async fn check_periods(unit: &AcquisitionUnit, periods: usize) -> DaeResult<()> {
    let available = unit.number_of_periods.get_value().await?;
    let available = usize::try_from(available).unwrap_or(0);
    if periods > available {
        return Err(DaeError::Configuration(format!(
            "{} periods requested but '{}' is configured with {}",
            periods,
            unit.name(),
            available
        )));
    }
    Ok(())
}

async fn end_or_abort_run(unit: &AcquisitionUnit, save_run: bool) -> DaeResult<()> {
    if save_run {
        info!(unit = unit.name(), "ending run");
        unit.controls.end_run.trigger().await?;
        info!(unit = unit.name(), "run ended");
    } else {
        warn!(unit = unit.name(), "aborting run, data will not be saved");
        unit.controls.abort_run.trigger().await?;
        info!(unit = unit.name(), "run aborted");
    }
    Ok(())
}

/// Counts each point into a new hardware period of a single run.
///
/// The run is opened paused in `setup`; each point selects the next period
/// (starting from 1) and resumes. `teardown` ends the run when `save_run` is
/// set and aborts it otherwise.
///
/// When the number of periods a scan needs is known, `setup` refuses to open
/// the run on a unit configured with fewer.
#[derive(Debug, Clone)]
pub struct PeriodPerPointController {
    save_run: bool,
    current_period: i64,
    timeout: Duration,
    required_periods: Option<usize>,
}

impl PeriodPerPointController {
    /// Create a controller; `save_run` picks end over abort at teardown.
    pub fn new(save_run: bool) -> Self {
        Self {
            save_run,
            current_period: 0,
            timeout: TRANSITION_TIMEOUT,
            required_periods: None,
        }
    }

    /// Check in `setup` that the unit has at least `periods` periods.
    pub fn with_required_periods(mut self, periods: usize) -> Self {
        self.required_periods = Some(periods);
        self
    }

    /// Override the bound on confirmation waits.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Period the last point counted into (0 before the first point).
    pub fn current_period(&self) -> i64 {
        self.current_period
    }

    /// Whether teardown saves the run.
    pub fn save_run(&self) -> bool {
        self.save_run
    }
}

impl Strategy for PeriodPerPointController {
    fn additional_outputs(&self, unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![Arc::new(unit.period_num.clone())]
    }
}

#[async_trait]
impl Controller for PeriodPerPointController {
    async fn setup(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        self.current_period = 0;
        if let Some(periods) = self.required_periods {
            check_periods(unit, periods).await?;
        }
        info!(unit = unit.name(), "setting up new run");
        unit.controls
            .begin_run_ex
            .trigger_with(BeginRunExFlags::BeginPaused)
            .await?;
        wait_for_paused(unit, self.timeout).await?;
        info!(unit = unit.name(), "setup complete");
        Ok(())
    }

    async fn start_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        self.current_period += 1;
        let period = self.current_period;
        info!(unit = unit.name(), period, "start counting");

        unit.period_num.set(period).await?;
        let timeout = self.timeout;
        unit.period_num
            .wait_for(|current| *current == period, Some(timeout))
            .await
            .map_err(|err| match err {
                DaeError::TransitionTimeout { .. } => DaeError::Configuration(format!(
                    "Period {} was not confirmed within {:?}; too many periods requested?",
                    period, timeout
                )),
                other => other,
            })?;

        info!(unit = unit.name(), period, "waiting for frame counters to be zero");
        unit.period
            .good_frames
            .wait_for(|frames| *frames == 0, Some(timeout))
            .await?;
        unit.period
            .raw_frames
            .wait_for(|frames| *frames == 0, Some(timeout))
            .await?;

        info!(unit = unit.name(), period, "resuming run");
        unit.controls.resume_run.trigger().await?;
        wait_for_counting(unit, timeout).await?;
        Ok(())
    }

    async fn stop_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(unit = unit.name(), period = self.current_period, "stop counting");
        unit.controls.pause_run.trigger().await?;
        wait_for_paused(unit, self.timeout).await?;
        Ok(())
    }

    async fn teardown(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        end_or_abort_run(unit, self.save_run).await
    }
}

/// Counts each point into its own run.
///
/// The number of the run actually counted into is latched while the run is
/// open, since the unit's run number moves on as soon as the run ends. It is
/// published only when runs are saved.
#[derive(Debug, Clone)]
pub struct RunPerPointController {
    save_run: bool,
    run_number: Observable<i64>,
    timeout: Duration,
}

impl RunPerPointController {
    /// Create a controller whose run number output is named
    /// `{prefix}-run_number`.
    pub fn new(prefix: &str, save_run: bool) -> Self {
        Self {
            save_run,
            run_number: Observable::new(format!("{}-run_number", prefix), 0)
                .with_description("Run counted into by the last point")
                .read_only(),
            timeout: TRANSITION_TIMEOUT,
        }
    }

    /// Override the bound on confirmation waits.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run number of the last point.
    pub fn run_number(&self) -> &Observable<i64> {
        &self.run_number
    }
}

impl Strategy for RunPerPointController {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        if self.save_run {
            vec![Arc::new(self.run_number.clone())]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl Controller for RunPerPointController {
    async fn start_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(unit = unit.name(), "start counting");
        unit.controls.begin_run.trigger().await?;
        wait_for_counting(unit, self.timeout).await?;

        let run_number = unit.current_or_next_run_number.get_value().await?;
        info!(unit = unit.name(), run_number, "saving current run number");
        self.run_number.publish(run_number);
        Ok(())
    }

    async fn stop_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        end_or_abort_run(unit, self.save_run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dae_driver_mock::{ErrorConfig, ErrorScenario, MockDae, MockDaeConfig};

    #[tokio::test]
    async fn test_setup_opens_paused_run() {
        let dae = MockDae::new(MockDaeConfig::default());
        let unit = dae.unit();
        let mut controller = PeriodPerPointController::new(true);

        controller.setup(&unit).await.unwrap();
        assert_eq!(unit.run_state.get(), RunState::Paused);
        assert_eq!(controller.current_period(), 0);
        assert_eq!(dae.event_log().events(), vec!["begin_run_ex".to_string()]);
    }

    #[tokio::test]
    async fn test_check_periods() {
        let dae = MockDae::new(MockDaeConfig {
            max_periods: 3,
            ..MockDaeConfig::default()
        });
        let unit = dae.unit();
        assert!(check_periods(&unit, 3).await.is_ok());
        assert!(check_periods(&unit, 4).await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_setup_checks_required_periods() {
        let dae = MockDae::new(MockDaeConfig {
            max_periods: 2,
            ..MockDaeConfig::default()
        });
        let unit = dae.unit();

        let mut controller = PeriodPerPointController::new(true).with_required_periods(3);
        let err = controller.setup(&unit).await.unwrap_err();
        assert!(err.to_string().contains("3 periods requested"));
        assert!(dae.event_log().events().is_empty());

        let mut controller = PeriodPerPointController::new(true).with_required_periods(2);
        controller.setup(&unit).await.unwrap();
        assert_eq!(unit.run_state.get(), RunState::Paused);
    }

    #[tokio::test]
    async fn test_teardown_respects_save_flag() {
        let dae = MockDae::new(MockDaeConfig::default());
        let unit = dae.unit();
        let mut controller = PeriodPerPointController::new(false);
        controller.setup(&unit).await.unwrap();
        controller.teardown(&unit).await.unwrap();
        assert!(dae.event_log().events().contains(&"abort_run".to_string()));

        let dae = MockDae::new(MockDaeConfig::default());
        let unit = dae.unit();
        let mut controller = PeriodPerPointController::new(true);
        controller.setup(&unit).await.unwrap();
        controller.teardown(&unit).await.unwrap();
        assert!(dae.event_log().events().contains(&"end_run".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_begin_times_out() {
        let dae = MockDae::with_errors(
            MockDaeConfig::default(),
            ErrorConfig::scenario(ErrorScenario::StuckTransition {
                operation: "begin_run_ex",
            }),
        );
        let unit = dae.unit();
        let mut controller =
            PeriodPerPointController::new(true).with_timeout(Duration::from_secs(2));

        let err = controller.setup(&unit).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(unit.run_state.get(), RunState::Beginning);
    }

    #[tokio::test]
    async fn test_run_per_point_latches_run_number() {
        let dae = MockDae::new(MockDaeConfig::default());
        let unit = dae.unit();
        let mut controller = RunPerPointController::new("dae-controller", true);

        controller.start_counting(&unit).await.unwrap();
        assert_eq!(controller.run_number().get(), 1000);
        controller.stop_counting(&unit).await.unwrap();
        assert_eq!(unit.current_or_next_run_number.get(), 1001);
        assert_eq!(controller.run_number().get(), 1000);

        controller.start_counting(&unit).await.unwrap();
        assert_eq!(controller.run_number().get(), 1001);
    }
}
