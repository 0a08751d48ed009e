//! Ready-made orchestrators for the usual counting modes.
//!
//! Counting strategies follow [`AcquisitionConfig::periods`]:
//!
//! | `periods` | Controller | Waiter |
//! |---|---|---|
//! | `true` | [`PeriodPerPointController`] | good frames in the current period |
//! | `false` | [`RunPerPointController`] | good frames in the run |
//!
//! With `acquisition.points` set, period-per-point staging first checks that
//! the unit has a period for every counting window of the scan.
//!
//! Outputs are named after the unit: `{unit}-reducer-intensity`,
//! `{unit}-reducer_up-band0-intensity`, `{unit}-controller-run_number`, ...

use dae_core::error::DaeResult;
use dae_core::{AcquisitionUnit, Movable};
use std::sync::Arc;
use tracing::info;

use crate::config::{AcquisitionConfig, DaeConfig};
use crate::orchestrator::Orchestrator;
use crate::polarising::PolarisingOrchestrator;
use crate::strategies::{
    Controller, MonitorNormalizer, PeriodPerPointController, PolarisingReducer,
    RunPerPointController, SimpleWaiter, Waiter, WavelengthBoundedNormalizer,
};

/// Monitor-normalising orchestrator with strategies picked at runtime.
pub type MonitorNormalisingDae = Orchestrator<Box<dyn Controller>, Box<dyn Waiter>, MonitorNormalizer>;

/// Polarising orchestrator with strategies picked at runtime.
pub type PolarisingDae = PolarisingOrchestrator<
    Box<dyn Controller>,
    Box<dyn Waiter>,
    WavelengthBoundedNormalizer,
    PolarisingReducer,
>;

/// `windows_per_point` is the number of periods each point counts into.
fn counting_strategies(
    unit: &AcquisitionUnit,
    acquisition: &AcquisitionConfig,
    windows_per_point: usize,
) -> (Box<dyn Controller>, Box<dyn Waiter>) {
    let timeout = acquisition.transition_timeout();
    if acquisition.periods {
        let mut controller =
            PeriodPerPointController::new(acquisition.save_run).with_timeout(timeout);
        if let Some(points) = acquisition.points {
            controller = controller.with_required_periods(points * windows_per_point);
        }
        (
            Box::new(controller),
            Box::new(SimpleWaiter::period_good_frames(acquisition.frames)),
        )
    } else {
        let prefix = format!("{}-controller", unit.name());
        (
            Box::new(
                RunPerPointController::new(&prefix, acquisition.save_run).with_timeout(timeout),
            ),
            Box::new(SimpleWaiter::good_frames(acquisition.frames)),
        )
    }
}

/// Sum detectors, normalise by summed monitors, one point per period or run.
pub fn monitor_normalising_dae(
    unit: AcquisitionUnit,
    config: &DaeConfig,
) -> DaeResult<MonitorNormalisingDae> {
    let acquisition = &config.acquisition;
    acquisition.validate()?;

    let (controller, waiter) = counting_strategies(&unit, acquisition, 1);
    let reducer = MonitorNormalizer::new(
        &format!("{}-reducer", unit.name()),
        acquisition.detector_spectra.clone(),
        acquisition.monitor_spectra.clone(),
    );

    info!(
        unit = unit.name(),
        periods = acquisition.periods,
        save_run = acquisition.save_run,
        frames = acquisition.frames,
        "created monitor-normalising orchestrator"
    );
    Ok(Orchestrator::new(
        unit.name().to_string(),
        unit,
        controller,
        waiter,
        reducer,
    ))
}

/// Count every point in both actuator states and publish per-band
/// polarisation.
pub fn polarising_dae(
    unit: AcquisitionUnit,
    actuator: Arc<dyn Movable>,
    config: &DaeConfig,
) -> DaeResult<PolarisingDae> {
    let acquisition = &config.acquisition;
    let polarisation = &config.polarisation;
    acquisition.validate()?;
    polarisation.validate()?;

    let intervals = polarisation.wavelength_intervals()?;
    let (controller, waiter) = counting_strategies(&unit, acquisition, 2);
    let spin_state = |suffix: &str| {
        WavelengthBoundedNormalizer::new(
            &format!("{}-{}", unit.name(), suffix),
            acquisition.detector_spectra.clone(),
            acquisition.monitor_spectra.clone(),
            &intervals,
            polarisation.flight_path_m,
        )
    };
    let reducer_up = spin_state("reducer_up")?;
    let reducer_down = spin_state("reducer_down")?;
    let reducer = PolarisingReducer::new(
        &format!("{}-reducer", unit.name()),
        &intervals,
        &reducer_up,
        &reducer_down,
    )?;

    info!(
        unit = unit.name(),
        actuator = %actuator.name(),
        bands = intervals.len(),
        flight_path_m = polarisation.flight_path_m,
        "created polarising orchestrator"
    );
    Ok(PolarisingOrchestrator::new(
        unit.name().to_string(),
        unit,
        controller,
        waiter,
        reducer_up,
        reducer_down,
        reducer,
        actuator,
        polarisation.flipper_states,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dae_driver_mock::{MockActuator, MockDae, MockDaeConfig};

    fn names(readables: &[Arc<dyn dae_core::Readable>]) -> Vec<String> {
        readables.iter().map(|r| r.name()).collect()
    }

    #[test]
    fn test_period_mode_outputs() {
        let dae = MockDae::new(MockDaeConfig::default());
        let orchestrator = monitor_normalising_dae(dae.unit(), &DaeConfig::default()).unwrap();
        let names = names(orchestrator.readables());
        assert_eq!(names[0], "dae-period_num");
        assert_eq!(names[1], "dae-period-good_frames");
        assert!(names.contains(&"dae-reducer-intensity_stddev".to_string()));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_run_mode_outputs() {
        let dae = MockDae::new(MockDaeConfig::default());
        let mut config = DaeConfig::default();
        config.acquisition.periods = false;
        let orchestrator = monitor_normalising_dae(dae.unit(), &config).unwrap();
        let run_names = names(orchestrator.readables());
        assert_eq!(run_names[0], "dae-controller-run_number");
        assert_eq!(run_names[1], "dae-good_frames");

        config.acquisition.save_run = false;
        let orchestrator = monitor_normalising_dae(dae.unit(), &config).unwrap();
        assert_eq!(names(orchestrator.readables())[0], "dae-good_frames");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dae = MockDae::new(MockDaeConfig::default());
        let mut config = DaeConfig::default();
        config.acquisition.detector_spectra.clear();
        assert!(monitor_normalising_dae(dae.unit(), &config).is_err());

        let mut config = DaeConfig::default();
        config.polarisation.intervals = vec![[2.0, 2.0]];
        let flipper = Arc::new(MockActuator::new("flipper"));
        assert!(polarising_dae(dae.unit(), flipper, &config).is_err());
    }

    #[test]
    fn test_polarising_outputs() {
        let dae = MockDae::new(MockDaeConfig::default());
        let mut config = DaeConfig::default();
        config.polarisation.intervals = vec![[1.0, 2.0], [2.0, 3.0]];
        let flipper = Arc::new(MockActuator::new("flipper"));
        let orchestrator = polarising_dae(dae.unit(), flipper, &config).unwrap();

        let names = names(orchestrator.readables());
        // period_num + period good frames + 2 × 2 bands × 6 + 2 bands × 4
        assert_eq!(names.len(), 2 + 24 + 8);
        assert!(names.contains(&"dae-reducer_up-band1-intensity".to_string()));
        assert!(names.contains(&"dae-reducer_down-band0-mon_counts_stddev".to_string()));
        assert!(names.contains(&"dae-reducer-band1-polarisation_ratio_stddev".to_string()));
        assert_eq!(orchestrator.actuator_states(), [0.0, 1.0]);
    }
}
