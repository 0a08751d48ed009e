//! Polarised counting against the mock DAE and a mock spin flipper.

use dae_driver_mock::{
    ErrorConfig, ErrorScenario, MockActuator, MockDae, MockDaeConfig, TimingConfig,
};
use rust_dae::dae_core::error::DaeError;
use rust_dae::dae_core::spectrum::tof_to_wavelength;
use rust_dae::{polarising_dae, DaeConfig, OrchestratorState};
use std::sync::Arc;
use std::time::Duration;

const BEAM_TICK: Duration = Duration::from_millis(100);

fn tof_dae() -> MockDae {
    MockDae::new(MockDaeConfig {
        tof_edges_us: vec![10000.0, 15000.0, 20000.0],
        ..MockDaeConfig::default()
    })
}

fn config(intervals: Vec<[f64; 2]>) -> DaeConfig {
    let mut config = DaeConfig::default();
    config.acquisition.frames = 50;
    config.acquisition.transition_timeout_ms = 1000;
    config.polarisation.intervals = intervals;
    config
}

#[tokio::test(start_paused = true)]
async fn test_polarisation_from_two_periods() {
    let dae = tof_dae();
    // "up" counts into period 1, "down" into period 2
    dae.set_spectrum(1, 1, vec![150.0, 150.0]).unwrap();
    dae.set_spectrum(2, 1, vec![500.0, 500.0]).unwrap();
    dae.set_spectrum(1, 2, vec![50.0, 50.0]).unwrap();
    dae.set_spectrum(2, 2, vec![500.0, 500.0]).unwrap();
    let _beam = dae.start_beam(10, BEAM_TICK);

    let flipper = Arc::new(MockActuator::new("flipper"));
    let mut orchestrator =
        polarising_dae(dae.unit(), flipper.clone(), &config(vec![[0.0, 10.0]])).unwrap();
    orchestrator.stage().await.unwrap();
    orchestrator.trigger().await.unwrap();

    let up = &orchestrator.reducer_up().bands()[0];
    let down = &orchestrator.reducer_down().bands()[0];
    assert!((up.intensity().get() - 0.3).abs() < 1e-12);
    assert!((down.intensity().get() - 0.1).abs() < 1e-12);

    let band = &orchestrator.reducer().bands()[0];
    assert!((band.polarisation().get() - 0.5).abs() < 1e-12);
    assert!((band.polarisation_ratio().get() - 3.0).abs() < 1e-12);
    assert!(band.polarisation_stddev().get() > 0.0);

    assert_eq!(flipper.history(), vec![0.0, 1.0]);
    assert_eq!(dae.period_writes(), vec![1, 2]);
    orchestrator.unstage().await.unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Unstaged);
}

#[tokio::test(start_paused = true)]
async fn test_bands_split_time_of_flight() {
    let dae = tof_dae();
    for period in 1..=2 {
        dae.set_spectrum(1, period, vec![100.0, 40.0]).unwrap();
        dae.set_spectrum(2, period, vec![200.0, 200.0]).unwrap();
    }
    let _beam = dae.start_beam(10, BEAM_TICK);

    // Bin edges sit at 3.956, 5.934 and 7.912 Å over 10 m
    let middle = tof_to_wavelength(15000.0, 10.0);
    assert!((middle - 5.934).abs() < 1e-3);

    let flipper = Arc::new(MockActuator::new("flipper"));
    let mut orchestrator = polarising_dae(
        dae.unit(),
        flipper,
        &config(vec![[0.0, middle], [middle, 10.0]]),
    )
    .unwrap();
    orchestrator.stage().await.unwrap();
    orchestrator.trigger().await.unwrap();

    let bands = orchestrator.reducer_up().bands();
    assert!((bands[0].det_counts().get() - 100.0).abs() < 1e-9);
    assert!((bands[1].det_counts().get() - 40.0).abs() < 1e-9);
    assert!((bands[0].intensity().get() - 0.5).abs() < 1e-9);
    assert!((bands[1].intensity().get() - 0.2).abs() < 1e-9);

    // Identical windows carry no polarisation
    for band in orchestrator.reducer().bands() {
        assert!(band.polarisation().get().abs() < 1e-12);
        assert!((band.polarisation_ratio().get() - 1.0).abs() < 1e-12);
    }
}

#[tokio::test(start_paused = true)]
async fn test_flipper_moves_between_windows() {
    let dae = tof_dae();
    for period in 1..=4 {
        dae.set_spectrum(1, period, vec![5.0, 5.0]).unwrap();
        dae.set_spectrum(2, period, vec![10.0, 10.0]).unwrap();
    }
    let _beam = dae.start_beam(10, BEAM_TICK);

    let flipper = Arc::new(
        MockActuator::new("flipper")
            .with_timing(TimingConfig::flipper())
            .with_event_log(dae.event_log()),
    );
    let mut orchestrator = polarising_dae(dae.unit(), flipper, &config(vec![[0.0, 10.0]])).unwrap();
    orchestrator.stage().await.unwrap();
    orchestrator.trigger().await.unwrap();
    orchestrator.trigger().await.unwrap();
    orchestrator.unstage().await.unwrap();

    let window = ["period_num", "resume_run", "pause_run"];
    let expected: Vec<String> = std::iter::once("begin_run_ex".to_string())
        .chain((1..=4).flat_map(|period| {
            let flipper = if period % 2 == 1 { "flipper=0" } else { "flipper=1" };
            std::iter::once(flipper.to_string()).chain(window.iter().map(move |event| {
                if *event == "period_num" {
                    format!("period_num={}", period)
                } else {
                    event.to_string()
                }
            }))
        }))
        .chain(std::iter::once("end_run".to_string()))
        .collect();
    assert_eq!(dae.event_log().events(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_zero_intensity_fails_point() {
    let dae = tof_dae();
    dae.set_spectrum(1, 1, vec![10.0, 10.0]).unwrap();
    dae.set_spectrum(2, 1, vec![100.0, 100.0]).unwrap();
    dae.set_spectrum(2, 2, vec![100.0, 100.0]).unwrap();
    let _beam = dae.start_beam(10, BEAM_TICK);

    let flipper = Arc::new(MockActuator::new("flipper"));
    let mut orchestrator =
        polarising_dae(dae.unit(), flipper, &config(vec![[0.0, 10.0]])).unwrap();
    orchestrator.stage().await.unwrap();

    let err = orchestrator.trigger().await.unwrap_err();
    assert!(err.is_configuration(), "unexpected error: {err}");
    assert_eq!(orchestrator.reducer().bands()[0].polarisation().get(), 0.0);

    // Both windows were counted and paused before the reduction failed
    assert_eq!(orchestrator.state(), OrchestratorState::Staged);
    assert_eq!(dae.period_writes(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_flipper_fault_skips_second_window() {
    let dae = tof_dae();
    dae.set_spectrum(1, 1, vec![10.0, 10.0]).unwrap();
    dae.set_spectrum(2, 1, vec![100.0, 100.0]).unwrap();
    let _beam = dae.start_beam(10, BEAM_TICK);

    // The first move succeeds, the move to the second state faults
    let flipper = Arc::new(
        MockActuator::new("flipper")
            .with_errors(ErrorConfig::scenario(ErrorScenario::FailAfterN {
                operation: "move",
                count: 1,
            }))
            .with_event_log(dae.event_log()),
    );
    let mut orchestrator =
        polarising_dae(dae.unit(), flipper.clone(), &config(vec![[0.0, 10.0]])).unwrap();
    orchestrator.stage().await.unwrap();

    let err = orchestrator.trigger().await.unwrap_err();
    assert!(matches!(err, DaeError::Hardware(_)), "unexpected error: {err}");
    assert_eq!(
        dae.event_log().events(),
        vec!["begin_run_ex", "flipper=0", "period_num=1", "resume_run", "pause_run"]
    );
    assert_eq!(flipper.history(), vec![0.0]);
    assert_eq!(dae.period_writes(), vec![1]);

    assert!((orchestrator.reducer_up().bands()[0].intensity().get() - 0.1).abs() < 1e-12);
    assert_eq!(orchestrator.reducer_down().bands()[0].intensity().get(), 0.0);
    assert_eq!(orchestrator.state(), OrchestratorState::Triggering);
    orchestrator.unstage().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stage_needs_two_periods_per_point() {
    let dae = MockDae::new(MockDaeConfig {
        max_periods: 3,
        ..MockDaeConfig::default()
    });
    let mut config = config(vec![[0.0, 10.0]]);
    config.acquisition.points = Some(2);

    let flipper = Arc::new(MockActuator::new("flipper"));
    let mut orchestrator = polarising_dae(dae.unit(), flipper, &config).unwrap();
    let err = orchestrator.stage().await.unwrap_err();
    assert!(err.to_string().contains("4 periods requested"), "{err}");
    assert_eq!(orchestrator.state(), OrchestratorState::Unstaged);
}
