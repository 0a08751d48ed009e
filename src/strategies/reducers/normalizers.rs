//! Normalisation of summed detector counts.

use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::limits::VARIANCE_ADDITION;
use dae_core::{AcquisitionUnit, Channel, MeasuredQuantity, Observable, Readable};
use std::sync::Arc;
use tracing::info;

use super::summing::SpectrumSummer;
use super::OutputPair;
use crate::strategies::{Reducer, Strategy};

/// Frame counter used as the denominator of a [`ScalarNormalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarDenominator {
    /// Good frames of the current period.
    PeriodGoodFrames,
    /// Good frames of the whole run.
    GoodFrames,
}

impl ScalarDenominator {
    /// The channel read as denominator.
    pub fn channel<'a>(&self, unit: &'a AcquisitionUnit) -> &'a Channel<i64> {
        match self {
            Self::PeriodGoodFrames => &unit.period.good_frames,
            Self::GoodFrames => &unit.good_frames,
        }
    }
}

/// Sums detector spectra and divides by an exact frame count.
///
/// `intensity = det_counts / frames`, with
/// `intensity_stddev = sqrt(var(det_counts) + VARIANCE_ADDITION) / frames`.
#[derive(Debug, Clone)]
pub struct ScalarNormalizer {
    detectors: Vec<usize>,
    summer: SpectrumSummer,
    denominator: ScalarDenominator,
    det_counts: OutputPair,
    intensity: OutputPair,
}

impl ScalarNormalizer {
    /// Normalise by any supported denominator.
    pub fn new(prefix: &str, detectors: Vec<usize>, denominator: ScalarDenominator) -> Self {
        Self {
            detectors,
            summer: SpectrumSummer::Whole,
            denominator,
            det_counts: OutputPair::counts(format!("{}-det_counts", prefix)),
            intensity: OutputPair::intensity(format!("{}-intensity", prefix)),
        }
    }

    /// Normalise by good frames of the current period.
    pub fn period_good_frames(prefix: &str, detectors: Vec<usize>) -> Self {
        Self::new(prefix, detectors, ScalarDenominator::PeriodGoodFrames)
    }

    /// Normalise by good frames of the whole run.
    pub fn good_frames(prefix: &str, detectors: Vec<usize>) -> Self {
        Self::new(prefix, detectors, ScalarDenominator::GoodFrames)
    }

    /// Sum detectors with `summer` instead of over every time channel.
    pub fn with_summer(mut self, summer: SpectrumSummer) -> Self {
        self.summer = summer;
        self
    }

    /// Summed detector counts output.
    pub fn det_counts(&self) -> &Observable<f64> {
        &self.det_counts.value
    }

    /// Normalised intensity output.
    pub fn intensity(&self) -> &Observable<f64> {
        &self.intensity.value
    }

    /// Normalised intensity uncertainty output.
    pub fn intensity_stddev(&self) -> &Observable<f64> {
        &self.intensity.stddev
    }
}

impl Strategy for ScalarNormalizer {
    fn additional_outputs(&self, unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![
            self.det_counts.value_readable(),
            self.intensity.value_readable(),
            Arc::new(self.denominator.channel(unit).clone()),
            self.det_counts.stddev_readable(),
            self.intensity.stddev_readable(),
        ]
    }
}

#[async_trait]
impl Reducer for ScalarNormalizer {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(detectors = ?self.detectors, denominator = ?self.denominator, "starting normalisation");
        let channel = self.denominator.channel(unit);
        let (det_counts, frames) =
            futures::try_join!(self.summer.sum(unit, &self.detectors), channel.get_value())?;

        if frames == 0 {
            return Err(DaeError::Configuration(format!(
                "Cannot normalise; '{}' is zero. Check beamline configuration.",
                channel.name()
            )));
        }

        let det_counts = det_counts.with_extra_variance(VARIANCE_ADDITION);
        let intensity = det_counts.div(&MeasuredQuantity::exact(frames as f64))?;

        self.det_counts.publish(&det_counts);
        self.intensity.publish(&intensity);
        info!(intensity = intensity.value, stddev = intensity.stddev(), "normalisation complete");
        Ok(())
    }
}

/// Sums detector and monitor spectra and divides one by the other.
///
/// Both sums carry Poisson variance; the ratio's variance is propagated
/// analytically.
#[derive(Debug, Clone)]
pub struct MonitorNormalizer {
    detectors: Vec<usize>,
    monitors: Vec<usize>,
    detector_summer: SpectrumSummer,
    monitor_summer: SpectrumSummer,
    det_counts: OutputPair,
    mon_counts: OutputPair,
    intensity: OutputPair,
}

impl MonitorNormalizer {
    /// Normalise summed `detectors` by summed `monitors`, both over every
    /// time channel.
    pub fn new(prefix: &str, detectors: Vec<usize>, monitors: Vec<usize>) -> Self {
        Self {
            detectors,
            monitors,
            detector_summer: SpectrumSummer::Whole,
            monitor_summer: SpectrumSummer::Whole,
            det_counts: OutputPair::counts(format!("{}-det_counts", prefix)),
            mon_counts: OutputPair::counts(format!("{}-mon_counts", prefix)),
            intensity: OutputPair::intensity(format!("{}-intensity", prefix)),
        }
    }

    /// Use separate summing rules for detectors and monitors.
    pub fn with_summers(mut self, detector: SpectrumSummer, monitor: SpectrumSummer) -> Self {
        self.detector_summer = detector;
        self.monitor_summer = monitor;
        self
    }

    /// Summed detector counts output.
    pub fn det_counts(&self) -> &Observable<f64> {
        &self.det_counts.value
    }

    /// Summed detector counts uncertainty output.
    pub fn det_counts_stddev(&self) -> &Observable<f64> {
        &self.det_counts.stddev
    }

    /// Summed monitor counts output.
    pub fn mon_counts(&self) -> &Observable<f64> {
        &self.mon_counts.value
    }

    /// Summed monitor counts uncertainty output.
    pub fn mon_counts_stddev(&self) -> &Observable<f64> {
        &self.mon_counts.stddev
    }

    /// Normalised intensity output.
    pub fn intensity(&self) -> &Observable<f64> {
        &self.intensity.value
    }

    /// Normalised intensity uncertainty output.
    pub fn intensity_stddev(&self) -> &Observable<f64> {
        &self.intensity.stddev
    }
}

impl Strategy for MonitorNormalizer {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![
            self.det_counts.value_readable(),
            self.mon_counts.value_readable(),
            self.intensity.value_readable(),
            self.det_counts.stddev_readable(),
            self.mon_counts.stddev_readable(),
            self.intensity.stddev_readable(),
        ]
    }
}

#[async_trait]
impl Reducer for MonitorNormalizer {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(detectors = ?self.detectors, monitors = ?self.monitors, "starting normalisation");
        let (det_counts, mon_counts) = futures::try_join!(
            self.detector_summer.sum(unit, &self.detectors),
            self.monitor_summer.sum(unit, &self.monitors),
        )?;

        if mon_counts.value == 0.0 {
            return Err(DaeError::Configuration(
                "Cannot normalise; got zero monitor counts. Check beamline configuration.".into(),
            ));
        }

        let det_counts = det_counts.with_extra_variance(VARIANCE_ADDITION);
        let intensity = det_counts.div(&mon_counts)?;

        self.det_counts.publish(&det_counts);
        self.mon_counts.publish(&mon_counts);
        self.intensity.publish(&intensity);
        info!(intensity = intensity.value, stddev = intensity.stddev(), "normalisation complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::unit_with_spectra;
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[tokio::test]
    async fn test_scalar_normalisation() {
        let unit = unit_with_spectra(
            vec![0.0, 1.0, 2.0],
            &[(1, vec![100.0, 200.0]), (2, vec![50.0, 50.0])],
        );
        unit.period.good_frames.publish(40);

        let mut reducer = ScalarNormalizer::period_good_frames("dae-reducer", vec![1, 2]);
        reducer.reduce_data(&unit).await.unwrap();

        assert_eq!(reducer.det_counts().get(), 400.0);
        assert!(close(reducer.intensity().get(), 10.0));
        let expected_stddev = (400.0 + VARIANCE_ADDITION).sqrt() / 40.0;
        assert!(close(reducer.intensity_stddev().get(), expected_stddev));
    }

    #[tokio::test]
    async fn test_scalar_zero_denominator_leaves_outputs() {
        let unit = unit_with_spectra(vec![0.0, 1.0], &[(1, vec![100.0])]);
        unit.good_frames.publish(0);

        let mut reducer = ScalarNormalizer::good_frames("dae-reducer", vec![1]);
        let err = reducer.reduce_data(&unit).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(reducer.det_counts().get(), 0.0);
        assert_eq!(reducer.intensity().get(), 0.0);
    }

    #[test]
    fn test_scalar_outputs_include_denominator() {
        let unit = unit_with_spectra(vec![0.0, 1.0], &[]);
        let names: Vec<String> = ScalarNormalizer::good_frames("dae-reducer", vec![1])
            .additional_outputs(&unit)
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "dae-reducer-det_counts",
                "dae-reducer-intensity",
                "dae-good_frames",
                "dae-reducer-det_counts_stddev",
                "dae-reducer-intensity_stddev",
            ]
        );
    }

    #[tokio::test]
    async fn test_monitor_normalisation() {
        let unit = unit_with_spectra(
            vec![0.0, 1.0, 2.0],
            &[
                (1, vec![1000.0, 2000.0]),
                (2, vec![1500.0, 1500.0]),
                (3, vec![10000.0, 5000.0]),
            ],
        );
        let mut reducer = MonitorNormalizer::new("dae-reducer", vec![1, 2], vec![3]);
        reducer.reduce_data(&unit).await.unwrap();

        assert_eq!(reducer.det_counts().get(), 6000.0);
        assert_eq!(reducer.mon_counts().get(), 15000.0);
        assert!(close(reducer.intensity().get(), 0.4));
        assert!(close(reducer.det_counts_stddev().get(), 6000.5_f64.sqrt()));
        assert!(close(reducer.mon_counts_stddev().get(), 15000.0_f64.sqrt()));
        let expected = ((6000.5 + 6000.0_f64.powi(2) * 15000.0 / 15000.0_f64.powi(2))
            / 15000.0_f64.powi(2))
        .sqrt();
        assert!(close(reducer.intensity_stddev().get(), expected));
        assert!((reducer.intensity_stddev().get() - 0.006110).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_monitor_counts_leaves_outputs() {
        let unit = unit_with_spectra(vec![0.0, 1.0], &[(1, vec![10.0]), (2, vec![0.0])]);
        let mut reducer = MonitorNormalizer::new("dae-reducer", vec![1], vec![2]);
        let err = reducer.reduce_data(&unit).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(reducer.det_counts().get(), 0.0);
        assert_eq!(reducer.mon_counts().get(), 0.0);
        assert_eq!(reducer.intensity().get(), 0.0);
    }

    #[test]
    fn test_intensity_outputs_carry_precision() {
        let reducer = MonitorNormalizer::new("dae-reducer", vec![1], vec![2]);
        assert_eq!(reducer.intensity().metadata().precision, Some(6));
        assert_eq!(reducer.intensity_stddev().metadata().precision, Some(6));
        assert_eq!(reducer.det_counts().metadata().precision, None);
    }
}
