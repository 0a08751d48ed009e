//! Monitor normalisation repeated over several wavelength bands.

use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::limits::VARIANCE_ADDITION;
use dae_core::{AcquisitionUnit, Interval, Observable, Readable};
use std::sync::Arc;
use tracing::info;

use super::summing::SpectrumSummer;
use super::OutputPair;
use crate::strategies::{Reducer, Strategy};

/// Outputs of one wavelength band.
#[derive(Debug, Clone)]
pub struct WavelengthBand {
    det_counts: OutputPair,
    mon_counts: OutputPair,
    intensity: OutputPair,
}

impl WavelengthBand {
    fn new(prefix: &str, index: usize) -> Self {
        let name = |output: &str| format!("{}-band{}-{}", prefix, index, output);
        Self {
            det_counts: OutputPair::counts(name("det_counts")),
            mon_counts: OutputPair::counts(name("mon_counts")),
            intensity: OutputPair::intensity(name("intensity")),
        }
    }

    /// Summed detector counts in the band.
    pub fn det_counts(&self) -> &Observable<f64> {
        &self.det_counts.value
    }

    /// Summed detector counts uncertainty.
    pub fn det_counts_stddev(&self) -> &Observable<f64> {
        &self.det_counts.stddev
    }

    /// Summed monitor counts in the band.
    pub fn mon_counts(&self) -> &Observable<f64> {
        &self.mon_counts.value
    }

    /// Summed monitor counts uncertainty.
    pub fn mon_counts_stddev(&self) -> &Observable<f64> {
        &self.mon_counts.stddev
    }

    /// Normalised intensity in the band.
    pub fn intensity(&self) -> &Observable<f64> {
        &self.intensity.value
    }

    /// Normalised intensity uncertainty.
    pub fn intensity_stddev(&self) -> &Observable<f64> {
        &self.intensity.stddev
    }

    fn readables(&self) -> [Arc<dyn Readable>; 6] {
        [
            self.det_counts.value_readable(),
            self.det_counts.stddev_readable(),
            self.mon_counts.value_readable(),
            self.mon_counts.stddev_readable(),
            self.intensity.value_readable(),
            self.intensity.stddev_readable(),
        ]
    }
}

/// Normalises detector counts by monitor counts separately in each band.
///
/// Bands are created once at construction, one per summer, and indexed by
/// position.
#[derive(Debug, Clone)]
pub struct WavelengthBoundedNormalizer {
    detectors: Vec<usize>,
    monitors: Vec<usize>,
    summers: Vec<SpectrumSummer>,
    bands: Vec<WavelengthBand>,
}

impl WavelengthBoundedNormalizer {
    /// One band per wavelength interval, converting time of flight over
    /// `flight_path_m`.
    pub fn new(
        prefix: &str,
        detectors: Vec<usize>,
        monitors: Vec<usize>,
        intervals: &[Interval],
        flight_path_m: f64,
    ) -> DaeResult<Self> {
        let summers = intervals
            .iter()
            .map(|&bounds| SpectrumSummer::wavelength_bounded(bounds, flight_path_m))
            .collect::<DaeResult<Vec<_>>>()?;
        Ok(Self::with_summers(prefix, detectors, monitors, summers))
    }

    /// One band per summer.
    pub fn with_summers(
        prefix: &str,
        detectors: Vec<usize>,
        monitors: Vec<usize>,
        summers: Vec<SpectrumSummer>,
    ) -> Self {
        let bands = (0..summers.len())
            .map(|index| WavelengthBand::new(prefix, index))
            .collect();
        Self {
            detectors,
            monitors,
            summers,
            bands,
        }
    }

    /// Band outputs, in interval order.
    pub fn bands(&self) -> &[WavelengthBand] {
        &self.bands
    }
}

impl Strategy for WavelengthBoundedNormalizer {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        self.bands.iter().flat_map(WavelengthBand::readables).collect()
    }
}

#[async_trait]
impl Reducer for WavelengthBoundedNormalizer {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(bands = self.bands.len(), "starting normalisation");

        for (index, (summer, band)) in self.summers.iter().zip(&self.bands).enumerate() {
            let (det_counts, mon_counts) = futures::try_join!(
                summer.sum(unit, &self.detectors),
                summer.sum(unit, &self.monitors),
            )?;

            if mon_counts.value == 0.0 {
                return Err(DaeError::Configuration(format!(
                    "Cannot normalise; got zero monitor counts in wavelength band {}. \
                     Check beamline configuration.",
                    index
                )));
            }

            let det_counts = det_counts.with_extra_variance(VARIANCE_ADDITION);
            let intensity = det_counts.div(&mon_counts)?;

            band.det_counts.publish(&det_counts);
            band.mon_counts.publish(&mon_counts);
            band.intensity.publish(&intensity);
        }

        info!(bands = self.bands.len(), "normalisation complete");
        Ok(())
    }
}
