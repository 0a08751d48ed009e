//! Polarisation from a pair of spin-state reductions.

use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::{polarisation, AcquisitionUnit, Interval, MeasuredQuantity, Observable, Readable, Unit};
use std::sync::Arc;
use tracing::info;

use super::wavelength::{WavelengthBand, WavelengthBoundedNormalizer};
use super::OutputPair;
use crate::strategies::{Reducer, Strategy};

/// Polarisation outputs of one wavelength band.
#[derive(Debug, Clone)]
pub struct PolarisedBand {
    polarisation: OutputPair,
    ratio: OutputPair,
}

impl PolarisedBand {
    fn new(prefix: &str, index: usize) -> Self {
        let name = |output: &str| format!("{}-band{}-{}", prefix, index, output);
        Self {
            polarisation: OutputPair::intensity(name("polarisation")),
            ratio: OutputPair::intensity(name("polarisation_ratio")),
        }
    }

    /// `(I_up - I_down) / (I_up + I_down)`.
    pub fn polarisation(&self) -> &Observable<f64> {
        &self.polarisation.value
    }

    /// Polarisation uncertainty.
    pub fn polarisation_stddev(&self) -> &Observable<f64> {
        &self.polarisation.stddev
    }

    /// `I_up / I_down`.
    pub fn polarisation_ratio(&self) -> &Observable<f64> {
        &self.ratio.value
    }

    /// Ratio uncertainty.
    pub fn polarisation_ratio_stddev(&self) -> &Observable<f64> {
        &self.ratio.stddev
    }
}

/// Intensity outputs read back from one spin-state band.
#[derive(Debug, Clone)]
struct BandIntensity {
    value: Observable<f64>,
    stddev: Observable<f64>,
}

impl BandIntensity {
    fn of(band: &WavelengthBand) -> Self {
        Self {
            value: band.intensity().clone(),
            stddev: band.intensity_stddev().clone(),
        }
    }

    fn quantity(&self) -> MeasuredQuantity {
        MeasuredQuantity::from_stddev(self.value.get(), self.stddev.get(), Unit::Dimensionless)
    }
}

/// Combines the band intensities of an "up" and a "down" reduction.
///
/// Must run after both spin-state reducers have reduced the current point.
#[derive(Debug, Clone)]
pub struct PolarisingReducer {
    intervals: Vec<Interval>,
    up: Vec<BandIntensity>,
    down: Vec<BandIntensity>,
    bands: Vec<PolarisedBand>,
}

impl PolarisingReducer {
    /// Combine `reducer_up` and `reducer_down`, which must both have one band
    /// per interval.
    pub fn new(
        prefix: &str,
        intervals: &[Interval],
        reducer_up: &WavelengthBoundedNormalizer,
        reducer_down: &WavelengthBoundedNormalizer,
    ) -> DaeResult<Self> {
        let (n_up, n_down) = (reducer_up.bands().len(), reducer_down.bands().len());
        if n_up != n_down {
            return Err(DaeError::Configuration(format!(
                "Mismatched number of wavelength bands: {} up, {} down",
                n_up, n_down
            )));
        }
        if n_up != intervals.len() {
            return Err(DaeError::Configuration(format!(
                "{} wavelength bands for {} intervals",
                n_up,
                intervals.len()
            )));
        }

        Ok(Self {
            intervals: intervals.to_vec(),
            up: reducer_up.bands().iter().map(BandIntensity::of).collect(),
            down: reducer_down.bands().iter().map(BandIntensity::of).collect(),
            bands: (0..intervals.len())
                .map(|index| PolarisedBand::new(prefix, index))
                .collect(),
        })
    }

    /// Band outputs, in interval order.
    pub fn bands(&self) -> &[PolarisedBand] {
        &self.bands
    }

    /// Wavelength intervals, one per band.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }
}

impl Strategy for PolarisingReducer {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        self.bands
            .iter()
            .flat_map(|band| {
                [
                    band.polarisation.value_readable(),
                    band.polarisation.stddev_readable(),
                    band.ratio.value_readable(),
                    band.ratio.stddev_readable(),
                ]
            })
            .collect()
    }
}

#[async_trait]
impl Reducer for PolarisingReducer {
    async fn reduce_data(&mut self, _unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(bands = self.bands.len(), "starting polarisation");

        for (index, band) in self.bands.iter().enumerate() {
            let up = self.up[index].quantity();
            let down = self.down[index].quantity();
            if up.value == 0.0 || down.value == 0.0 {
                return Err(DaeError::Configuration(format!(
                    "Cannot calculate polarisation; zero intensity in band {} ({})",
                    index, self.intervals[index]
                )));
            }

            let pol = polarisation(&up, &down)?;
            let ratio = up.div(&down)?;
            band.polarisation.publish(&pol);
            band.ratio.publish(&ratio);
            info!(band = index, polarisation = pol.value, ratio = ratio.value, "band polarised");
        }
        Ok(())
    }
}
