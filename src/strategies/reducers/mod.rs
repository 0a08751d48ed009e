//! Reducers: published quantities computed from raw counts.
//!
//! | Reducer | Outputs |
//! |---|---|
//! | [`ScalarNormalizer`] | `det_counts`, `intensity` and their stddevs, plus the denominator channel |
//! | [`MonitorNormalizer`] | `det_counts`, `mon_counts`, `intensity` and their stddevs |
//! | [`WavelengthBoundedNormalizer`] | the same six values per wavelength band |
//! | [`PolarisingReducer`] | `polarisation`, `polarisation_ratio` and their stddevs per band |
//! | [`PeriodSpecIntegralsReducer`] | raw `det_integrals` and `mon_integrals` |
//! | [`DSpacingMappingReducer`] | `dspacing`, detector counts summed per d-spacing bin |
//!
//! Output observables are created once at construction, named
//! `{prefix}-{output}`, and updated in place by every reduction.
//! [`VARIANCE_ADDITION`](dae_core::limits::VARIANCE_ADDITION) is added to
//! summed detector variances before dividing.

use dae_core::limits::INTENSITY_PRECISION;
use dae_core::{MeasuredQuantity, Observable, Readable};
use std::sync::Arc;

mod dspacing;
mod integrals;
mod normalizers;
mod polarisation;
mod summing;
mod wavelength;

pub use dspacing::DSpacingMappingReducer;
pub use integrals::PeriodSpecIntegralsReducer;
pub use normalizers::{MonitorNormalizer, ScalarDenominator, ScalarNormalizer};
pub use polarisation::{PolarisedBand, PolarisingReducer};
pub use summing::SpectrumSummer;
pub use wavelength::{WavelengthBand, WavelengthBoundedNormalizer};

/// A published value and its standard deviation.
#[derive(Debug, Clone)]
pub(crate) struct OutputPair {
    pub(crate) value: Observable<f64>,
    pub(crate) stddev: Observable<f64>,
}

impl OutputPair {
    fn new(name: String, precision: Option<usize>) -> Self {
        let stddev_name = format!("{}_stddev", name);
        let mut value = Observable::new(name, 0.0).read_only();
        let mut stddev = Observable::new(stddev_name, 0.0).read_only();
        if let Some(precision) = precision {
            value = value.with_precision(precision);
            stddev = stddev.with_precision(precision);
        }
        Self { value, stddev }
    }

    /// Counts-like output with default precision.
    pub(crate) fn counts(name: String) -> Self {
        Self::new(name, None)
    }

    /// Intensity-like output with [`INTENSITY_PRECISION`].
    pub(crate) fn intensity(name: String) -> Self {
        Self::new(name, Some(INTENSITY_PRECISION))
    }

    pub(crate) fn publish(&self, quantity: &MeasuredQuantity) {
        self.value.publish(quantity.value);
        self.stddev.publish(quantity.stddev());
    }

    pub(crate) fn value_readable(&self) -> Arc<dyn Readable> {
        Arc::new(self.value.clone())
    }

    pub(crate) fn stddev_readable(&self) -> Arc<dyn Readable> {
        Arc::new(self.stddev.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory spectrum source for reducer tests.

    use async_trait::async_trait;
    use dae_core::error::{DaeError, DaeResult};
    use dae_core::spectrum::{PeriodSpectra, Spectrum};
    use dae_core::{AcquisitionUnit, SpectrumSource};
    use std::collections::HashMap;
    use std::sync::Arc;

    pub(crate) struct FixedSpectra {
        pub(crate) edges: Vec<f64>,
        pub(crate) counts: HashMap<usize, Vec<f64>>,
    }

    #[async_trait]
    impl SpectrumSource for FixedSpectra {
        async fn read_spectrum(&self, spectrum: usize, _period: usize) -> DaeResult<Spectrum> {
            let counts = self
                .counts
                .get(&spectrum)
                .cloned()
                .ok_or_else(|| DaeError::Configuration(format!("no spectrum {}", spectrum)))?;
            Spectrum::new(self.edges.clone(), counts)
        }

        async fn period_spectra_data(&self, _period: usize) -> DaeResult<PeriodSpectra> {
            let nspec = self.counts.keys().copied().max().unwrap_or(0);
            let ntc = self.edges.len() - 1;
            let mut data = vec![0; (nspec + 1) * (ntc + 1)];
            for (&spectrum, counts) in &self.counts {
                for (bin, count) in counts.iter().enumerate() {
                    data[spectrum * (ntc + 1) + bin + 1] = *count as i64;
                }
            }
            PeriodSpectra::new(nspec, ntc, data)
        }
    }

    /// Unit named "dae" whose spectra all share `edges`.
    pub(crate) fn unit_with_spectra(edges: Vec<f64>, spectra: &[(usize, Vec<f64>)]) -> AcquisitionUnit {
        let source = FixedSpectra {
            edges,
            counts: spectra.iter().cloned().collect(),
        };
        AcquisitionUnit::new("dae", Arc::new(source))
    }
}
