//! Summing spectra into a single counts quantity.

use dae_core::error::{DaeError, DaeResult};
use dae_core::spectrum::Spectrum;
use dae_core::{AcquisitionUnit, Interval, MeasuredQuantity, Unit};
use futures::future::try_join_all;
use tracing::debug;

/// How each spectrum is reduced to a counts quantity before summing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpectrumSummer {
    /// Every time channel.
    Whole,
    /// Counts inside a time-of-flight interval (µs).
    TofBounded(Interval),
    /// Counts inside a wavelength interval (Å), converting time of flight
    /// with the given total flight path.
    WavelengthBounded {
        /// Wavelength bounds.
        bounds: Interval,
        /// Total flight path in metres.
        flight_path_m: f64,
    },
}

impl SpectrumSummer {
    /// Sum counts inside `bounds`, which must be in µs.
    pub fn tof_bounded(bounds: Interval) -> DaeResult<Self> {
        bounds.require_unit(Unit::Microseconds)?;
        Ok(Self::TofBounded(bounds))
    }

    /// Sum counts inside `bounds`, which must be in Å.
    pub fn wavelength_bounded(bounds: Interval, flight_path_m: f64) -> DaeResult<Self> {
        bounds.require_unit(Unit::Angstrom)?;
        if !flight_path_m.is_finite() || flight_path_m <= 0.0 {
            return Err(DaeError::Configuration(format!(
                "Flight path length must be positive, got {} m",
                flight_path_m
            )));
        }
        Ok(Self::WavelengthBounded {
            bounds,
            flight_path_m,
        })
    }

    /// Reduce one histogram.
    pub fn sum_spectrum(&self, spectrum: &Spectrum) -> DaeResult<MeasuredQuantity> {
        match self {
            Self::Whole => Ok(spectrum.sum()),
            Self::TofBounded(bounds) => spectrum.rebin_sum(bounds),
            Self::WavelengthBounded {
                bounds,
                flight_path_m,
            } => spectrum.to_wavelength(*flight_path_m)?.rebin_sum(bounds),
        }
    }

    /// Read `spectra` of the current period concurrently and sum them.
    ///
    /// An empty selection sums to zero counts.
    pub async fn sum(
        &self,
        unit: &AcquisitionUnit,
        spectra: &[usize],
    ) -> DaeResult<MeasuredQuantity> {
        let histograms = try_join_all(spectra.iter().map(|&s| unit.read_spectrum(s))).await?;
        let total = histograms
            .iter()
            .try_fold(MeasuredQuantity::zero(Unit::Counts), |acc, histogram| {
                acc.add(&self.sum_spectrum(histogram)?)
            })?;
        debug!(spectra = ?spectra, counts = total.value, "summed spectra");
        Ok(total)
    }
}
