//! Histogrammed spectra read back from the acquisition unit.
//!
//! A [`Spectrum`] is a 1-D histogram of counts over bin edges, initially in
//! time of flight. Counts carry Poisson variance (variance == counts). Partial
//! bins contribute in proportion to their overlap with a requested interval,
//! applied linearly to both counts and variance.
//!
//! [`PeriodSpectra`] is the raw block for one period, laid out as
//! `(num_spectra + 1) × (num_time_channels + 1)`. Row 0 and column 0 are junk
//! data written by the electronics and are never included in integrals.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{DaeError, DaeResult};
use crate::limits::{NEUTRON_MASS, PLANCK_CONSTANT};
use crate::quantity::{Interval, MeasuredQuantity, Unit};

/// A histogram of counts over bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    edges: Vec<f64>,
    edge_unit: Unit,
    counts: Vec<f64>,
}

impl Spectrum {
    /// Build a time-of-flight spectrum. `tof_edges_us` must be strictly
    /// ascending and exactly one longer than `counts`.
    pub fn new(tof_edges_us: Vec<f64>, counts: Vec<f64>) -> DaeResult<Self> {
        Self::with_unit(tof_edges_us, Unit::Microseconds, counts)
    }

    fn with_unit(edges: Vec<f64>, edge_unit: Unit, counts: Vec<f64>) -> DaeResult<Self> {
        if edges.len() != counts.len() + 1 {
            return Err(DaeError::InvalidValue {
                channel: "spectrum".into(),
                reason: format!(
                    "expected {} bin edges for {} bins, got {}",
                    counts.len() + 1,
                    counts.len(),
                    edges.len()
                ),
            });
        }
        if edges
            .windows(2)
            .any(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
        {
            return Err(DaeError::InvalidValue {
                channel: "spectrum".into(),
                reason: "bin edges must be strictly ascending".into(),
            });
        }
        Ok(Self {
            edges,
            edge_unit,
            counts,
        })
    }

    /// Spectrum with no bins.
    pub fn empty() -> Self {
        Self {
            edges: vec![0.0],
            edge_unit: Unit::Microseconds,
            counts: Vec::new(),
        }
    }

    /// Bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Unit of the bin edges.
    pub fn edge_unit(&self) -> Unit {
        self.edge_unit
    }

    /// Counts per bin.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Sum of all bins.
    pub fn sum(&self) -> MeasuredQuantity {
        MeasuredQuantity::counts(self.counts.iter().sum())
    }

    /// Sum of the counts lying inside `bounds`.
    ///
    /// Each bin contributes `fraction * counts` where `fraction` is the share of
    /// its width inside the interval; the variance contribution uses the same
    /// fraction.
    pub fn rebin_sum(&self, bounds: &Interval) -> DaeResult<MeasuredQuantity> {
        bounds.require_unit(self.edge_unit)?;

        let mut value = 0.0;
        let mut variance = 0.0;
        for (i, &count) in self.counts.iter().enumerate() {
            let (lo, hi) = (self.edges[i], self.edges[i + 1]);
            let overlap = hi.min(bounds.upper()) - lo.max(bounds.lower());
            if overlap <= 0.0 {
                continue;
            }
            let fraction = overlap / (hi - lo);
            value += fraction * count;
            variance += fraction * count;
        }
        Ok(MeasuredQuantity::new(value, variance, Unit::Counts))
    }

    /// Redistribute the counts onto `edges`, in the same unit.
    ///
    /// Uses the same overlap weighting as [`rebin_sum`](Self::rebin_sum), so
    /// counts outside the new range are dropped and the rest are conserved.
    pub fn rebin(&self, edges: &[f64]) -> DaeResult<Spectrum> {
        let target = Spectrum::with_unit(
            edges.to_vec(),
            self.edge_unit,
            vec![0.0; edges.len().saturating_sub(1)],
        )?;
        let counts = edges
            .windows(2)
            .map(|w| {
                let bin = Interval::new(w[0], w[1], self.edge_unit)?;
                Ok(self.rebin_sum(&bin)?.value)
            })
            .collect::<DaeResult<Vec<f64>>>()?;
        Ok(Spectrum { counts, ..target })
    }

    /// Convert time-of-flight edges to wavelength in Å.
    ///
    /// `λ = h·t / (m_n·L)` for total flight path `L` in metres.
    pub fn to_wavelength(&self, flight_path_m: f64) -> DaeResult<Spectrum> {
        if self.edge_unit != Unit::Microseconds {
            return Err(DaeError::UnitMismatch {
                expected: Unit::Microseconds,
                actual: self.edge_unit,
            });
        }
        if !flight_path_m.is_finite() || flight_path_m <= 0.0 {
            return Err(DaeError::Configuration(format!(
                "Flight path length must be positive, got {} m",
                flight_path_m
            )));
        }

        let edges = self
            .edges
            .iter()
            .map(|&t| tof_to_wavelength(t, flight_path_m))
            .collect();
        Ok(Spectrum {
            edges,
            edge_unit: Unit::Angstrom,
            counts: self.counts.clone(),
        })
    }

    /// Convert time-of-flight edges to d-spacing in Å.
    ///
    /// `d = λ / (2·sin(θ))` where the scattering angle `two_theta_deg` is 2θ
    /// in degrees and must lie strictly between 0 and 180.
    pub fn to_dspacing(&self, flight_path_m: f64, two_theta_deg: f64) -> DaeResult<Spectrum> {
        if !(two_theta_deg > 0.0 && two_theta_deg < 180.0) {
            return Err(DaeError::Configuration(format!(
                "Scattering angle must lie in (0, 180) degrees, got {}",
                two_theta_deg
            )));
        }
        let wavelength = self.to_wavelength(flight_path_m)?;
        let factor = 2.0 * (two_theta_deg.to_radians() / 2.0).sin();
        Ok(Spectrum {
            edges: wavelength.edges.iter().map(|&l| l / factor).collect(),
            ..wavelength
        })
    }
}

/// Wavelength in Å of a neutron with time of flight `tof_us` over `flight_path_m`.
pub fn tof_to_wavelength(tof_us: f64, flight_path_m: f64) -> f64 {
    let tof_s = tof_us * 1e-6;
    PLANCK_CONSTANT * tof_s / (NEUTRON_MASS * flight_path_m) * 1e10
}

/// d-spacing in Å for time of flight `tof_us`, flight path `flight_path_m`
/// and scattering angle `two_theta_deg`.
pub fn tof_to_dspacing(tof_us: f64, flight_path_m: f64, two_theta_deg: f64) -> f64 {
    tof_to_wavelength(tof_us, flight_path_m) / (2.0 * (two_theta_deg.to_radians() / 2.0).sin())
}

/// Raw counts for every spectrum and time channel in a single period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpectra {
    num_spectra: usize,
    num_time_channels: usize,
    data: Vec<i64>,
}

impl PeriodSpectra {
    /// Wrap a row-major block of `(num_spectra + 1) * (num_time_channels + 1)` values.
    pub fn new(num_spectra: usize, num_time_channels: usize, data: Vec<i64>) -> DaeResult<Self> {
        let expected = (num_spectra + 1) * (num_time_channels + 1);
        if data.len() != expected {
            return Err(DaeError::InvalidValue {
                channel: "spectra data".into(),
                reason: format!("expected {} values, got {}", expected, data.len()),
            });
        }
        Ok(Self {
            num_spectra,
            num_time_channels,
            data,
        })
    }

    /// Number of real spectra (excluding the junk spectrum 0).
    pub fn num_spectra(&self) -> usize {
        self.num_spectra
    }

    /// Number of real time channels (excluding the junk bin 0).
    pub fn num_time_channels(&self) -> usize {
        self.num_time_channels
    }

    /// Counts of `spectrum` summed over every real time channel.
    pub fn integral(&self, spectrum: usize) -> DaeResult<i64> {
        if spectrum == 0 || spectrum > self.num_spectra {
            return Err(DaeError::Configuration(format!(
                "Spectrum {} out of range 1..={}",
                spectrum, self.num_spectra
            )));
        }
        let row = self.num_time_channels + 1;
        let start = spectrum * row + 1;
        Ok(self.data[start..start + self.num_time_channels].iter().sum())
    }

    /// Integrals of each requested spectrum, in order.
    pub fn integrals(&self, spectra: &[usize]) -> DaeResult<Vec<i64>> {
        spectra.iter().map(|&s| self.integral(s)).collect()
    }
}
