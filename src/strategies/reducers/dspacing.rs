//! Summed d-spacing spectrum over a set of detectors.

use async_trait::async_trait;
use dae_core::error::{DaeError, DaeResult};
use dae_core::spectrum::Spectrum;
use dae_core::{AcquisitionUnit, Observable, Readable};
use futures::future::try_join_all;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::strategies::{Reducer, Strategy};

/// Publishes the counts of every selected detector mapped onto one common
/// d-spacing grid.
///
/// Each detector has its own flight path and scattering angle, so its time
/// channels land on different d-spacings. Every spectrum is converted, rebinned
/// onto `bin_edges` and added in. Rebinned counts may be fractional.
#[derive(Debug, Clone)]
pub struct DSpacingMappingReducer {
    detectors: Vec<usize>,
    flight_paths_m: Vec<f64>,
    two_theta_deg: Vec<f64>,
    bin_edges: Vec<f64>,
    dspacing: Observable<Vec<f64>>,
}

impl DSpacingMappingReducer {
    /// Map `detectors` onto `bin_edges` (Å, strictly ascending).
    ///
    /// `flight_paths_m` and `two_theta_deg` give the total flight path and the
    /// scattering angle of each detector, in the same order.
    pub fn new(
        prefix: &str,
        detectors: Vec<usize>,
        flight_paths_m: Vec<f64>,
        two_theta_deg: Vec<f64>,
        bin_edges: Vec<f64>,
    ) -> DaeResult<Self> {
        if flight_paths_m.len() != detectors.len() {
            return Err(DaeError::Configuration(format!(
                "{} flight paths given for {} detectors",
                flight_paths_m.len(),
                detectors.len()
            )));
        }
        if two_theta_deg.len() != detectors.len() {
            return Err(DaeError::Configuration(format!(
                "{} scattering angles given for {} detectors",
                two_theta_deg.len(),
                detectors.len()
            )));
        }
        if bin_edges.len() < 2
            || bin_edges
                .windows(2)
                .any(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
        {
            return Err(DaeError::Configuration(
                "d-spacing bin edges must be at least two strictly ascending values".into(),
            ));
        }

        Ok(Self {
            dspacing: Observable::new(
                format!("{}-dspacing", prefix),
                vec![0.0; bin_edges.len() - 1],
            )
            .with_units("counts")
            .read_only(),
            detectors,
            flight_paths_m,
            two_theta_deg,
            bin_edges,
        })
    }

    /// Summed counts per d-spacing bin.
    pub fn dspacing(&self) -> &Observable<Vec<f64>> {
        &self.dspacing
    }

    /// d-spacing bin edges in Å.
    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    fn map_spectrum(&self, index: usize, spectrum: &Spectrum) -> DaeResult<Spectrum> {
        spectrum
            .to_dspacing(self.flight_paths_m[index], self.two_theta_deg[index])?
            .rebin(&self.bin_edges)
    }
}

impl Strategy for DSpacingMappingReducer {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![Arc::new(self.dspacing.clone())]
    }
}

#[async_trait]
impl Reducer for DSpacingMappingReducer {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        let spectra =
            try_join_all(self.detectors.iter().map(|&s| unit.read_spectrum(s))).await?;

        let mut summed = vec![0.0; self.bin_edges.len() - 1];
        for (index, spectrum) in spectra.iter().enumerate() {
            let mapped = self.map_spectrum(index, spectrum)?;
            for (total, count) in summed.iter_mut().zip(mapped.counts()) {
                *total += count;
            }
        }

        info!(
            detectors = self.detectors.len(),
            bins = summed.len(),
            "mapped spectra to d-spacing"
        );
        self.dspacing.publish(summed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::unit_with_spectra;
    use super::*;
    use dae_core::spectrum::tof_to_dspacing;
    use serde_json::json;

    const EDGES_US: [f64; 3] = [10000.0, 15000.0, 20000.0];

    fn reducer(two_theta_deg: Vec<f64>, bin_edges: Vec<f64>) -> DSpacingMappingReducer {
        let detectors: Vec<usize> = (1..=two_theta_deg.len()).collect();
        let flight_paths = vec![10.0; detectors.len()];
        DSpacingMappingReducer::new(
            "dae-reducer",
            detectors,
            flight_paths,
            two_theta_deg,
            bin_edges,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_wide_bin_collects_every_count() {
        let unit = unit_with_spectra(
            EDGES_US.to_vec(),
            &[(1, vec![10.0, 20.0]), (2, vec![5.0, 5.0])],
        );
        let mut reducer = reducer(vec![60.0, 90.0], vec![0.0, 100.0]);
        reducer.reduce_data(&unit).await.unwrap();

        assert_eq!(reducer.dspacing().get(), vec![40.0]);
        let outputs = reducer.additional_outputs(&unit);
        assert_eq!(outputs[0].name(), "dae-reducer-dspacing");
        assert_eq!(outputs[0].read().unwrap().value, json!([40.0]));
    }

    #[tokio::test]
    async fn test_grid_matching_detector_keeps_bins() {
        let unit = unit_with_spectra(EDGES_US.to_vec(), &[(1, vec![7.0, 3.0])]);
        let edges: Vec<f64> = EDGES_US
            .iter()
            .map(|&t| tof_to_dspacing(t, 10.0, 90.0))
            .collect();
        let mut reducer = reducer(vec![90.0], edges);
        reducer.reduce_data(&unit).await.unwrap();

        let counts = reducer.dspacing().get();
        assert!((counts[0] - 7.0).abs() < 1e-9);
        assert!((counts[1] - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_detectors_at_different_angles_sum() {
        // At 2θ = 60° d equals λ: bins span 3.956..5.934..7.912 Å
        let unit = unit_with_spectra(
            EDGES_US.to_vec(),
            &[(1, vec![100.0, 0.0]), (2, vec![0.0, 100.0])],
        );
        let middle = tof_to_dspacing(15000.0, 10.0, 60.0);
        let lower = tof_to_dspacing(10000.0, 10.0, 60.0);
        let half = (lower + middle) / 2.0;

        let mut reducer = reducer(vec![60.0, 60.0], vec![lower, half, middle, 10.0]);
        reducer.reduce_data(&unit).await.unwrap();

        let counts = reducer.dspacing().get();
        assert!((counts[0] - 50.0).abs() < 1e-9);
        assert!((counts[1] - 50.0).abs() < 1e-9);
        assert!((counts[2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_geometry_rejected() {
        let new = |flight_paths: Vec<f64>, angles: Vec<f64>, edges: Vec<f64>| {
            DSpacingMappingReducer::new("dae-reducer", vec![1, 2], flight_paths, angles, edges)
        };
        let err = new(vec![10.0], vec![90.0, 90.0], vec![0.0, 1.0]).unwrap_err();
        assert!(err.is_configuration());
        assert!(new(vec![10.0, 10.0], vec![90.0], vec![0.0, 1.0]).is_err());
        assert!(new(vec![10.0, 10.0], vec![90.0, 90.0], vec![1.0]).is_err());
        assert!(new(vec![10.0, 10.0], vec![90.0, 90.0], vec![2.0, 1.0]).is_err());
        assert!(new(vec![10.0, 10.0], vec![90.0, 90.0], vec![1.0, 2.0]).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_angle_fails_reduction() {
        let unit = unit_with_spectra(EDGES_US.to_vec(), &[(1, vec![1.0, 1.0])]);
        let mut reducer = reducer(vec![0.0], vec![0.0, 10.0]);
        assert!(reducer.reduce_data(&unit).await.unwrap_err().is_configuration());
    }
}
