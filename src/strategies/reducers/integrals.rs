//! Raw per-spectrum integrals of the current period.

use async_trait::async_trait;
use dae_core::error::DaeResult;
use dae_core::{AcquisitionUnit, Observable, Readable};
use std::sync::Arc;
use tracing::info;

use crate::strategies::{Reducer, Strategy};

/// Publishes the integral over all time channels of each selected spectrum.
///
/// Reads the whole period block in one go rather than spectrum by spectrum.
/// Nothing is normalised; the arrays feed later remapping.
#[derive(Debug, Clone)]
pub struct PeriodSpecIntegralsReducer {
    detectors: Vec<usize>,
    monitors: Vec<usize>,
    det_integrals: Observable<Vec<i64>>,
    mon_integrals: Observable<Vec<i64>>,
}

impl PeriodSpecIntegralsReducer {
    /// Integrate `detectors` and `monitors` (spectrum numbers, 1-based).
    pub fn new(prefix: &str, detectors: Vec<usize>, monitors: Vec<usize>) -> Self {
        Self {
            det_integrals: Observable::new(
                format!("{}-det_integrals", prefix),
                vec![0; detectors.len()],
            )
            .with_units("counts")
            .read_only(),
            mon_integrals: Observable::new(
                format!("{}-mon_integrals", prefix),
                vec![0; monitors.len()],
            )
            .with_units("counts")
            .read_only(),
            detectors,
            monitors,
        }
    }

    /// Detector integrals, one per detector spectrum.
    pub fn det_integrals(&self) -> &Observable<Vec<i64>> {
        &self.det_integrals
    }

    /// Monitor integrals, one per monitor spectrum.
    pub fn mon_integrals(&self) -> &Observable<Vec<i64>> {
        &self.mon_integrals
    }
}

impl Strategy for PeriodSpecIntegralsReducer {
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![
            Arc::new(self.det_integrals.clone()),
            Arc::new(self.mon_integrals.clone()),
        ]
    }
}

#[async_trait]
impl Reducer for PeriodSpecIntegralsReducer {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        let block = unit.current_period_spectra().await?;
        let det = block.integrals(&self.detectors)?;
        let mon = block.integrals(&self.monitors)?;
        info!(
            spectra = block.num_spectra(),
            time_channels = block.num_time_channels(),
            "integrated period spectra"
        );
        self.det_integrals.publish(det);
        self.mon_integrals.publish(mon);
        Ok(())
    }
}
