//! Acquisition strategies.
//!
//! An orchestrator is composed from exactly one of each:
//!
//! - [`Controller`]: opens and closes the counting window of each point
//!   (run per point, period per point)
//! - [`Waiter`]: decides how long a counting window lasts
//! - [`Reducer`]: turns raw counts into published quantities once counting
//!   has stopped
//!
//! All three share [`Strategy`], through which they advertise the channels a
//! consumer should record alongside each point.
//!
//! # Lifecycle
//!
//! ```text
//! setup ─▶ ( start_counting ─▶ wait ─▶ stop_counting ─▶ reduce_data )* ─▶ teardown
//! ```
//!
//! Strategies borrow the [`AcquisitionUnit`] for the duration of each call and
//! never own it.

use async_trait::async_trait;
use dae_core::error::DaeResult;
use dae_core::{AcquisitionUnit, Readable};
use std::collections::HashSet;
use std::sync::Arc;

pub mod controllers;
pub mod reducers;
pub mod waiters;

pub use controllers::{PeriodPerPointController, RunPerPointController};
pub use reducers::{
    DSpacingMappingReducer, MonitorNormalizer, PeriodSpecIntegralsReducer, PolarisingReducer,
    ScalarDenominator, ScalarNormalizer, SpectrumSummer, WavelengthBand,
    WavelengthBoundedNormalizer,
};
pub use waiters::{SimpleWaiter, TimeWaiter};

/// Behaviour shared by every strategy.
pub trait Strategy: Send + Sync {
    /// Channels worth publishing next to the orchestrator's own outputs.
    fn additional_outputs(&self, _unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        Vec::new()
    }
}

/// Drives the run/period state machine of the unit.
///
/// `setup` runs once before the first point and `teardown` once after the
/// last; `start_counting` and `stop_counting` run once per point.
#[async_trait]
pub trait Controller: Strategy {
    /// Prepare the unit before the first point.
    async fn setup(&mut self, _unit: &AcquisitionUnit) -> DaeResult<()> {
        Ok(())
    }

    /// Open the counting window for one point.
    async fn start_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()>;

    /// Close the counting window for one point.
    async fn stop_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()>;

    /// Release the unit after the last point.
    async fn teardown(&mut self, _unit: &AcquisitionUnit) -> DaeResult<()> {
        Ok(())
    }
}

/// Blocks while the unit counts.
#[async_trait]
pub trait Waiter: Strategy {
    /// Return once enough data has been counted.
    async fn wait(&self, unit: &AcquisitionUnit) -> DaeResult<()>;
}

/// Computes published quantities from raw counts.
///
/// Called exactly once after each `stop_counting`. Taking `&mut self` keeps
/// one instance from reducing twice at the same time.
#[async_trait]
pub trait Reducer: Strategy {
    /// Read the counts of the closed window and update the outputs.
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn additional_outputs(&self, unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        (**self).additional_outputs(unit)
    }
}

#[async_trait]
impl<C: Controller + ?Sized> Controller for Box<C> {
    async fn setup(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).setup(unit).await
    }

    async fn start_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).start_counting(unit).await
    }

    async fn stop_counting(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).stop_counting(unit).await
    }

    async fn teardown(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).teardown(unit).await
    }
}

#[async_trait]
impl<W: Waiter + ?Sized> Waiter for Box<W> {
    async fn wait(&self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).wait(unit).await
    }
}

#[async_trait]
impl<R: Reducer + ?Sized> Reducer for Box<R> {
    async fn reduce_data(&mut self, unit: &AcquisitionUnit) -> DaeResult<()> {
        (**self).reduce_data(unit).await
    }
}

/// Run one counting window: start, wait, then stop.
///
/// Steps are strictly sequential and the first error is returned as is.
/// `stop_counting` is reached only after `wait` returns. Reduction is left to
/// the caller, which knows the hardware is paused again once this returns
/// `Ok`.
pub(crate) async fn count_window<C, W>(
    unit: &AcquisitionUnit,
    controller: &mut C,
    waiter: &W,
) -> DaeResult<()>
where
    C: Controller + ?Sized,
    W: Waiter + ?Sized,
{
    controller.start_counting(unit).await?;
    waiter.wait(unit).await?;
    controller.stop_counting(unit).await
}

/// Merge output lists, keeping the first readable seen under each name.
pub(crate) fn dedup_outputs<I>(groups: I) -> Vec<Arc<dyn Readable>>
where
    I: IntoIterator<Item = Vec<Arc<dyn Readable>>>,
{
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flatten()
        .filter(|readable| seen.insert(readable.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dae_core::{Channel, Observable};

    #[test]
    fn test_dedup_keeps_first_by_name() {
        let first: Arc<dyn Readable> = Arc::new(Observable::new("dae-period_num", 1i64));
        let second: Arc<dyn Readable> = Arc::new(Channel::new("dae-period_num", 2i64));
        let other: Arc<dyn Readable> = Arc::new(Observable::new("dae-reducer-intensity", 0.5));

        let merged = dedup_outputs(vec![vec![first, other.clone()], vec![second, other]]);
        let names: Vec<String> = merged.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["dae-period_num", "dae-reducer-intensity"]);
        assert_eq!(merged[0].value_as_f64(), Some(1.0));
    }
}
