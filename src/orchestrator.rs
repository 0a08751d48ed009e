//! Orchestrator - one controller, one waiter and one reducer behind a
//! stage/trigger/unstage contract.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────┐   stage()   ┌────────┐  trigger()  ┌────────────┐
//! │ Unstaged │────────────▶│ Staged │────────────▶│ Triggering │
//! └──────────┘             └────────┘◀────────────└────────────┘
//!      ▲                        │       completed
//!      └───────unstage()────────┘
//! ```
//!
//! `trigger()` takes `&mut self`, so at most one acquisition is in flight per
//! orchestrator. Once counting has stopped the state is `Staged` again, so a
//! point whose reduction fails can simply be triggered again. If a trigger is
//! cancelled or fails while the hardware is counting, the state stays
//! `Triggering`: hardware may be left mid-run, further triggers are refused,
//! and only `unstage()` is accepted.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut dae = Orchestrator::new("dae", unit, controller, waiter, reducer);
//! dae.stage().await?;
//! for _ in 0..points {
//!     dae.trigger().await?;
//!     for reading in dae.read()? { /* ... */ }
//! }
//! dae.unstage().await?;
//! ```

use dae_core::error::{DaeError, DaeResult};
use dae_core::{AcquisitionUnit, Reading, Readable};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::strategies::{count_window, dedup_outputs, Controller, Reducer, Strategy, Waiter};

/// Lifecycle state of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Not staged; only `stage()` is accepted.
    Unstaged,
    /// Ready to count points.
    Staged,
    /// A point is being counted, or the last trigger failed while counting.
    Triggering,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Unstaged => write!(f, "unstaged"),
            OrchestratorState::Staged => write!(f, "staged"),
            OrchestratorState::Triggering => write!(f, "triggering"),
        }
    }
}

pub(crate) fn require_state(
    name: &str,
    operation: &str,
    actual: OrchestratorState,
    expected: OrchestratorState,
) -> DaeResult<()> {
    if actual != expected {
        return Err(DaeError::State(format!(
            "{}: cannot {} while {} (expected {})",
            name, operation, actual, expected
        )));
    }
    Ok(())
}

pub(crate) fn read_all(readables: &[Arc<dyn Readable>]) -> DaeResult<Vec<(String, Reading)>> {
    readables
        .iter()
        .map(|readable| Ok((readable.name(), readable.read()?)))
        .collect()
}

/// Composes exactly one [`Controller`], [`Waiter`] and [`Reducer`].
pub struct Orchestrator<C, W, R> {
    name: String,
    unit: AcquisitionUnit,
    controller: C,
    waiter: W,
    reducer: R,
    state: OrchestratorState,
    readables: Vec<Arc<dyn Readable>>,
}

impl<C, W, R> fmt::Debug for Orchestrator<C, W, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("readables", &self.readables.len())
            .finish_non_exhaustive()
    }
}

impl<C, W, R> Orchestrator<C, W, R>
where
    C: Controller,
    W: Waiter,
    R: Reducer,
{
    /// Compose strategies over `unit`.
    ///
    /// The readable set is fixed here: every strategy's additional outputs,
    /// in controller, waiter, reducer order, keeping the first of any name.
    pub fn new(
        name: impl Into<String>,
        unit: AcquisitionUnit,
        controller: C,
        waiter: W,
        reducer: R,
    ) -> Self {
        let readables = dedup_outputs([
            controller.additional_outputs(&unit),
            waiter.additional_outputs(&unit),
            reducer.additional_outputs(&unit),
        ]);
        Self {
            name: name.into(),
            unit,
            controller,
            waiter,
            reducer,
            state: OrchestratorState::Unstaged,
            readables,
        }
    }

    /// Prepare the unit for a sequence of points.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn stage(&mut self) -> DaeResult<()> {
        require_state(&self.name, "stage", self.state, OrchestratorState::Unstaged)?;
        self.controller.setup(&self.unit).await?;
        self.state = OrchestratorState::Staged;
        info!("staged");
        Ok(())
    }

    /// Count one point: start, wait, stop, reduce.
    ///
    /// Once this returns `Ok`, the reducer outputs hold the new point. Any
    /// error is returned as is; nothing is retried or rolled back. A failed
    /// reduction leaves the orchestrator `Staged`.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn trigger(&mut self) -> DaeResult<()> {
        require_state(&self.name, "trigger", self.state, OrchestratorState::Staged)?;
        self.state = OrchestratorState::Triggering;
        count_window(&self.unit, &mut self.controller, &self.waiter).await?;
        self.state = OrchestratorState::Staged;
        self.reducer.reduce_data(&self.unit).await?;
        info!("point complete");
        Ok(())
    }

    /// Release the unit after the last point.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn unstage(&mut self) -> DaeResult<()> {
        if self.state == OrchestratorState::Unstaged {
            return Err(DaeError::State(format!(
                "{}: cannot unstage while unstaged",
                self.name
            )));
        }
        self.controller.teardown(&self.unit).await?;
        self.state = OrchestratorState::Unstaged;
        info!("unstaged");
        Ok(())
    }
}

impl<C, W, R> Orchestrator<C, W, R> {
    /// Orchestrator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The unit being controlled.
    pub fn unit(&self) -> &AcquisitionUnit {
        &self.unit
    }

    /// Controller strategy.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Waiter strategy.
    pub fn waiter(&self) -> &W {
        &self.waiter
    }

    /// Reducer strategy.
    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Deduplicated outputs of every strategy.
    pub fn readables(&self) -> &[Arc<dyn Readable>] {
        &self.readables
    }

    /// Current reading of every output, in readable order.
    pub fn read(&self) -> DaeResult<Vec<(String, Reading)>> {
        read_all(&self.readables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{MonitorNormalizer, PeriodPerPointController, TimeWaiter};
    use dae_driver_mock::{MockDae, MockDaeConfig};

    fn orchestrator(
        dae: &MockDae,
    ) -> Orchestrator<PeriodPerPointController, TimeWaiter, MonitorNormalizer> {
        Orchestrator::new(
            "dae",
            dae.unit(),
            PeriodPerPointController::new(false),
            TimeWaiter::seconds(1.0),
            MonitorNormalizer::new("dae-reducer", vec![1], vec![2]),
        )
    }

    #[test]
    fn test_state_display() {
        assert_eq!(OrchestratorState::Unstaged.to_string(), "unstaged");
        assert_eq!(OrchestratorState::Staged.to_string(), "staged");
        assert_eq!(OrchestratorState::Triggering.to_string(), "triggering");
    }

    #[tokio::test]
    async fn test_trigger_requires_stage() {
        let dae = MockDae::new(MockDaeConfig::default());
        let mut orchestrator = orchestrator(&dae);
        let err = orchestrator.trigger().await.unwrap_err();
        assert!(matches!(err, DaeError::State(_)));
        assert!(dae.event_log().events().is_empty());
    }

    #[tokio::test]
    async fn test_double_stage_rejected() {
        let dae = MockDae::new(MockDaeConfig::default());
        let mut orchestrator = orchestrator(&dae);
        orchestrator.stage().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Staged);
        assert!(matches!(
            orchestrator.stage().await,
            Err(DaeError::State(_))
        ));
        orchestrator.unstage().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Unstaged);
        assert!(orchestrator.unstage().await.is_err());
    }

    #[test]
    fn test_readables_in_strategy_order() {
        let dae = MockDae::new(MockDaeConfig::default());
        let orchestrator = orchestrator(&dae);
        let names: Vec<String> = orchestrator.readables().iter().map(|r| r.name()).collect();
        assert_eq!(names[0], "dae-period_num");
        assert_eq!(names[1], "dae-reducer-det_counts");
        assert_eq!(names.len(), 7);
        assert_eq!(orchestrator.read().unwrap().len(), 7);
    }
}
