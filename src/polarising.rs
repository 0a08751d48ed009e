//! Orchestrator for two counting windows per point, one per actuator state.
//!
//! Each `trigger()` is:
//!
//! 1. move the actuator to `states[0]`
//! 2. start, wait, stop, and reduce into `reducer_up`
//! 3. move the actuator to `states[1]`
//! 4. start, wait, stop, and reduce into `reducer_down`
//! 5. combine both reductions with the polarising reducer
//!
//! Both windows use the same controller and waiter against the same unit, so
//! they never overlap. Reduction errors leave the orchestrator `Staged`;
//! actuator and counting errors leave it `Triggering`.

use dae_core::error::{DaeError, DaeResult};
use dae_core::{AcquisitionUnit, Movable, Readable, Reading};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::orchestrator::{read_all, require_state, OrchestratorState};
use crate::strategies::{count_window, dedup_outputs, Controller, Reducer, Strategy, Waiter};

/// Composes a controller, a waiter, a pair of spin-state reducers and a
/// combining reducer with an actuator.
pub struct PolarisingOrchestrator<C, W, R, P> {
    name: String,
    unit: AcquisitionUnit,
    controller: C,
    waiter: W,
    reducer_up: R,
    reducer_down: R,
    reducer: P,
    actuator: Arc<dyn Movable>,
    actuator_states: [f64; 2],
    state: OrchestratorState,
    readables: Vec<Arc<dyn Readable>>,
}

impl<C, W, R, P> fmt::Debug for PolarisingOrchestrator<C, W, R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolarisingOrchestrator")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("actuator", &self.actuator.name())
            .field("actuator_states", &self.actuator_states)
            .finish_non_exhaustive()
    }
}

impl<C, W, R, P> PolarisingOrchestrator<C, W, R, P>
where
    C: Controller,
    W: Waiter,
    R: Reducer,
    P: Reducer,
{
    /// Compose strategies over `unit`, switching `actuator` between
    /// `actuator_states[0]` ("up") and `actuator_states[1]` ("down").
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        unit: AcquisitionUnit,
        controller: C,
        waiter: W,
        reducer_up: R,
        reducer_down: R,
        reducer: P,
        actuator: Arc<dyn Movable>,
        actuator_states: [f64; 2],
    ) -> Self {
        let readables = dedup_outputs([
            controller.additional_outputs(&unit),
            waiter.additional_outputs(&unit),
            reducer_up.additional_outputs(&unit),
            reducer_down.additional_outputs(&unit),
            reducer.additional_outputs(&unit),
        ]);
        Self {
            name: name.into(),
            unit,
            controller,
            waiter,
            reducer_up,
            reducer_down,
            reducer,
            actuator,
            actuator_states,
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

    /// Count one point in both actuator states, then combine.
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn trigger(&mut self) -> DaeResult<()> {
        require_state(&self.name, "trigger", self.state, OrchestratorState::Staged)?;
        self.state = OrchestratorState::Triggering;

        let [up, down] = self.actuator_states;

        info!(actuator = %self.actuator.name(), position = up, "moving actuator to first state");
        self.actuator.set(up).await?;
        count_window(&self.unit, &mut self.controller, &self.waiter).await?;
        self.state = OrchestratorState::Staged;
        self.reducer_up.reduce_data(&self.unit).await?;

        self.state = OrchestratorState::Triggering;
        info!(actuator = %self.actuator.name(), position = down, "moving actuator to second state");
        self.actuator.set(down).await?;
        count_window(&self.unit, &mut self.controller, &self.waiter).await?;
        self.state = OrchestratorState::Staged;
        self.reducer_down.reduce_data(&self.unit).await?;

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

impl<C, W, R, P> PolarisingOrchestrator<C, W, R, P> {
    /// Orchestrator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Actuator positions for the two counting windows.
    pub fn actuator_states(&self) -> [f64; 2] {
        self.actuator_states
    }

    /// The unit being controlled.
    pub fn unit(&self) -> &AcquisitionUnit {
        &self.unit
    }

    /// Controller strategy.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Reducer for the first actuator state.
    pub fn reducer_up(&self) -> &R {
        &self.reducer_up
    }

    /// Reducer for the second actuator state.
    pub fn reducer_down(&self) -> &R {
        &self.reducer_down
    }

    /// Combining reducer.
    pub fn reducer(&self) -> &P {
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
