//! Hardware capabilities used alongside the acquisition unit.
//!
//! The polarising orchestrator switches a spin flipper (or any other actuator)
//! between two states around each counting window. It only needs the
//! [`Movable`] capability.

use async_trait::async_trait;

use crate::error::DaeResult;

/// Capability: Motion Control
///
/// Devices that can move to positions (flippers, stages, choppers).
///
/// # Contract
/// - Positions are in device-native units
/// - `move_abs` initiates motion and may return before completion
/// - `wait_settled` blocks until motion completes
/// - `set` is `move_abs` followed by `wait_settled`
///
/// # Thread Safety
/// - All methods take `&self`; implementations use interior mutability
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position.
    async fn move_abs(&self, position: f64) -> DaeResult<()>;

    /// Current position. May be approximate while moving.
    async fn position(&self) -> DaeResult<f64>;

    /// Wait for motion to settle.
    async fn wait_settled(&self) -> DaeResult<()>;

    /// Move to `position` and wait until settled.
    async fn set(&self, position: f64) -> DaeResult<()> {
        self.move_abs(position).await?;
        self.wait_settled().await
    }

    /// Device name, used in log fields.
    fn name(&self) -> String {
        "actuator".to_string()
    }
}
