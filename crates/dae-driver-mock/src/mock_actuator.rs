//! Mock actuator implementation.
//!
//! Stands in for a spin flipper or any other two-state device that the
//! polarising orchestrator switches between counting windows.

use async_trait::async_trait;
use dae_core::capabilities::Movable;
use dae_core::error::DaeResult;
use dae_core::Channel;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::sleep;

use crate::common::{ErrorConfig, EventLog, TimingConfig};

/// Simulated actuator with recorded position history.
pub struct MockActuator {
    name: String,
    position: Channel<f64>,
    history: Arc<Mutex<Vec<f64>>>,
    timing: TimingConfig,
    errors: ErrorConfig,
    log: Option<EventLog>,
}

impl MockActuator {
    /// Create an actuator at position 0 with instant motion.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            position: Channel::new(format!("{}-position", name), 0.0),
            name,
            history: Arc::new(Mutex::new(Vec::new())),
            timing: TimingConfig::default(),
            errors: ErrorConfig::none(),
            log: None,
        }
    }

    /// Use realistic timing.
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Inject failures.
    pub fn with_errors(mut self, errors: ErrorConfig) -> Self {
        self.errors = errors;
        self
    }

    /// Record moves into a log shared with other mock devices.
    ///
    /// Each move is recorded as `"{name}={position}"`.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Every commanded position, in order.
    pub fn history(&self) -> Vec<f64> {
        self.history.lock().clone()
    }

    /// Position channel.
    pub fn position_channel(&self) -> Channel<f64> {
        self.position.clone()
    }
}

#[async_trait]
impl Movable for MockActuator {
    async fn move_abs(&self, target: f64) -> DaeResult<()> {
        self.errors.check_operation(&self.name, "move")?;

        tracing::debug!(actuator = %self.name, from = self.position.get(), to = target, "MockActuator: moving");
        self.history.lock().push(target);
        if let Some(log) = &self.log {
            log.record(format!("{}={}", self.name, target));
        }

        let delay = self.timing.communication_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.position.set(target).await
    }

    async fn position(&self) -> DaeResult<f64> {
        Ok(self.position.get())
    }

    async fn wait_settled(&self) -> DaeResult<()> {
        let settle = self.timing.settling_time();
        if !settle.is_zero() {
            sleep(settle).await;
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[tokio::test]
    async fn test_set_records_history() {
        let flipper = MockActuator::new("flipper");
        flipper.set(1.0).await.unwrap();
        flipper.set(0.0).await.unwrap();
        assert_eq!(flipper.history(), vec![1.0, 0.0]);
        assert_eq!(flipper.position().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_moves_recorded_in_shared_log() {
        let log = EventLog::new();
        let flipper = MockActuator::new("flipper").with_event_log(log.clone());
        flipper.set(1.0).await.unwrap();
        assert_eq!(log.events(), vec!["flipper=1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settling_time() {
        let flipper = MockActuator::new("flipper").with_timing(TimingConfig::flipper());
        let start = tokio::time::Instant::now();
        flipper.set(1.0).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let flipper = MockActuator::new("flipper").with_errors(ErrorConfig::scenario(
            ErrorScenario::HardwareFault {
                operation: "move",
                code: 3,
            },
        ));
        assert!(flipper.set(1.0).await.is_err());
        assert!(flipper.history().is_empty());
    }
}
