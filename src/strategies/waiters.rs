//! Waiters: how long each counting window lasts.
//!
//! Threshold waits have no timeout. How long a point takes to reach its
//! frame or charge target depends on the beam and the operator, so only
//! external cancellation ends such a wait early.

use async_trait::async_trait;
use dae_core::error::DaeResult;
use dae_core::{AcquisitionUnit, Channel, Readable};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{Strategy, Waiter};

type ChannelSelector<T> = fn(&AcquisitionUnit) -> &Channel<T>;

fn period_good_frames(unit: &AcquisitionUnit) -> &Channel<i64> {
    &unit.period.good_frames
}

fn good_frames(unit: &AcquisitionUnit) -> &Channel<i64> {
    &unit.good_frames
}

fn good_uah(unit: &AcquisitionUnit) -> &Channel<f64> {
    &unit.good_uah
}

fn m_events(unit: &AcquisitionUnit) -> &Channel<f64> {
    &unit.m_events
}

/// Waits until one numeric channel of the unit reaches a threshold.
///
/// The watched channel is published as an additional output.
#[derive(Clone)]
pub struct SimpleWaiter<T>
where
    T: Clone + Send + Sync + 'static,
{
    threshold: T,
    select: ChannelSelector<T>,
}

impl<T> Debug for SimpleWaiter<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleWaiter")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl SimpleWaiter<i64> {
    /// Wait for good frames counted in the current period.
    pub fn period_good_frames(frames: i64) -> Self {
        Self {
            threshold: frames,
            select: period_good_frames,
        }
    }

    /// Wait for good frames counted in the whole run.
    pub fn good_frames(frames: i64) -> Self {
        Self {
            threshold: frames,
            select: good_frames,
        }
    }
}

impl SimpleWaiter<f64> {
    /// Wait for good proton charge in the whole run, in µAh.
    pub fn good_uah(uah: f64) -> Self {
        Self {
            threshold: uah,
            select: good_uah,
        }
    }

    /// Wait for millions of events.
    pub fn m_events(mevents: f64) -> Self {
        Self {
            threshold: mevents,
            select: m_events,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SimpleWaiter<T> {
    /// Threshold the watched channel must reach.
    pub fn threshold(&self) -> &T {
        &self.threshold
    }
}

impl<T> Strategy for SimpleWaiter<T>
where
    T: Clone + PartialOrd + Debug + Serialize + Send + Sync + 'static,
{
    fn additional_outputs(&self, unit: &AcquisitionUnit) -> Vec<Arc<dyn Readable>> {
        vec![Arc::new((self.select)(unit).clone())]
    }
}

#[async_trait]
impl<T> Waiter for SimpleWaiter<T>
where
    T: Clone + PartialOrd + Debug + Serialize + Send + Sync + 'static,
{
    async fn wait(&self, unit: &AcquisitionUnit) -> DaeResult<()> {
        let channel = (self.select)(unit);
        info!(channel = %channel.name(), threshold = ?self.threshold, "starting wait");
        let threshold = self.threshold.clone();
        let reached = channel.wait_for(move |value| *value >= threshold, None).await?;
        info!(channel = %channel.name(), value = ?reached, "completed wait");
        Ok(())
    }
}

/// Waits a fixed wall-clock time regardless of what the unit does.
#[derive(Debug, Clone, Copy)]
pub struct TimeWaiter {
    duration: Duration,
}

impl TimeWaiter {
    /// Wait for `duration` per point.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Wait for a number of seconds per point.
    pub fn seconds(seconds: f64) -> Self {
        Self::new(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Time spent per point.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Strategy for TimeWaiter {}

#[async_trait]
impl Waiter for TimeWaiter {
    async fn wait(&self, _unit: &AcquisitionUnit) -> DaeResult<()> {
        info!(duration = ?self.duration, "starting wait");
        tokio::time::sleep(self.duration).await;
        info!("completed wait");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dae_core::spectrum::{PeriodSpectra, Spectrum};
    use dae_core::{DaeError, SpectrumSource};

    struct NoSpectra;

    #[async_trait]
    impl SpectrumSource for NoSpectra {
        async fn read_spectrum(&self, spectrum: usize, _period: usize) -> DaeResult<Spectrum> {
            Err(DaeError::Configuration(format!("no spectrum {}", spectrum)))
        }

        async fn period_spectra_data(&self, _period: usize) -> DaeResult<PeriodSpectra> {
            PeriodSpectra::new(0, 0, vec![0])
        }
    }

    fn unit() -> AcquisitionUnit {
        AcquisitionUnit::new("dae", Arc::new(NoSpectra))
    }

    #[tokio::test]
    async fn test_waits_until_threshold_reached() {
        let unit = unit();
        let waiter = SimpleWaiter::period_good_frames(100);
        let frames = unit.period.good_frames.clone();

        let task = tokio::spawn({
            let unit = unit.clone();
            async move { waiter.wait(&unit).await }
        });

        frames.publish(50);
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        frames.publish(150);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_wait_has_no_timeout() {
        let unit = unit();
        let waiter = SimpleWaiter::good_uah(1.0);
        let result = tokio::time::timeout(Duration::from_secs(3600), waiter.wait(&unit)).await;
        assert!(result.is_err(), "wait must still be pending after an hour");
    }

    #[test]
    fn test_publishes_watched_channel() {
        let unit = unit();
        let outputs = SimpleWaiter::period_good_frames(10).additional_outputs(&unit);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name(), "dae-period-good_frames");

        let outputs = SimpleWaiter::m_events(2.5).additional_outputs(&unit);
        assert_eq!(outputs[0].name(), "dae-m_events");
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_waiter_sleeps() {
        let unit = unit();
        let start = tokio::time::Instant::now();
        TimeWaiter::seconds(2.5).wait(&unit).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2500));
        assert!(TimeWaiter::seconds(1.0).additional_outputs(&unit).is_empty());
    }
}
