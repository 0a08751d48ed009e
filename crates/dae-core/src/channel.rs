//! Hardware-backed channels and actions.
//!
//! [`Channel<T>`] wraps an [`Observable<T>`] with optional async hardware
//! callbacks, so that writing a channel reaches the device before subscribers
//! are notified, and reading can refresh the cached value from the device.
//! [`Action`] is a triggerable operation with no cached value (begin run,
//! pause, ...).
//!
//! # Example
//!
//! ```rust,ignore
//! let period = Channel::new("period_num", 0i64)
//!     .connect_to_hardware_write(move |n| {
//!         let device = device.clone();
//!         Box::pin(async move { device.write_period(n).await })
//!     });
//!
//! period.set(3).await?;              // device write, then cache update
//! period.wait_for(|n| *n == 3, Some(TRANSITION_TIMEOUT)).await?;
//! ```

use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::DaeResult;
use crate::observable::{Observable, ObservableMetadata, Readable, Reading};

/// Async hardware write callback.
pub type HardwareWriter<T> = Arc<dyn Fn(T) -> BoxFuture<'static, DaeResult<()>> + Send + Sync>;

/// Async hardware read callback.
pub type HardwareReader<T> = Arc<dyn Fn() -> BoxFuture<'static, DaeResult<T>> + Send + Sync>;

/// A typed channel with a cached, observable value and optional hardware I/O.
///
/// Clones share the cache and callbacks.
pub struct Channel<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Observable<T>,
    hardware_writer: Option<HardwareWriter<T>>,
    hardware_reader: Option<HardwareReader<T>>,
    device_readback: bool,
}

impl<T: Clone + Send + Sync + 'static> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hardware_writer: self.hardware_writer.clone(),
            hardware_reader: self.hardware_reader.clone(),
            device_readback: self.device_readback,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name())
            .field("has_writer", &self.hardware_writer.is_some())
            .field("has_reader", &self.hardware_reader.is_some())
            .finish()
    }
}

impl<T> Channel<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a channel with no hardware connection.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self {
            inner: Observable::new(name, initial),
            hardware_writer: None,
            hardware_reader: None,
            device_readback: false,
        }
    }

    /// Wrap an existing observable.
    pub fn from_observable(inner: Observable<T>) -> Self {
        Self {
            inner,
            hardware_writer: None,
            hardware_reader: None,
            device_readback: false,
        }
    }

    /// Add units metadata.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        Self {
            inner: self.inner.with_units(units),
            ..self
        }
    }

    /// Mark as read-only for clients.
    pub fn read_only(self) -> Self {
        Self {
            inner: self.inner.read_only(),
            ..self
        }
    }

    /// Leave the cached value to the device after a write.
    ///
    /// The device confirms a write by publishing the new readback, so callers
    /// wait on the channel to observe the change.
    pub fn confirmed_by_device(mut self) -> Self {
        self.device_readback = true;
        self
    }

    /// Connect a hardware write callback, awaited by [`Channel::set`].
    pub fn connect_to_hardware_write(
        mut self,
        writer: impl Fn(T) -> BoxFuture<'static, DaeResult<()>> + Send + Sync + 'static,
    ) -> Self {
        self.hardware_writer = Some(Arc::new(writer));
        self
    }

    /// Connect a hardware read callback, used by [`Channel::get_value`].
    pub fn connect_to_hardware_read(
        mut self,
        reader: impl Fn() -> BoxFuture<'static, DaeResult<T>> + Send + Sync + 'static,
    ) -> Self {
        self.hardware_reader = Some(Arc::new(reader));
        self
    }

    /// Cached value, without touching hardware.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Read the current value, refreshing from hardware when a reader is
    /// connected.
    pub async fn get_value(&self) -> DaeResult<T> {
        if let Some(reader) = &self.hardware_reader {
            let value = reader().await?;
            self.inner.publish(value.clone());
            return Ok(value);
        }
        Ok(self.inner.get())
    }

    /// Validate, write to hardware (if connected), then update the cache.
    ///
    /// A rejected or failed write leaves the cached value unchanged. Channels
    /// marked [`confirmed_by_device`](Channel::confirmed_by_device) skip the
    /// cache update.
    pub async fn set(&self, value: T) -> DaeResult<()> {
        self.inner.validate(&value)?;

        if let Some(writer) = &self.hardware_writer {
            writer(value.clone()).await?;
        }

        if !self.device_readback {
            self.inner.publish(value);
        }
        Ok(())
    }

    /// Update the cached value from the device side.
    pub fn publish(&self, value: T) {
        self.inner.publish(value);
    }

    /// Modify the cached value in place from the device side.
    pub fn publish_modify<F>(&self, modify: F)
    where
        F: FnOnce(&mut T),
    {
        self.inner.publish_modify(modify);
    }

    /// Subscribe to cached value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.subscribe()
    }

    /// Wait until `predicate` holds. See [`Observable::wait_for`].
    pub async fn wait_for<F>(&self, predicate: F, timeout: Option<Duration>) -> DaeResult<T>
    where
        F: FnMut(&T) -> bool + Send,
    {
        self.inner.wait_for(predicate, timeout).await
    }

    /// Channel name.
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// Underlying observable.
    pub fn inner(&self) -> &Observable<T> {
        &self.inner
    }
}

impl<T> Readable for Channel<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn name(&self) -> String {
        self.inner.name()
    }

    fn read(&self) -> DaeResult<Reading> {
        Readable::read(&self.inner)
    }

    fn value_as_f64(&self) -> Option<f64> {
        self.inner.value_as_f64()
    }

    fn metadata(&self) -> ObservableMetadata {
        Readable::metadata(&self.inner)
    }
}

/// Async action callback.
pub type ActionHandler<A> = Arc<dyn Fn(A) -> BoxFuture<'static, DaeResult<()>> + Send + Sync>;

/// A named, triggerable hardware operation taking an argument of type `A`.
pub struct Action<A = ()> {
    name: String,
    handler: ActionHandler<A>,
}

impl<A> Clone for Action<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<A> fmt::Debug for Action<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

impl<A: Send + 'static> Action<A> {
    /// Create an action from an async handler.
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(A) -> BoxFuture<'static, DaeResult<()>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the action with an argument and wait for the device to accept it.
    pub async fn trigger_with(&self, arg: A) -> DaeResult<()> {
        tracing::debug!(action = %self.name, "triggering action");
        (self.handler)(arg).await
    }
}

impl Action<()> {
    /// Run a parameterless action.
    pub async fn trigger(&self) -> DaeResult<()> {
        self.trigger_with(()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaeError;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_set_writes_hardware_before_cache() {
        let written = Arc::new(AtomicI64::new(0));
        let w = written.clone();
        let channel = Channel::new("period_num", 0i64).connect_to_hardware_write(move |v| {
            let w = w.clone();
            Box::pin(async move {
                w.store(v, Ordering::SeqCst);
                Ok(())
            })
        });

        channel.set(3).await.unwrap();
        assert_eq!(written.load(Ordering::SeqCst), 3);
        assert_eq!(channel.get(), 3);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let channel = Channel::new("period_num", 1i64).connect_to_hardware_write(|_| {
            Box::pin(async { Err(DaeError::Hardware("write refused".into())) })
        });

        assert!(channel.set(2).await.is_err());
        assert_eq!(channel.get(), 1);
    }

    #[tokio::test]
    async fn test_device_confirmed_write_leaves_cache() {
        let channel = Channel::new("period_num", 0i64)
            .connect_to_hardware_write(|_| Box::pin(async { Ok(()) }))
            .confirmed_by_device();

        channel.set(2).await.unwrap();
        assert_eq!(channel.get(), 0);
        channel.publish(2);
        assert_eq!(channel.get(), 2);
    }

    #[tokio::test]
    async fn test_get_value_refreshes_from_hardware() {
        let channel =
            Channel::new("good_frames", 0i64).connect_to_hardware_read(|| Box::pin(async { Ok(42) }));
        assert_eq!(channel.get(), 0);
        assert_eq!(channel.get_value().await.unwrap(), 42);
        assert_eq!(channel.get(), 42);
    }

    #[tokio::test]
    async fn test_action_trigger() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let action = Action::new("pause_run", move |_: ()| {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
        action.trigger().await.unwrap();
        action.clone().trigger().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(action.name(), "pause_run");
    }
}
