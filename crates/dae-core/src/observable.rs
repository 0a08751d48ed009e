//! Observable values
//!
//! Reactive value holders using `tokio::sync::watch` for multi-subscriber
//! notifications. Every number a reducer publishes, and the cached side of every
//! hardware [`Channel`](crate::channel::Channel), is an [`Observable`].
//!
//! # Features
//!
//! - Type-safe values with change notifications
//! - Multi-subscriber support (plot callbacks, loggers, waiters)
//! - Optional validation
//! - Metadata (name, units, description, display precision)
//! - Bounded or unbounded waits on a predicate via [`Observable::wait_for`]
//! - Type-erased reads through the [`Readable`] trait
//!
//! # Example
//!
//! ```rust,ignore
//! let intensity = Observable::new("intensity", 0.0).with_precision(6);
//!
//! let mut rx = intensity.subscribe();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("intensity: {}", *rx.borrow());
//!     }
//! });
//!
//! intensity.set(0.4)?;
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{DaeError, DaeResult};

/// Validator callback type.
pub type Validator<T> = Arc<dyn Fn(&T) -> DaeResult<()> + Send + Sync>;

/// Shared state for Observable that propagates to all clones.
///
/// Uses `parking_lot::RwLock` since metadata access never needs to await.
struct ObservableSharedState<T> {
    metadata: ObservableMetadata,
    validator: Option<Validator<T>>,
    last_updated: DateTime<Utc>,
}

// =============================================================================
// Readable Trait - Type-erased access for published outputs
// =============================================================================

/// A single timestamped reading of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// The value, serialized.
    pub value: serde_json::Value,
    /// When the value was last updated.
    pub timestamp: DateTime<Utc>,
}

/// Type-erased view of anything that can be published as an output.
///
/// Orchestrators collect `Arc<dyn Readable>` from every strategy so that
/// external consumers can read results without knowing concrete types.
pub trait Readable: Send + Sync {
    /// Unique name of the value.
    fn name(&self) -> String;

    /// Current value with its timestamp.
    fn read(&self) -> DaeResult<Reading>;

    /// Current value as f64, if it is numeric.
    fn value_as_f64(&self) -> Option<f64>;

    /// Metadata snapshot.
    fn metadata(&self) -> ObservableMetadata;
}

impl Debug for dyn Readable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readable")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Observable<T>
// =============================================================================

/// A thread-safe, observable value with change notifications.
///
/// Clones share the same watch channel and metadata.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<ObservableSharedState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Observable")
            .field("metadata", &shared.metadata)
            .field("has_validator", &shared.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Metadata for an observable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Name (unique within an orchestrator's readable set).
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Physical units (e.g., "counts", "µAh").
    pub units: Option<String>,

    /// Number of decimal places consumers should display.
    #[serde(default)]
    pub precision: Option<usize>,

    /// Whether client-side `set()` calls are rejected.
    ///
    /// The device side can still update the value with `publish()`.
    pub read_only: bool,
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            shared: Arc::new(RwLock::new(ObservableSharedState {
                metadata: ObservableMetadata {
                    name: name.into(),
                    description: None,
                    units: None,
                    precision: None,
                    read_only: false,
                },
                validator: None,
                last_updated: Utc::now(),
            })),
        }
    }

    /// Add a description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Add units.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(units.into());
        self
    }

    /// Set display precision.
    pub fn with_precision(self, precision: usize) -> Self {
        self.shared.write().metadata.precision = Some(precision);
        self
    }

    /// Mark as read-only for clients.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Add a custom validator function.
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> DaeResult<()> + Send + Sync + 'static,
    {
        self.shared.write().validator = Some(Arc::new(validator));
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Get the name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Get the metadata (returns a clone).
    pub fn metadata(&self) -> ObservableMetadata {
        self.shared.read().metadata.clone()
    }

    /// Time of the last update.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.shared.read().last_updated
    }

    /// Validate a value without setting it.
    ///
    /// Returns error if the observable is read-only or validation fails.
    pub fn validate(&self, value: &T) -> DaeResult<()> {
        let guard = self.shared.read();
        if guard.metadata.read_only {
            return Err(DaeError::InvalidValue {
                channel: guard.metadata.name.clone(),
                reason: "read-only".into(),
            });
        }

        if let Some(validator) = &guard.validator {
            validator(value)?;
        }

        Ok(())
    }

    /// Set a new value, notifying all subscribers.
    pub fn set(&self, value: T) -> DaeResult<()> {
        self.validate(&value)?;
        self.publish(value);
        Ok(())
    }

    /// Update the value from the device side, bypassing validation and the
    /// read-only flag.
    pub fn publish(&self, value: T) {
        self.shared.write().last_updated = Utc::now();
        self.sender.send_replace(value);
    }

    /// Modify the value in place from the device side.
    pub fn publish_modify<F>(&self, modify: F)
    where
        F: FnOnce(&mut T),
    {
        self.shared.write().last_updated = Utc::now();
        self.sender.send_modify(modify);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Wait until `predicate` holds for the current or a future value.
    ///
    /// With `timeout = None` this waits indefinitely. With `Some(limit)` it
    /// returns [`DaeError::TransitionTimeout`] once `limit` elapses.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Option<Duration>) -> DaeResult<T>
    where
        F: FnMut(&T) -> bool + Send,
    {
        let name = self.name();
        let mut rx = self.sender.subscribe();
        let closed_name = name.clone();
        let wait = async move {
            let value = rx
                .wait_for(predicate)
                .await
                .map_err(|_| DaeError::Hardware(format!("'{}' closed", closed_name)))?;
            Ok::<T, DaeError>(value.clone())
        };

        match timeout {
            None => wait.await,
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                DaeError::TransitionTimeout {
                    channel: name,
                    timeout: limit,
                }
            })?,
        }
    }
}

impl<T> Readable for Observable<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn name(&self) -> String {
        Observable::name(self)
    }

    fn read(&self) -> DaeResult<Reading> {
        Ok(Reading {
            value: serde_json::to_value(self.get())?,
            timestamp: self.last_updated(),
        })
    }

    fn value_as_f64(&self) -> Option<f64> {
        serde_json::to_value(self.get()).ok()?.as_f64()
    }

    fn metadata(&self) -> ObservableMetadata {
        Observable::metadata(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_observable() {
        let obs = Observable::new("test", 42i64);
        assert_eq!(obs.get(), 42);
        obs.set(100).unwrap();
        assert_eq!(obs.get(), 100);
    }

    #[test]
    fn test_validator_rejects() {
        let obs = Observable::new("periods", 1i64).with_validator(|v| {
            if *v < 1 {
                return Err(DaeError::InvalidValue {
                    channel: "periods".into(),
                    reason: "must be positive".into(),
                });
            }
            Ok(())
        });
        assert!(obs.set(0).is_err());
        assert_eq!(obs.get(), 1);
        assert!(obs.set(3).is_ok());
    }

    #[test]
    fn test_read_only_allows_publish() {
        let obs = Observable::new("good_frames", 0i64).read_only();
        assert!(obs.set(5).is_err());
        obs.publish(5);
        assert_eq!(obs.get(), 5);
    }

    #[test]
    fn test_readable_reports_json_and_f64() {
        let obs = Observable::new("intensity", 0.25f64).with_precision(6);
        let reading = Readable::read(&obs).unwrap();
        assert_eq!(reading.value, serde_json::json!(0.25));
        assert_eq!(obs.value_as_f64(), Some(0.25));
        assert_eq!(Readable::metadata(&obs).precision, Some(6));

        let ints = Observable::new("integrals", vec![1i64, 2]);
        assert_eq!(ints.value_as_f64(), None);
    }

    #[tokio::test]
    async fn test_subscription() {
        let obs = Observable::new("test", 0i64);
        let mut rx = obs.subscribe();

        obs.set(42).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
    }

    #[tokio::test]
    async fn test_wait_for_already_satisfied() {
        let obs = Observable::new("frames", 10i64);
        let value = obs.wait_for(|v| *v >= 5, None).await.unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test]
    async fn test_wait_for_future_value() {
        let obs = Observable::new("frames", 0i64);
        let writer = obs.clone();
        tokio::spawn(async move {
            for i in 1..=5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                writer.publish(i);
            }
        });
        let value = obs
            .wait_for(|v| *v >= 5, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let obs = Observable::new("run_state", 0i64);
        let err = obs
            .wait_for(|v| *v == 1, Some(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("run_state"));
    }
}
