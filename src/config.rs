//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/dae.toml` by default)
//! 2. environment variables prefixed with `DAE_`, using `__` between
//!    table and key (`DAE_ACQUISITION__FRAMES=500`)
//!
//! Every field has a default, so a file only needs the values that differ.
//!
//! # Example
//! ```no_run
//! use rust_dae::config::DaeConfig;
//!
//! let config = DaeConfig::load()?;
//! config.validate()?;
//! println!("Counting {} frames per point", config.acquisition.frames);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use dae_core::error::{DaeError, DaeResult};
use dae_core::limits::TRANSITION_TIMEOUT;
use dae_core::{Interval, Unit};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::logging::LogFormat;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/dae.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DAE_";

/// Errors from [`DaeConfig::load_validated`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or environment could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    /// Values parsed but are not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] DaeError),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Counting and reduction settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Polarised counting settings
    #[serde(default)]
    pub polarisation: PolarisationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line layout (pretty, compact, json)
    #[serde(default)]
    pub log_format: LogFormat,
}

/// How each point is counted and reduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Detector spectrum numbers to sum
    #[serde(default = "default_detector_spectra")]
    pub detector_spectra: Vec<usize>,
    /// Monitor spectrum numbers to sum
    #[serde(default = "default_monitor_spectra")]
    pub monitor_spectra: Vec<usize>,
    /// Good frames to count per point
    #[serde(default = "default_frames")]
    pub frames: i64,
    /// Count each point into a hardware period (true) or its own run (false)
    #[serde(default = "default_true")]
    pub periods: bool,
    /// End runs (true) or abort them (false)
    #[serde(default = "default_true")]
    pub save_run: bool,
    /// Bound on run-state and period confirmation waits, in milliseconds
    #[serde(default = "default_transition_timeout_ms")]
    pub transition_timeout_ms: u64,
    /// Points in the scan, when known; checked against the unit's periods
    #[serde(default)]
    pub points: Option<usize>,
}

/// Settings for two-state polarised counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarisationConfig {
    /// Actuator positions for the "up" and "down" windows
    #[serde(default = "default_flipper_states")]
    pub flipper_states: [f64; 2],
    /// Wavelength bands as `[lower, upper]` in Å
    #[serde(default = "default_intervals")]
    pub intervals: Vec<[f64; 2]>,
    /// Total flight path in metres
    #[serde(default = "default_flight_path")]
    pub flight_path_m: f64,
}

// Default value functions
fn default_name() -> String {
    "rust-dae".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_detector_spectra() -> Vec<usize> {
    vec![1]
}

fn default_monitor_spectra() -> Vec<usize> {
    vec![2]
}

fn default_frames() -> i64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_transition_timeout_ms() -> u64 {
    TRANSITION_TIMEOUT.as_millis() as u64
}

fn default_flipper_states() -> [f64; 2] {
    [0.0, 1.0]
}

fn default_intervals() -> Vec<[f64; 2]> {
    vec![[0.0, 5.1]]
}

fn default_flight_path() -> f64 {
    10.0
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            detector_spectra: default_detector_spectra(),
            monitor_spectra: default_monitor_spectra(),
            frames: default_frames(),
            periods: true,
            save_run: true,
            transition_timeout_ms: default_transition_timeout_ms(),
            points: None,
        }
    }
}

impl Default for PolarisationConfig {
    fn default() -> Self {
        Self {
            flipper_states: default_flipper_states(),
            intervals: default_intervals(),
            flight_path_m: default_flight_path(),
        }
    }
}

impl DaeConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `DAE_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Load from `path` and validate.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from(path).map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> DaeResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }
        self.acquisition.validate()?;
        self.polarisation.validate()
    }
}

impl AcquisitionConfig {
    /// Check spectra and counting targets.
    pub fn validate(&self) -> DaeResult<()> {
        if self.detector_spectra.is_empty() {
            return Err(DaeError::Configuration(
                "At least one detector spectrum is required".into(),
            ));
        }
        if self.monitor_spectra.is_empty() {
            return Err(DaeError::Configuration(
                "At least one monitor spectrum is required".into(),
            ));
        }
        if let Some(zero) = self
            .detector_spectra
            .iter()
            .chain(&self.monitor_spectra)
            .find(|&&s| s == 0)
        {
            return Err(DaeError::Configuration(format!(
                "Spectrum {} is the junk spectrum; spectrum numbers start at 1",
                zero
            )));
        }
        if self.frames <= 0 {
            return Err(DaeError::Configuration(format!(
                "frames must be positive, got {}",
                self.frames
            )));
        }
        if self.transition_timeout_ms == 0 {
            return Err(DaeError::Configuration(
                "transition_timeout_ms must be positive".into(),
            ));
        }
        if self.points == Some(0) {
            return Err(DaeError::Configuration(
                "points must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Bound on confirmation waits.
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }
}

impl PolarisationConfig {
    /// Check bands and flight path.
    pub fn validate(&self) -> DaeResult<()> {
        if self.intervals.is_empty() {
            return Err(DaeError::Configuration(
                "At least one wavelength interval is required".into(),
            ));
        }
        self.wavelength_intervals()?;
        if !self.flight_path_m.is_finite() || self.flight_path_m <= 0.0 {
            return Err(DaeError::Configuration(format!(
                "flight_path_m must be positive, got {}",
                self.flight_path_m
            )));
        }
        if self.flipper_states.iter().any(|s| !s.is_finite()) {
            return Err(DaeError::Configuration(format!(
                "flipper_states must be finite, got {:?}",
                self.flipper_states
            )));
        }
        Ok(())
    }

    /// Wavelength bands as intervals in Å.
    pub fn wavelength_intervals(&self) -> DaeResult<Vec<Interval>> {
        self.intervals
            .iter()
            .map(|&[lower, upper]| Interval::new(lower, upper, Unit::Angstrom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DaeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.transition_timeout(), TRANSITION_TIMEOUT);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DaeConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_acquisition_validation() {
        let mut acquisition = AcquisitionConfig::default();
        acquisition.detector_spectra.clear();
        assert!(acquisition.validate().is_err());

        let mut acquisition = AcquisitionConfig::default();
        acquisition.monitor_spectra = vec![0];
        assert!(acquisition.validate().is_err());

        let mut acquisition = AcquisitionConfig::default();
        acquisition.frames = 0;
        assert!(acquisition.validate().is_err());

        let mut acquisition = AcquisitionConfig::default();
        acquisition.points = Some(0);
        assert!(acquisition.validate().is_err());
        acquisition.points = Some(20);
        assert!(acquisition.validate().is_ok());
    }

    #[test]
    fn test_polarisation_validation() {
        let mut polarisation = PolarisationConfig::default();
        polarisation.intervals = vec![[3.0, 2.0]];
        assert!(polarisation.validate().is_err());

        let mut polarisation = PolarisationConfig::default();
        polarisation.flight_path_m = -1.0;
        assert!(polarisation.validate().is_err());

        let polarisation = PolarisationConfig {
            intervals: vec![[0.0, 2.5], [2.5, 5.0]],
            ..PolarisationConfig::default()
        };
        let intervals = polarisation.wavelength_intervals().unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[1].unit(), Unit::Angstrom);
    }
}
