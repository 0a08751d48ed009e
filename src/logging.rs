//! Subscriber setup for the `tracing` events emitted while counting.
//!
//! The `[application]` table picks the level and the line layout. `RUST_LOG`,
//! when set, replaces the configured level. The spans opened by `stage`,
//! `trigger` and `unstage` are reported when they close, so each point's
//! duration appears in the log.
//!
//! ```no_run
//! use rust_dae::{config::DaeConfig, logging};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = DaeConfig::load()?;
//! logging::init(&config.application)?;
//! tracing::info!(unit = "dae", "ready");
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::ApplicationConfig;

/// Layout of each log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Filter passing `level` and everything more severe.
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    let level: Level = level
        .parse()
        .map_err(|_| anyhow!("Invalid log level '{}'", level))?;
    Ok(EnvFilter::new(level.as_str().to_lowercase()))
}

/// Install the global subscriber.
///
/// Returns `Ok(())` without changes when a subscriber is already installed.
pub fn init(application: &ApplicationConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&application.log_level)?,
    };

    let layer = match application.log_format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .or_else(|err| {
            if tracing::dispatcher::has_been_set() {
                Ok(())
            } else {
                Err(anyhow!("Failed to install tracing subscriber: {}", err))
            }
        })
}
