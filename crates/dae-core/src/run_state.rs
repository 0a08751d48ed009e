//! Run state reported by the acquisition electronics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DaeError;

/// Hardware run state. Read-only to software; only trigger actions change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Not running; ready to begin.
    Setup,
    /// Counting.
    Running,
    /// Run open, counting suspended.
    Paused,
    /// Counting enabled but waiting on an external condition.
    Waiting,
    /// Counting enabled but vetoed.
    Vetoing,
    /// Run ending.
    Ending,
    /// Data being saved.
    Saving,
    /// Transitioning to running.
    Resuming,
    /// Transitioning to paused.
    Pausing,
    /// Run beginning.
    Beginning,
    /// Run being discarded.
    Aborting,
    /// Settings being updated.
    Updating,
    /// Data being stored.
    Storing,
    /// Electronics processing.
    Processing,
    /// Configuration changing.
    Changing,
}

impl RunState {
    /// All states, in hardware enumeration order.
    pub const ALL: [RunState; 15] = [
        RunState::Processing,
        RunState::Setup,
        RunState::Running,
        RunState::Paused,
        RunState::Waiting,
        RunState::Vetoing,
        RunState::Ending,
        RunState::Saving,
        RunState::Resuming,
        RunState::Pausing,
        RunState::Beginning,
        RunState::Aborting,
        RunState::Updating,
        RunState::Storing,
        RunState::Changing,
    ];

    /// States in which the unit is acquiring (or ready to acquire) for the
    /// current counting window.
    pub fn is_counting(self) -> bool {
        matches!(
            self,
            RunState::Running | RunState::Waiting | RunState::Vetoing
        )
    }

    /// Upper-case hardware name.
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Setup => "SETUP",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Waiting => "WAITING",
            RunState::Vetoing => "VETOING",
            RunState::Ending => "ENDING",
            RunState::Saving => "SAVING",
            RunState::Resuming => "RESUMING",
            RunState::Pausing => "PAUSING",
            RunState::Beginning => "BEGINNING",
            RunState::Aborting => "ABORTING",
            RunState::Updating => "UPDATING",
            RunState::Storing => "STORING",
            RunState::Processing => "PROCESSING",
            RunState::Changing => "CHANGING",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = DaeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DaeError::InvalidValue {
                channel: "run_state".into(),
                reason: format!("unknown run state '{}'", s),
            })
    }
}

/// Options for beginning a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BeginRunExFlags {
    /// Begin and start counting immediately.
    Running = 0,
    /// Begin in the paused state.
    BeginPaused = 1,
    /// Begin with delayed start.
    BeginDelayed = 2,
}
