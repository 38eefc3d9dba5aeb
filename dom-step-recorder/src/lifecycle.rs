//! Recording lifecycle state machine.
//!
//! ```text
//!   idle --start--> recording --finish--> idle
//!     \               |  ^
//!      \              undo
//!       \--close--> closed <--close--/
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RecorderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    /// Terminal. Listeners are detached and the overlay is being torn down.
    Closed,
}

impl RecordingState {
    /// Capture listeners only emit steps in this state.
    pub fn is_capturing(self) -> bool {
        self == RecordingState::Recording
    }

    pub fn is_closed(self) -> bool {
        self == RecordingState::Closed
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    Finish,
    Undo,
    Close,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Finish => "finish",
            LifecycleAction::Undo => "undo",
            LifecycleAction::Close => "close",
        };
        f.write_str(name)
    }
}

/// Next state for `action` taken in `state`, or `InvalidTransition`.
pub fn transition(state: RecordingState, action: LifecycleAction) -> Result<RecordingState> {
    use LifecycleAction::*;
    use RecordingState::*;

    match (state, action) {
        (Idle, Start) => Ok(Recording),
        (Recording, Finish) => Ok(Idle),
        (Recording, Undo) => Ok(Recording),
        (Idle | Recording, Close) => Ok(Closed),
        _ => Err(RecorderError::InvalidTransition { state, action }),
    }
}
