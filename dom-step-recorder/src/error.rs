use thiserror::Error;

use crate::dom::DomError;
use crate::lifecycle::{LifecycleAction, RecordingState};

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Transition '{action}' is not valid from state '{state}'")]
    InvalidTransition {
        state: RecordingState,
        action: LifecycleAction,
    },

    #[error("Recording is not active")]
    NotRecording,

    #[error("Step index {index} is out of range (sequence length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Navigation step at index {index} cannot be moved")]
    NavigationImmutable { index: usize },

    #[error("Moving step {from} to {to} would cross the navigation step at index {boundary}")]
    NavigationBoundary {
        from: usize,
        to: usize,
        boundary: usize,
    },

    #[error("No human input request is pending")]
    NoPendingInput,

    #[error("Input answer does not match the requested mode: expected {expected}, got {got}")]
    InputModeMismatch { expected: String, got: String },

    #[error("Navigation steps carry no element locator")]
    NotAnInteraction,

    #[error("Document error: {0}")]
    Dom(#[from] DomError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    /// Whether the error is a rejected reorder that must leave the sequence untouched.
    pub fn is_boundary_violation(&self) -> bool {
        matches!(
            self,
            RecorderError::NavigationBoundary { .. } | RecorderError::NavigationImmutable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
