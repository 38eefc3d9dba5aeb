//! DOM step recorder
//!
//! This crate records a human's interactions with a rendered document (clicks, text
//! entry, selections, key presses and navigations) as an ordered, editable sequence of
//! steps that can be replayed or handed to an automation agent. Each step carries two
//! independent locators for its element. Navigation steps partition the sequence and
//! cannot be crossed by reordering.
//!
//! The recorder talks to its host controller only through a [`HostSink`]. The finished
//! session can be saved as a JSON artifact for later playback.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod dom;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod overlay;
pub mod recorder;
pub mod selector;
pub mod sequence;
pub mod step;

pub use bridge::{
    ChannelSink, ControlAction, HostCommand, HostMessage, HostSink, InputAnswer, InputMode,
    InputRequest, MemorySink,
};
pub use capture::{EventCapture, ListenerKind, ListenerRegistry, RawEvent};
pub use config::RecorderConfig;
pub use dom::{Document, DocumentSpec, DomError, DomNode, ElementSpec, NodeId};
pub use error::*;
pub use keys::{normalize_key, Modifiers, Platform};
pub use lifecycle::{LifecycleAction, RecordingState};
pub use overlay::{InputResponse, Overlay};
pub use recorder::RecorderContext;
pub use selector::{synthesize, LocatorBundle, LocatorStrategy};
pub use sequence::{StepChange, StepSequence};
pub use step::{PageContext, PersistedStep, PersistedWorkflow, Step, StepKind, StepPayload};
