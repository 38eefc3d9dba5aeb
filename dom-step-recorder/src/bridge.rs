//! Message contract with the host controller.
//!
//! Outbound messages serialize as `{"event": <name>, "payload": {...}}`. The recorder
//! reaches the host only through a [`HostSink`], so tests and the CLI can substitute an
//! in-process queue or a broadcast channel for the browser binding.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::step::{Step, StepPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Finish,
    Back,
    Update,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPayload {
    pub action: ControlAction,
}

/// Element and page fields shared by every element event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTarget {
    pub url: String,
    pub frame_url: String,
    pub xpath: String,
    pub css_selector: String,
    pub element_tag: String,
    /// Position the step was inserted at.
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementClickPayload {
    #[serde(flatten)]
    pub target: ElementTarget,
    pub element_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInputPayload {
    #[serde(flatten)]
    pub target: ElementTarget,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementChangePayload {
    #[serde(flatten)]
    pub target: ElementTarget,
    pub selected_value: String,
    pub selected_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeydownPayload {
    #[serde(flatten)]
    pub target: ElementTarget,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationPayload {
    pub url: String,
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStepPayload {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderedStep {
    /// Overlay label of the moved step.
    pub action: String,
    pub css_selector: String,
    pub original_index: usize,
    pub new_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPayload {
    pub step: ReorderedStep,
}

/// Answer to a human-input request: one string for text and radio modes, a list of
/// strings for checkbox mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputAnswer {
    Text(String),
    Choices(Vec<String>),
}

impl InputAnswer {
    fn shape(&self) -> &'static str {
        match self {
            InputAnswer::Text(_) => "string",
            InputAnswer::Choices(_) => "list",
        }
    }
}

/// Notification from the recorder to the host controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum HostMessage {
    Control(ControlPayload),
    ElementClick(ElementClickPayload),
    ElementInput(ElementInputPayload),
    ElementChange(ElementChangePayload),
    KeydownEvent(KeydownPayload),
    Navigation(NavigationPayload),
    DeleteStep(DeleteStepPayload),
    ReorderSteps(ReorderPayload),
    SubmitOverlayInput(InputAnswer),
}

impl HostMessage {
    pub fn control(action: ControlAction) -> Self {
        HostMessage::Control(ControlPayload { action })
    }

    /// The insert notification for a captured step.
    pub fn from_step(step: &Step) -> Self {
        let (xpath, css_selector) = step
            .locator()
            .map(|l| (l.xpath.clone(), l.css_selector.clone()))
            .unwrap_or_default();
        let target = ElementTarget {
            url: step.url.clone(),
            frame_url: step.frame_url.clone(),
            xpath,
            css_selector,
            element_tag: step.element_tag.clone(),
            sequence_index: step.sequence_index(),
        };
        match step.payload() {
            StepPayload::Navigation => HostMessage::Navigation(NavigationPayload {
                url: step.url.clone(),
                sequence_index: step.sequence_index(),
            }),
            StepPayload::Click { element_text } => HostMessage::ElementClick(ElementClickPayload {
                target,
                element_text: element_text.clone(),
            }),
            StepPayload::Input { value } => HostMessage::ElementInput(ElementInputPayload {
                target,
                value: value.clone(),
            }),
            StepPayload::SelectChange {
                selected_value,
                selected_text,
            } => HostMessage::ElementChange(ElementChangePayload {
                target,
                selected_value: selected_value.clone(),
                selected_text: selected_text.clone(),
            }),
            StepPayload::KeyPress { key } => HostMessage::KeydownEvent(KeydownPayload {
                target,
                key: key.clone(),
            }),
        }
    }

    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            HostMessage::Control(_) => "control",
            HostMessage::ElementClick(_) => "elementClick",
            HostMessage::ElementInput(_) => "elementInput",
            HostMessage::ElementChange(_) => "elementChange",
            HostMessage::KeydownEvent(_) => "keydownEvent",
            HostMessage::Navigation(_) => "navigation",
            HostMessage::DeleteStep(_) => "deleteStep",
            HostMessage::ReorderSteps(_) => "reorderSteps",
            HostMessage::SubmitOverlayInput(_) => "submitOverlayInput",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Text,
    Radio,
    Checkbox,
}

impl InputMode {
    /// Checks that `answer` has the shape this mode expects and only names offered choices.
    pub fn validate(
        self,
        answer: &InputAnswer,
        choices: Option<&[String]>,
    ) -> crate::Result<()> {
        let mismatch = |got: String| crate::RecorderError::InputModeMismatch {
            expected: self.to_string(),
            got,
        };
        let offered = |value: &String| choices.map_or(true, |c| c.contains(value));
        match (self, answer) {
            (InputMode::Text, InputAnswer::Text(_)) => Ok(()),
            (InputMode::Radio, InputAnswer::Text(value)) if offered(value) => Ok(()),
            (InputMode::Checkbox, InputAnswer::Choices(values)) if values.iter().all(offered) => {
                Ok(())
            }
            (InputMode::Radio, InputAnswer::Text(value)) => {
                Err(mismatch(format!("unknown choice '{value}'")))
            }
            (InputMode::Checkbox, InputAnswer::Choices(_)) => {
                Err(mismatch("a list with unknown choices".to_string()))
            }
            (_, answer) => Err(mismatch(answer.shape().to_string())),
        }
    }
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InputMode::Text => "text",
            InputMode::Radio => "radio",
            InputMode::Checkbox => "checkbox",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRequest {
    pub mode: InputMode,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl InputRequest {
    pub fn text(question: impl Into<String>) -> Self {
        Self {
            mode: InputMode::Text,
            question: question.into(),
            placeholder: None,
            choices: None,
        }
    }

    pub fn with_choices(mode: InputMode, question: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            mode,
            question: question.into(),
            placeholder: None,
            choices: Some(choices),
        }
    }
}

/// Command from the host controller that drives the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    SetRecording { recording: bool },
    /// Push a step rendered by the host into the overlay list.
    AddStep { action: String, locator: String },
    /// Append a line to the overlay log.
    Output { text: String },
    RequestInput(InputRequest),
}

/// Outbound capability the recorder depends on.
pub trait HostSink {
    fn send(&self, message: HostMessage);
}

/// In-process queue that keeps every message.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<HostMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message sent so far.
    pub fn messages(&self) -> Vec<HostMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns every queued message.
    pub fn take(&self) -> Vec<HostMessage> {
        match self.messages.lock() {
            Ok(mut messages) => std::mem::take(&mut *messages),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.messages().iter().map(HostMessage::event_name).collect()
    }
}

impl HostSink for MemorySink {
    fn send(&self, message: HostMessage) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
    }
}

/// Broadcasts messages to any number of async subscribers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<HostMessage>,
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
        self.tx.subscribe()
    }

    /// Get a stream of messages
    pub fn event_stream(&self) -> impl Stream<Item = HostMessage> {
        let mut rx = self.tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => yield message,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Host message stream lagged, skipped {} messages", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl HostSink for ChannelSink {
    fn send(&self, message: HostMessage) {
        // No subscribers is not an error; the host may attach later.
        let _ = self.tx.send(message);
    }
}
