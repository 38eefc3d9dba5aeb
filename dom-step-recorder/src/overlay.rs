//! Presentation state of the recorder overlay.
//!
//! Only observable state is modelled: the log, the step list the host renders into the
//! panel, an open human-input request, a transient warning and the close countdown.
//! The overlay survives navigations in this state; a fresh page gets it re-rendered from
//! [`Overlay::restore_commands`].

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::bridge::{HostCommand, InputAnswer, InputRequest};
use crate::error::{RecorderError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedStep {
    pub action: String,
    pub locator: String,
}

#[derive(Debug)]
struct OpenInput {
    request: InputRequest,
    responder: Option<oneshot::Sender<InputAnswer>>,
}

/// Resolves when the human submits the requested input.
#[derive(Debug)]
pub struct InputResponse {
    rx: oneshot::Receiver<InputAnswer>,
}

impl InputResponse {
    /// The submitted answer, or `None` if the request was cancelled or replaced.
    pub async fn wait(self) -> Option<InputAnswer> {
        self.rx.await.ok()
    }
}

#[derive(Debug)]
pub struct Overlay {
    recording: bool,
    mounted: bool,
    log: Vec<String>,
    steps: Vec<RenderedStep>,
    input: Option<OpenInput>,
    warning: Option<String>,
    countdown: Option<u32>,
    torn_down: bool,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            recording: false,
            mounted: true,
            log: Vec::new(),
            steps: Vec::new(),
            input: None,
            warning: None,
            countdown: None,
            torn_down: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn print(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("overlay: {}", text);
        self.log.push(text);
    }

    pub fn steps(&self) -> &[RenderedStep] {
        &self.steps
    }

    pub fn push_step(&mut self, action: impl Into<String>, locator: impl Into<String>) {
        self.steps.push(RenderedStep {
            action: action.into(),
            locator: locator.into(),
        });
    }

    /// Drops the most recently rendered row.
    pub fn pop_step(&mut self) -> Option<RenderedStep> {
        self.steps.pop()
    }

    /// Drops the row at `index`. Rows the host never rendered are ignored.
    pub fn remove_step(&mut self, index: usize) -> Option<RenderedStep> {
        if index < self.steps.len() {
            Some(self.steps.remove(index))
        } else {
            None
        }
    }

    /// Moves the row at `from` so it ends up at `to`.
    pub fn move_step(&mut self, from: usize, to: usize) -> bool {
        if from >= self.steps.len() || to >= self.steps.len() {
            return false;
        }
        let row = self.steps.remove(from);
        self.steps.insert(to, row);
        true
    }

    pub fn clear_steps(&mut self) {
        self.steps.clear();
    }

    pub fn pending_input(&self) -> Option<&InputRequest> {
        self.input.as_ref().map(|open| &open.request)
    }

    /// Opens an input box. A request already open is cancelled.
    pub fn request_input(&mut self, request: InputRequest) -> InputResponse {
        let (tx, rx) = oneshot::channel();
        if self.input.is_some() {
            debug!("Replacing open input request");
        }
        self.input = Some(OpenInput {
            request,
            responder: Some(tx),
        });
        InputResponse { rx }
    }

    /// Resolves the open request with `answer`. A malformed answer leaves it open.
    pub fn submit(&mut self, answer: InputAnswer) -> Result<InputAnswer> {
        let open = self.input.as_ref().ok_or(RecorderError::NoPendingInput)?;
        open.request
            .mode
            .validate(&answer, open.request.choices.as_deref())?;

        if let Some(mut open) = self.input.take() {
            if let Some(responder) = open.responder.take() {
                // The requester may have stopped waiting.
                let _ = responder.send(answer.clone());
            }
        }
        Ok(answer)
    }

    pub fn cancel_input(&mut self) -> bool {
        self.input.take().is_some()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warning = Some(message);
    }

    pub fn dismiss_warning(&mut self) {
        self.warning = None;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// The page holding the overlay went away.
    pub fn unmount(&mut self) {
        self.mounted = false;
    }

    /// Mounts the overlay into a fresh page and returns the commands that re-render it.
    pub fn remount(&mut self) -> Vec<HostCommand> {
        self.mounted = true;
        self.restore_commands()
    }

    /// Commands that rebuild the visible overlay from this state.
    pub fn restore_commands(&self) -> Vec<HostCommand> {
        let mut commands = vec![HostCommand::SetRecording {
            recording: self.recording,
        }];
        commands.extend(
            self.log
                .iter()
                .map(|text| HostCommand::Output { text: text.clone() }),
        );
        commands.extend(self.steps.iter().map(|step| HostCommand::AddStep {
            action: step.action.clone(),
            locator: step.locator.clone(),
        }));
        if let Some(request) = self.pending_input() {
            commands.push(HostCommand::RequestInput(request.clone()));
        }
        commands
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    pub fn begin_countdown(&mut self, units: u32) {
        self.countdown = Some(units);
        if units == 0 {
            self.teardown();
        } else {
            self.print(format!("Closing in {units}..."));
        }
    }

    /// Decrements the countdown; tears the overlay down when it reaches zero.
    pub fn tick(&mut self) -> Option<u32> {
        let remaining = self.countdown?.saturating_sub(1);
        self.countdown = Some(remaining);
        if remaining == 0 {
            self.teardown();
        } else {
            self.print(format!("Closing in {remaining}..."));
        }
        Some(remaining)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        debug!("Tearing down recorder overlay");
        self.input = None;
        self.warning = None;
        self.steps.clear();
        self.mounted = false;
        self.torn_down = true;
    }
}
