use tracing::{debug, info, warn};

use crate::bridge::{
    ControlAction, DeleteStepPayload, HostCommand, HostMessage, HostSink, InputAnswer,
    ReorderPayload, ReorderedStep,
};
use crate::capture::{EventCapture, ListenerRegistry, RawEvent};
use crate::config::RecorderConfig;
use crate::dom::Document;
use crate::error::{RecorderError, Result};
use crate::lifecycle::{transition, LifecycleAction, RecordingState};
use crate::overlay::{InputResponse, Overlay};
use crate::sequence::{StepChange, StepSequence};
use crate::step::{now_millis, PageContext, PersistedWorkflow, Step};

/// Owned recording context: lifecycle state, listener flags, the live step sequence and
/// the overlay, reporting every change to the host through `S`.
///
/// Everything runs on one logical thread; handlers take `&mut self` and complete before
/// the next event is processed.
pub struct RecorderContext<S: HostSink> {
    name: String,
    session_id: String,
    state: RecordingState,
    listeners: ListenerRegistry,
    capture: EventCapture,
    sequence: StepSequence,
    overlay: Overlay,
    sink: S,
    page: PageContext,
    started_at: u64,
}

impl<S: HostSink> RecorderContext<S> {
    pub fn new(name: impl Into<String>, config: RecorderConfig, sink: S) -> Self {
        Self {
            name: name.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            state: RecordingState::Idle,
            listeners: ListenerRegistry::new(),
            capture: EventCapture::new(config),
            sequence: StepSequence::new(),
            overlay: Overlay::new(),
            sink,
            page: PageContext::default(),
            started_at: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &RecorderConfig {
        self.capture.config()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn sequence(&self) -> &StepSequence {
        &self.sequence
    }

    pub fn steps(&self) -> &[Step] {
        self.sequence.steps()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Sets the page the recorder is attached to.
    pub fn set_page(&mut self, page: PageContext) {
        self.page = page;
    }

    /// Start recording
    pub fn start(&mut self) -> Result<()> {
        self.begin_recording(true)
    }

    /// Stop recording. Returns the finished session in artifact form; the live view is
    /// cleared afterwards.
    pub fn finish(&mut self) -> Result<PersistedWorkflow> {
        self.end_recording(true)
    }

    /// Removes the most recent step from the live view and asks the host to step back.
    ///
    /// An input step still held by the debounce window was never reported, so it is
    /// dropped without notifying the host.
    pub fn undo(&mut self) -> Result<Option<Step>> {
        self.state = transition(self.state, LifecycleAction::Undo)?;

        if let Some(held) = self.capture.flush_pending() {
            debug!("Undo dropped an unreported input step");
            return Ok(Some(held));
        }

        let removed = self.sequence.pop_last();
        if let Some(step) = &removed {
            self.overlay.pop_step();
            self.overlay.print(format!(
                "Removed step {}: {}",
                step.sequence_index() + 1,
                step.label()
            ));
        }
        self.sink.send(HostMessage::control(ControlAction::Back));
        Ok(removed)
    }

    /// Detaches every listener, notifies the host and starts the grace countdown.
    ///
    /// Safe to call in any state and any number of times; only the first call notifies.
    /// Returns the number of countdown units started, zero when already closed.
    pub fn close(&mut self) -> u32 {
        if self.state.is_capturing() {
            self.flush_input();
        }
        let detached = self.listeners.detach_all();
        self.overlay.cancel_input();

        match transition(self.state, LifecycleAction::Close) {
            Ok(next) => self.state = next,
            Err(e) => {
                debug!("Ignoring close: {}", e);
                return 0;
            }
        }

        info!(
            "Closing recorder session {} ({} listeners detached)",
            self.session_id, detached
        );
        self.overlay.set_recording(false);
        self.sink.send(HostMessage::control(ControlAction::Close));
        let units = self.config().close_grace_units;
        self.overlay.begin_countdown(units);
        units
    }

    /// Advances the close countdown by one unit.
    pub fn tick_close(&mut self) -> Option<u32> {
        if self.overlay.is_torn_down() {
            return None;
        }
        self.overlay.tick()
    }

    /// Runs the close countdown to completion, one tick per configured unit.
    pub async fn run_close_grace(&mut self) {
        let unit = self.config().close_grace_unit();
        while !self.overlay.is_torn_down() && self.overlay.countdown().is_some() {
            tokio::time::sleep(unit).await;
            self.tick_close();
        }
    }

    /// Feeds one raw document event through capture. Returns the steps it produced.
    ///
    /// A `Load` replaces the document: after its navigation step is recorded every
    /// listener is dropped and the overlay unmounted until
    /// [`restore_after_navigation`](Self::restore_after_navigation).
    pub fn handle_event(&mut self, doc: &Document, event: &RawEvent, now: u64) -> Vec<Step> {
        if let Some(url) = event.navigation_url() {
            self.page = PageContext::top_level(url);
        }
        let steps = self.capture_event(doc, event, now);
        if matches!(event, RawEvent::Load { .. }) {
            let detached = self.listeners.detach_all();
            self.overlay.unmount();
            debug!("Document replaced, {} listeners dropped", detached);
        }
        steps
    }

    fn capture_event(&mut self, doc: &Document, event: &RawEvent, now: u64) -> Vec<Step> {
        if !self.state.is_capturing() {
            debug!("Ignoring {} while {}", event.listener(), self.state);
            return Vec::new();
        }
        if !self.listeners.is_attached(event.listener()) {
            debug!("No '{}' listener attached", event.listener());
            return Vec::new();
        }

        let steps = self.capture.capture(doc, event, &self.page, now);
        steps.into_iter().map(|step| self.append(step)).collect()
    }

    /// Emits an input step whose debounce window has elapsed.
    pub fn poll(&mut self, now: u64) -> Option<Step> {
        if !self.state.is_capturing() {
            return None;
        }
        let step = self.capture.flush_due(now)?;
        Some(self.append(step))
    }

    /// Appends a caller-built step while recording.
    pub fn record_custom(&mut self, step: Step) -> Result<Step> {
        if !self.state.is_capturing() {
            return Err(RecorderError::NotRecording);
        }
        self.flush_input();
        Ok(self.append(step))
    }

    /// Deletes the step at `index` and notifies the host.
    pub fn delete_step(&mut self, index: usize) -> Result<Step> {
        self.require_recording()?;
        self.flush_input();
        let (step, change) = self.sequence.remove(index)?;
        self.overlay.remove_step(index);
        self.overlay.dismiss_warning();
        self.report(change);
        Ok(step)
    }

    /// Moves the step at `from` to `to`.
    ///
    /// A move across a navigation step, or of a navigation step, is rejected: the
    /// sequence is left as it was, the overlay shows a warning and the host hears
    /// nothing.
    pub fn move_step(&mut self, from: usize, to: usize) -> Result<()> {
        self.require_recording()?;
        self.flush_input();
        match self.sequence.move_step(from, to) {
            Ok(Some(change)) => {
                self.overlay.move_step(from, to);
                self.overlay.dismiss_warning();
                self.report(change);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                if e.is_boundary_violation() {
                    self.overlay
                        .warn("Steps cannot be moved across a page navigation");
                }
                Err(e)
            }
        }
    }

    /// Re-attaches listeners and re-renders the overlay after the page was replaced.
    ///
    /// Returns the commands that rebuild the overlay in the new page. Listener
    /// attachment is idempotent, so a second call attaches nothing.
    pub fn restore_after_navigation(&mut self) -> Vec<HostCommand> {
        if self.state.is_closed() {
            return Vec::new();
        }
        let attached = self.listeners.attach_all();
        if attached > 0 {
            debug!("Re-attached {} listeners", attached);
        }
        self.overlay.remount()
    }

    /// Applies a command from the host controller.
    ///
    /// `RequestInput` returns a handle that resolves once the human submits an answer.
    pub fn apply_command(&mut self, command: HostCommand) -> Result<Option<InputResponse>> {
        if self.state.is_closed() {
            warn!("Ignoring host command after close: {:?}", command);
            return Ok(None);
        }
        match command {
            HostCommand::SetRecording { recording } => {
                match (recording, self.state) {
                    (true, RecordingState::Idle) => self.begin_recording(false)?,
                    (false, RecordingState::Recording) => {
                        self.end_recording(false)?;
                    }
                    _ => self.overlay.set_recording(recording),
                }
                Ok(None)
            }
            HostCommand::AddStep { action, locator } => {
                self.overlay.push_step(action, locator);
                Ok(None)
            }
            HostCommand::Output { text } => {
                self.overlay.print(text);
                Ok(None)
            }
            HostCommand::RequestInput(request) => Ok(Some(self.overlay.request_input(request))),
        }
    }

    /// Submits the human's answer to the open input request and forwards it to the host.
    pub fn submit_input(&mut self, answer: InputAnswer) -> Result<()> {
        let answer = self.overlay.submit(answer)?;
        self.sink.send(HostMessage::SubmitOverlayInput(answer));
        Ok(())
    }

    /// Asks the host to refresh its view of the page.
    pub fn request_update(&self) {
        self.sink.send(HostMessage::control(ControlAction::Update));
    }

    /// The live sequence in artifact form.
    pub fn to_persisted(&self) -> PersistedWorkflow {
        let mut workflow =
            PersistedWorkflow::new(self.name.clone(), self.session_id.clone(), self.started_at);
        workflow.steps = self
            .sequence
            .iter()
            .map(|step| step.to_persisted(self.config().tab_id))
            .collect();
        workflow
    }

    fn begin_recording(&mut self, notify: bool) -> Result<()> {
        self.state = transition(self.state, LifecycleAction::Start)?;
        self.session_id = uuid::Uuid::new_v4().to_string();
        self.started_at = now_millis();
        info!("Starting step recording (session {})", self.session_id);

        self.listeners.attach_all();
        self.capture.discard_pending();
        self.sequence.clear();
        self.overlay.dismiss_warning();
        self.overlay.set_recording(true);
        self.overlay.print("Recording started.");
        if notify {
            self.sink.send(HostMessage::control(ControlAction::Start));
        }

        if self.config().record_initial_navigation && !self.page.url.is_empty() {
            let step = Step::navigation(self.page.url.clone(), self.started_at);
            self.append(step);
        }
        Ok(())
    }

    fn end_recording(&mut self, notify: bool) -> Result<PersistedWorkflow> {
        self.state = transition(self.state, LifecycleAction::Finish)?;
        self.flush_input();

        let mut workflow = self.to_persisted();
        workflow.end_time = Some(now_millis());
        info!(
            "Stopped step recording (session {}, {} steps)",
            self.session_id,
            workflow.steps.len()
        );

        self.sequence.clear();
        self.overlay.clear_steps();
        self.overlay.set_recording(false);
        self.overlay.print("Recording stopped.");
        if notify {
            self.sink.send(HostMessage::control(ControlAction::Finish));
        }
        Ok(workflow)
    }

    fn require_recording(&self) -> Result<()> {
        if self.state.is_capturing() {
            Ok(())
        } else {
            Err(RecorderError::NotRecording)
        }
    }

    fn flush_input(&mut self) {
        if let Some(step) = self.capture.flush_pending() {
            self.append(step);
        }
    }

    fn append(&mut self, mut step: Step) -> Step {
        step.set_sequence_index(self.sequence.len());
        debug!("Recorded step {}: {}", step.sequence_index(), step.label());
        let change = self.sequence.push(step.clone());
        self.report(change);
        step
    }

    /// Tells the host about a change already applied to the sequence.
    fn report(&self, change: StepChange) {
        let message = match change {
            StepChange::Inserted { index } => self.sequence.get(index).map(HostMessage::from_step),
            StepChange::Deleted { index } => {
                Some(HostMessage::DeleteStep(DeleteStepPayload { index }))
            }
            StepChange::Moved { from, to } => self.sequence.get(to).map(|step| {
                HostMessage::ReorderSteps(ReorderPayload {
                    step: ReorderedStep {
                        action: step.label(),
                        css_selector: step
                            .locator()
                            .map(|l| l.css_selector.clone())
                            .unwrap_or_default(),
                        original_index: from,
                        new_index: to,
                    },
                })
            }),
        };
        if let Some(message) = message {
            self.sink.send(message);
        }
    }
}
