//! Event capture: turns raw document events into steps.
//!
//! Handlers never fail outward. A target that cannot produce a step (a non-form element
//! reaching the input handler, an element inside the overlay, a node that no longer
//! exists) is dropped with a debug log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, trace};

use crate::config::RecorderConfig;
use crate::dom::{Document, DomNode, ElementRef, NodeId};
use crate::keys::{normalize_key, Modifiers};
use crate::selector::synthesize;
use crate::step::{PageContext, Step, StepPayload};

/// Document-level event streams the recorder listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    Click,
    Input,
    Change,
    KeyDown,
    HistoryChange,
    Load,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 6] = [
        ListenerKind::Click,
        ListenerKind::Input,
        ListenerKind::Change,
        ListenerKind::KeyDown,
        ListenerKind::HistoryChange,
        ListenerKind::Load,
    ];
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerKind::Click => "click",
            ListenerKind::Input => "input",
            ListenerKind::Change => "change",
            ListenerKind::KeyDown => "keydown",
            ListenerKind::HistoryChange => "popstate",
            ListenerKind::Load => "load",
        };
        f.write_str(name)
    }
}

/// Attached-flags per listener kind. Attaching twice or detaching a detached listener is
/// a no-op that returns `false`.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    attached: BTreeSet<ListenerKind>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, kind: ListenerKind) -> bool {
        let added = self.attached.insert(kind);
        if !added {
            trace!("Listener '{}' already attached", kind);
        }
        added
    }

    pub fn detach(&mut self, kind: ListenerKind) -> bool {
        self.attached.remove(&kind)
    }

    /// Attaches every listener not yet attached; returns how many were added.
    pub fn attach_all(&mut self) -> usize {
        ListenerKind::ALL
            .into_iter()
            .filter(|kind| self.attach(*kind))
            .count()
    }

    /// Detaches every listener; returns how many were removed.
    pub fn detach_all(&mut self) -> usize {
        ListenerKind::ALL
            .into_iter()
            .filter(|kind| self.detach(*kind))
            .count()
    }

    pub fn is_attached(&self, kind: ListenerKind) -> bool {
        self.attached.contains(&kind)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

/// A raw event as the document delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    Click {
        target: NodeId,
    },
    Input {
        target: NodeId,
    },
    Change {
        target: NodeId,
    },
    /// `target` is `None` when no element has focus; the key press is attributed to
    /// `<body>`.
    KeyDown {
        target: Option<NodeId>,
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    HistoryChange {
        url: String,
    },
    Load {
        url: String,
    },
}

impl RawEvent {
    pub fn listener(&self) -> ListenerKind {
        match self {
            RawEvent::Click { .. } => ListenerKind::Click,
            RawEvent::Input { .. } => ListenerKind::Input,
            RawEvent::Change { .. } => ListenerKind::Change,
            RawEvent::KeyDown { .. } => ListenerKind::KeyDown,
            RawEvent::HistoryChange { .. } => ListenerKind::HistoryChange,
            RawEvent::Load { .. } => ListenerKind::Load,
        }
    }

    pub fn navigation_url(&self) -> Option<&str> {
        match self {
            RawEvent::HistoryChange { url } | RawEvent::Load { url } => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingInput {
    target: NodeId,
    step: Step,
    last_event_at: u64,
}

/// Converts raw events into steps according to the recorder configuration.
#[derive(Debug, Clone)]
pub struct EventCapture {
    config: RecorderConfig,
    pending: Option<PendingInput>,
}

impl EventCapture {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn has_pending_input(&self) -> bool {
        self.pending.is_some()
    }

    /// Steps produced by `event`, in emission order.
    ///
    /// With input debouncing enabled, an input step is held back until a different field
    /// is edited, another step is captured, or [`EventCapture::flush_due`] finds its
    /// window elapsed. Without it, each raw input event yields one step immediately.
    pub fn capture(
        &mut self,
        doc: &Document,
        event: &RawEvent,
        page: &PageContext,
        now: u64,
    ) -> Vec<Step> {
        if let (RawEvent::Input { target }, Some(window)) = (event, self.config.input_debounce_ms) {
            return self.capture_debounced_input(doc, *target, page, now, window);
        }

        let Some(step) = self.capture_one(doc, event, page, now) else {
            return Vec::new();
        };
        let mut steps = Vec::with_capacity(2);
        steps.extend(self.flush_pending());
        steps.push(step);
        steps
    }

    /// Releases the held input step when its debounce window has elapsed.
    pub fn flush_due(&mut self, now: u64) -> Option<Step> {
        let window = self.config.input_debounce_ms?;
        let due = self
            .pending
            .as_ref()
            .is_some_and(|pending| now.saturating_sub(pending.last_event_at) >= window);
        if due {
            self.flush_pending()
        } else {
            None
        }
    }

    /// Releases the held input step regardless of its window.
    pub fn flush_pending(&mut self) -> Option<Step> {
        self.pending.take().map(|pending| pending.step)
    }

    /// Drops the held input step without emitting it.
    pub fn discard_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("Discarded pending input step");
        }
    }

    fn capture_debounced_input(
        &mut self,
        doc: &Document,
        target: NodeId,
        page: &PageContext,
        now: u64,
        window: u64,
    ) -> Vec<Step> {
        let Some(step) = self.input_step(doc, target, page, now) else {
            return Vec::new();
        };
        let coalesce = self.pending.as_ref().is_some_and(|pending| {
            pending.target == target && now.saturating_sub(pending.last_event_at) < window
        });
        let flushed = if coalesce {
            trace!("Coalescing input on {:?}", target);
            None
        } else {
            self.flush_pending()
        };
        self.pending = Some(PendingInput {
            target,
            step,
            last_event_at: now,
        });
        flushed.into_iter().collect()
    }

    fn capture_one(
        &self,
        doc: &Document,
        event: &RawEvent,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        match event {
            RawEvent::Click { target } => self.click_step(doc, *target, page, now),
            RawEvent::Input { target } => self.input_step(doc, *target, page, now),
            RawEvent::Change { target } => self.change_step(doc, *target, page, now),
            RawEvent::KeyDown {
                target,
                key,
                modifiers,
            } => self.key_step(doc, *target, key, *modifiers, page, now),
            RawEvent::HistoryChange { url } | RawEvent::Load { url } => {
                if !self.config.record_navigation {
                    return None;
                }
                debug!("Captured navigation to {}", url);
                Some(Step::navigation(url.clone(), now))
            }
        }
    }

    /// Resolves `target` to an element outside the overlay.
    fn recordable<'d>(&self, doc: &'d Document, target: NodeId) -> Option<ElementRef<'d>> {
        let Some(element) = doc.element(target) else {
            debug!("Dropping event for missing element {:?}", target);
            return None;
        };
        if let Some(overlay) = doc.by_id(&self.config.overlay_root_id) {
            if element.is_within(overlay) {
                trace!("Ignoring event inside the recorder overlay");
                return None;
            }
        }
        Some(element)
    }

    fn build(
        &self,
        element: &ElementRef<'_>,
        payload: StepPayload,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        let tag = element.tag_name();
        match Step::interaction(payload, synthesize(element), page, tag, now) {
            Ok(step) => {
                debug!("Captured {} on {}", step.kind(), step.element_tag);
                Some(step)
            }
            Err(e) => {
                debug!("Dropping step: {}", e);
                None
            }
        }
    }

    fn click_step(
        &self,
        doc: &Document,
        target: NodeId,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        if !self.config.record_clicks {
            return None;
        }
        let element = self.recordable(doc, target)?;
        let element_text = truncate_chars(
            element.text_content().trim(),
            self.config.max_element_text_len,
        );
        self.build(&element, StepPayload::Click { element_text }, page, now)
    }

    fn input_step(
        &self,
        doc: &Document,
        target: NodeId,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        if !self.config.record_inputs {
            return None;
        }
        let element = self.recordable(doc, target)?;
        if element.is_select() {
            debug!("Ignoring input event on a select; its change event is recorded");
            return None;
        }
        let Some(value) = element.value() else {
            debug!("Dropping input event on non-form element {}", element.tag_name());
            return None;
        };
        let value = if element.input_type().as_deref() == Some("password") {
            self.config.password_mask.clone()
        } else {
            value
        };
        self.build(&element, StepPayload::Input { value }, page, now)
    }

    fn change_step(
        &self,
        doc: &Document,
        target: NodeId,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        if !self.config.record_changes {
            return None;
        }
        let element = self.recordable(doc, target)?;
        if !element.is_select() {
            // Text fields also fire change on blur; their values come through input.
            return None;
        }
        let (selected_value, selected_text) = element
            .selected_option()
            .map(|(value, label)| (value, label.trim().to_string()))
            .unwrap_or_default();
        self.build(
            &element,
            StepPayload::SelectChange {
                selected_value,
                selected_text,
            },
            page,
            now,
        )
    }

    fn key_step(
        &self,
        doc: &Document,
        target: Option<NodeId>,
        key: &str,
        modifiers: Modifiers,
        page: &PageContext,
        now: u64,
    ) -> Option<Step> {
        if !self.config.record_keys {
            return None;
        }
        let key = normalize_key(key, modifiers, self.config.platform)?;
        let element = self.recordable(doc, target.unwrap_or_else(|| doc.body()))?;
        self.build(&element, StepPayload::KeyPress { key }, page, now)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
