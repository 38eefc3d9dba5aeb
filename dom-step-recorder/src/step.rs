use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{RecorderError, Result};
use crate::selector::LocatorBundle;

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The kind of a captured step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigation,
    Click,
    Input,
    SelectChange,
    KeyPress,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::Navigation => "navigation",
            StepKind::Click => "click",
            StepKind::Input => "input",
            StepKind::SelectChange => "select_change",
            StepKind::KeyPress => "key_press",
        };
        f.write_str(name)
    }
}

/// Kind-specific data of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    Navigation,
    Click {
        /// Trimmed visible text, truncated.
        element_text: String,
    },
    Input {
        /// Current field value; masked for password fields.
        value: String,
    },
    SelectChange {
        selected_value: String,
        selected_text: String,
    },
    KeyPress {
        /// Logical key name, e.g. `Enter` or `CmdOrCtrl+C`.
        key: String,
    },
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            StepPayload::Navigation => StepKind::Navigation,
            StepPayload::Click { .. } => StepKind::Click,
            StepPayload::Input { .. } => StepKind::Input,
            StepPayload::SelectChange { .. } => StepKind::SelectChange,
            StepPayload::KeyPress { .. } => StepKind::KeyPress,
        }
    }
}

/// Page context an event was captured in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    pub frame_url: String,
}

impl PageContext {
    /// Context for a top-level document, where the frame URL is the page URL.
    pub fn top_level(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            frame_url: url.clone(),
            url,
        }
    }
}

/// One captured action.
///
/// Navigation steps carry no locator; every other step carries exactly one bundle.
/// The constructors are the only way to build a step, which keeps that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(flatten)]
    payload: StepPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    locator: Option<LocatorBundle>,
    pub url: String,
    pub frame_url: String,
    /// Uppercase tag name, informational only.
    pub element_tag: String,
    pub timestamp: u64,
    sequence_index: usize,
}

impl Step {
    pub fn navigation(url: impl Into<String>, timestamp: u64) -> Self {
        let url = url.into();
        Self {
            payload: StepPayload::Navigation,
            locator: None,
            frame_url: url.clone(),
            url,
            element_tag: String::new(),
            timestamp,
            sequence_index: 0,
        }
    }

    /// Builds a non-navigation step. Navigation payloads are rejected.
    pub fn interaction(
        payload: StepPayload,
        locator: LocatorBundle,
        page: &PageContext,
        element_tag: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self> {
        if payload == StepPayload::Navigation {
            return Err(RecorderError::NotAnInteraction);
        }
        Ok(Self {
            payload,
            locator: Some(locator),
            url: page.url.clone(),
            frame_url: page.frame_url.clone(),
            element_tag: element_tag.into(),
            timestamp,
            sequence_index: 0,
        })
    }

    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &StepPayload {
        &self.payload
    }

    pub fn locator(&self) -> Option<&LocatorBundle> {
        self.locator.as_ref()
    }

    pub fn is_navigation(&self) -> bool {
        self.kind() == StepKind::Navigation
    }

    /// Position in the live sequence; recomputed on every structural change.
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub(crate) fn set_sequence_index(&mut self, index: usize) {
        self.sequence_index = index;
    }

    /// Text shown for this step in the overlay step list.
    pub fn label(&self) -> String {
        match &self.payload {
            StepPayload::Navigation => format!("Navigate to {}", self.url),
            StepPayload::Click { .. } => format!("Click on {}", self.element_tag),
            StepPayload::Input { .. } => "Type text".to_string(),
            StepPayload::SelectChange { selected_text, .. } => {
                format!("Select '{selected_text}'")
            }
            StepPayload::KeyPress { key } => format!("Press {key}"),
        }
    }

    /// Converts to the replay artifact record.
    pub fn to_persisted(&self, tab_id: u64) -> PersistedStep {
        let (xpath, css_selector) = self
            .locator
            .as_ref()
            .map(|l| (l.xpath.clone(), l.css_selector.clone()))
            .unwrap_or_default();
        let target = |element_tag: &str| PersistedTarget {
            timestamp: self.timestamp,
            tab_id,
            url: self.url.clone(),
            frame_url: self.frame_url.clone(),
            xpath: xpath.clone(),
            css_selector: css_selector.clone(),
            element_tag: element_tag.to_string(),
        };

        match &self.payload {
            StepPayload::Navigation => PersistedStep::Navigation {
                timestamp: self.timestamp,
                tab_id,
                url: self.url.clone(),
            },
            StepPayload::Click { element_text } => PersistedStep::Click {
                target: target(&self.element_tag),
                element_text: element_text.clone(),
            },
            StepPayload::Input { value } => PersistedStep::Input {
                target: target(&self.element_tag),
                value: value.clone(),
            },
            StepPayload::SelectChange {
                selected_value,
                selected_text,
            } => PersistedStep::Select {
                target: target(&self.element_tag),
                selected_value: selected_value.clone(),
                selected_text: selected_text.clone(),
            },
            StepPayload::KeyPress { key } => PersistedStep::Keypress {
                target: target(&self.element_tag),
                key: key.clone(),
            },
        }
    }
}

/// Element-bound fields shared by every non-navigation artifact record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTarget {
    pub timestamp: u64,
    pub tab_id: u64,
    pub url: String,
    #[serde(default)]
    pub frame_url: String,
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub css_selector: String,
    #[serde(default)]
    pub element_tag: String,
}

/// Step record in the replay artifact format consumed downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PersistedStep {
    #[serde(rename_all = "camelCase")]
    Navigation {
        timestamp: u64,
        tab_id: u64,
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    Click {
        #[serde(flatten)]
        target: PersistedTarget,
        #[serde(default)]
        element_text: String,
    },
    Input {
        #[serde(flatten)]
        target: PersistedTarget,
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    Select {
        #[serde(flatten)]
        target: PersistedTarget,
        selected_value: String,
        #[serde(default)]
        selected_text: String,
    },
    Keypress {
        #[serde(flatten)]
        target: PersistedTarget,
        key: String,
    },
}

impl TryFrom<PersistedStep> for Step {
    type Error = RecorderError;

    fn try_from(record: PersistedStep) -> Result<Self> {
        let from_target = |target: PersistedTarget, payload: StepPayload| {
            let page = PageContext {
                url: target.url,
                frame_url: target.frame_url,
            };
            Step::interaction(
                payload,
                LocatorBundle::new(target.xpath, target.css_selector),
                &page,
                target.element_tag,
                target.timestamp,
            )
        };

        match record {
            PersistedStep::Navigation { timestamp, url, .. } => Ok(Step::navigation(url, timestamp)),
            PersistedStep::Click {
                target,
                element_text,
            } => from_target(target, StepPayload::Click { element_text }),
            PersistedStep::Input { target, value } => from_target(target, StepPayload::Input { value }),
            PersistedStep::Select {
                target,
                selected_value,
                selected_text,
            } => from_target(
                target,
                StepPayload::SelectChange {
                    selected_value,
                    selected_text,
                },
            ),
            PersistedStep::Keypress { target, key } => from_target(target, StepPayload::KeyPress { key }),
        }
    }
}

/// A finished recording in the replay artifact format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWorkflow {
    pub name: String,
    pub session_id: String,
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub steps: Vec<PersistedStep>,
}

impl PersistedWorkflow {
    pub fn new(name: impl Into<String>, session_id: impl Into<String>, start_time: u64) -> Self {
        Self {
            name: name.into(),
            session_id: session_id.into(),
            start_time,
            end_time: None,
            steps: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the workflow to a JSON file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a workflow from a JSON file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Rebuilds live steps, with sequence indices matching their position.
    pub fn to_steps(&self) -> Result<Vec<Step>> {
        self.steps
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, record)| {
                let mut step = Step::try_from(record)?;
                step.set_sequence_index(index);
                Ok(step)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_step() -> Step {
        Step::interaction(
            StepPayload::Click {
                element_text: "Sign in".to_string(),
            },
            LocatorBundle::new("id(\"login\")", "button[id=\"login\"]"),
            &PageContext::top_level("https://example.com/"),
            "BUTTON",
            1_700_000_000_000,
        )
        .unwrap()
    }

    #[test]
    fn test_navigation_has_no_locator() {
        let step = Step::navigation("https://example.com/", 1);
        assert!(step.is_navigation());
        assert!(step.locator().is_none());
        assert_eq!(step.label(), "Navigate to https://example.com/");
    }

    #[test]
    fn test_interaction_rejects_navigation_payload() {
        let result = Step::interaction(
            StepPayload::Navigation,
            LocatorBundle::new("a", "b"),
            &PageContext::default(),
            "A",
            0,
        );
        assert!(matches!(result, Err(RecorderError::NotAnInteraction)));
    }

    #[test]
    fn test_persisted_click_uses_artifact_field_names() {
        let json = serde_json::to_value(click_step().to_persisted(7)).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["tabId"], 7);
        assert_eq!(json["cssSelector"], "button[id=\"login\"]");
        assert_eq!(json["frameUrl"], "https://example.com/");
        assert_eq!(json["elementTag"], "BUTTON");
        assert_eq!(json["elementText"], "Sign in");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_persisted_select_and_keypress_fields() {
        let page = PageContext::top_level("https://example.com/");
        let select = Step::interaction(
            StepPayload::SelectChange {
                selected_value: "fr".into(),
                selected_text: "France".into(),
            },
            LocatorBundle::new("x", "select"),
            &page,
            "SELECT",
            1,
        )
        .unwrap();
        let json = serde_json::to_value(select.to_persisted(1)).unwrap();
        assert_eq!(json["type"], "select");
        assert_eq!(json["selectedValue"], "fr");
        assert_eq!(json["selectedText"], "France");

        let key = Step::interaction(
            StepPayload::KeyPress { key: "Enter".into() },
            LocatorBundle::new("x", "input"),
            &page,
            "INPUT",
            2,
        )
        .unwrap();
        let json = serde_json::to_value(key.to_persisted(1)).unwrap();
        assert_eq!(json["type"], "keypress");
        assert_eq!(json["key"], "Enter");
    }

    #[test]
    fn test_artifact_from_external_producer_loads() {
        // Input records from older producers carry no frameUrl or xpath.
        let json = r#"[
            {"type":"navigation","timestamp":1,"tabId":1,"url":"https://a.test/"},
            {"type":"input","timestamp":2,"tabId":1,"url":"https://a.test/","cssSelector":"input[name=\"q\"]","value":"rust"}
        ]"#;
        let records: Vec<PersistedStep> = serde_json::from_str(json).unwrap();
        let mut workflow = PersistedWorkflow::new("search", "s-1", 0);
        workflow.steps = records;
        let steps = workflow.to_steps().unwrap();
        assert_eq!(steps[0].kind(), StepKind::Navigation);
        assert_eq!(steps[1].kind(), StepKind::Input);
        assert_eq!(steps[1].sequence_index(), 1);
        assert_eq!(
            steps[1].locator().map(|l| l.css_selector.as_str()),
            Some("input[name=\"q\"]")
        );
    }

    #[test]
    fn test_step_json_flattens_payload() {
        let json = serde_json::to_value(click_step()).unwrap();
        assert_eq!(json["kind"], "click");
        assert_eq!(json["element_text"], "Sign in");
        assert_eq!(json["locator"]["xpath"], "id(\"login\")");
        assert_eq!(json["sequenceIndex"], 0);
    }
}
