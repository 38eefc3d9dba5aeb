use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dom_step_recorder::{
    Document, DocumentSpec, HostCommand, HostSink, InputAnswer, InputRequest, Modifiers, NodeId,
    PageContext, PersistedWorkflow, RawEvent, RecorderContext,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A recording session: a fixture page and what the human does on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionScript {
    #[serde(default = "default_name")]
    pub name: String,
    pub url: String,
    pub document: DocumentSpec,
    pub actions: Vec<ScriptAction>,
    /// Simulated time between consecutive actions (milliseconds)
    #[serde(default = "default_action_interval")]
    pub action_interval_ms: u64,
}

fn default_name() -> String {
    "recorded-session".to_string()
}

fn default_action_interval() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Start,
    Finish,
    Undo,
    Close,
    Click {
        target: String,
    },
    /// Types `text` one character at a time, one input event per character.
    Type {
        target: String,
        text: String,
    },
    Select {
        target: String,
        value: String,
    },
    Key {
        key: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        modifiers: Modifiers,
    },
    /// A full document load, or a history change when `same_document` is set.
    Navigate {
        url: String,
        #[serde(default)]
        same_document: bool,
    },
    Delete {
        index: usize,
    },
    Move {
        from: usize,
        to: usize,
    },
    /// The host asks the human a question and the human answers.
    Ask {
        request: InputRequest,
        answer: InputAnswer,
    },
    Output {
        text: String,
    },
    Wait {
        ms: u64,
    },
}

impl SessionScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session script {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse session script {}", path.display()))
    }
}

/// Drives a recorder through a script against the script's fixture document.
pub struct SessionRunner<S: HostSink> {
    recorder: RecorderContext<S>,
    doc: Document,
    keys: HashMap<String, NodeId>,
    clock: u64,
    interval: u64,
    finished: Option<PersistedWorkflow>,
}

impl<S: HostSink> SessionRunner<S> {
    pub fn new(script: &SessionScript, mut recorder: RecorderContext<S>, start_at: u64) -> Result<Self> {
        let (doc, keys) = script
            .document
            .build()
            .context("Failed to build the session document")?;
        recorder.set_page(PageContext::top_level(script.url.clone()));
        Ok(Self {
            recorder,
            doc,
            keys,
            clock: start_at,
            interval: script.action_interval_ms,
            finished: None,
        })
    }

    /// The last finished session, or the live one if the script never finished.
    pub fn workflow(&self) -> PersistedWorkflow {
        self.finished
            .clone()
            .unwrap_or_else(|| self.recorder.to_persisted())
    }

    pub async fn run(&mut self, actions: &[ScriptAction]) -> Result<()> {
        for (index, action) in actions.iter().enumerate() {
            debug!("Action {}: {:?}", index, action);
            self.apply(action)
                .await
                .with_context(|| format!("Action {index} failed"))?;
            self.advance(self.interval);
        }
        Ok(())
    }

    async fn apply(&mut self, action: &ScriptAction) -> Result<()> {
        match action {
            ScriptAction::Start => self.recorder.start()?,
            ScriptAction::Finish => self.finished = Some(self.recorder.finish()?),
            ScriptAction::Undo => {
                if let Err(e) = self.recorder.undo() {
                    warn!("Undo rejected: {}", e);
                }
            }
            ScriptAction::Close => {
                let units = self.recorder.close();
                if units > 0 {
                    info!("Closing in {} units", units);
                    self.recorder.run_close_grace().await;
                }
            }
            ScriptAction::Click { target } => {
                let target = self.node(target)?;
                self.dispatch(RawEvent::Click { target });
            }
            ScriptAction::Type { target, text } => {
                let target = self.node(target)?;
                let mut typed = self
                    .doc
                    .element(target)
                    .and_then(|e| e.value())
                    .unwrap_or_default();
                for c in text.chars() {
                    typed.push(c);
                    self.doc.set_value(target, &typed)?;
                    self.dispatch(RawEvent::Input { target });
                    self.advance(1);
                }
            }
            ScriptAction::Select { target, value } => {
                let target = self.node(target)?;
                self.doc.select_value(target, value)?;
                self.dispatch(RawEvent::Change { target });
            }
            ScriptAction::Key {
                key,
                target,
                modifiers,
            } => {
                let target = target.as_deref().map(|t| self.node(t)).transpose()?;
                self.dispatch(RawEvent::KeyDown {
                    target,
                    key: key.clone(),
                    modifiers: *modifiers,
                });
            }
            ScriptAction::Navigate { url, same_document } => {
                if *same_document {
                    self.dispatch(RawEvent::HistoryChange { url: url.clone() });
                } else {
                    self.dispatch(RawEvent::Load { url: url.clone() });
                    let commands = self.recorder.restore_after_navigation();
                    debug!("Overlay restored with {} commands", commands.len());
                }
            }
            ScriptAction::Delete { index } => {
                if let Err(e) = self.recorder.delete_step(*index) {
                    warn!("Delete rejected: {}", e);
                }
            }
            ScriptAction::Move { from, to } => {
                if let Err(e) = self.recorder.move_step(*from, *to) {
                    warn!("Move rejected: {}", e);
                }
            }
            ScriptAction::Ask { request, answer } => {
                let response = self
                    .recorder
                    .apply_command(HostCommand::RequestInput(request.clone()))?
                    .ok_or_else(|| anyhow!("Input request was not opened"))?;
                self.recorder.submit_input(answer.clone())?;
                if let Some(answer) = response.wait().await {
                    info!("Human answered {:?}", answer);
                }
            }
            ScriptAction::Output { text } => {
                self.recorder
                    .apply_command(HostCommand::Output { text: text.clone() })?;
            }
            ScriptAction::Wait { ms } => self.advance(*ms),
        }
        Ok(())
    }

    fn dispatch(&mut self, event: RawEvent) {
        self.recorder.handle_event(&self.doc, &event, self.clock);
    }

    fn advance(&mut self, ms: u64) {
        self.clock += ms;
        self.recorder.poll(self.clock);
    }

    fn node(&self, key: &str) -> Result<NodeId> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| anyhow!("Unknown element key '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom_step_recorder::{MemorySink, RecorderConfig, StepKind};

    const SCRIPT: &str = r#"{
        "name": "search",
        "url": "https://docs.test/",
        "document": {"body": [
            {"tag": "input", "key": "q", "attributes": [["id", "search"]]},
            {"tag": "a", "key": "b", "text": "Result B", "attributes": [["href", "/b"]]}
        ]},
        "actions": [
            {"action": "start"},
            {"action": "click", "target": "q"},
            {"action": "type", "target": "q", "text": "hello"},
            {"action": "key", "key": "Enter", "target": "q"},
            {"action": "navigate", "url": "https://docs.test/results"},
            {"action": "click", "target": "b"},
            {"action": "move", "from": 3, "to": 1},
            {"action": "finish"}
        ]
    }"#;

    #[tokio::test]
    async fn test_debounced_script_matches_scenario() {
        let script: SessionScript = serde_json::from_str(SCRIPT).unwrap();
        let recorder =
            RecorderContext::new(&script.name, RecorderConfig::debounced(500), MemorySink::new());
        let mut runner = SessionRunner::new(&script, recorder, 0).unwrap();
        runner.run(&script.actions).await.unwrap();

        let steps = runner.workflow().to_steps().unwrap();
        let kinds: Vec<_> = steps.iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Click,
                StepKind::Input,
                StepKind::KeyPress,
                StepKind::Navigation,
                StepKind::Click
            ]
        );
        assert_eq!(runner.workflow().name, "search");
    }

    #[tokio::test]
    async fn test_lossless_script_records_each_keystroke() {
        let script: SessionScript = serde_json::from_str(SCRIPT).unwrap();
        let recorder = RecorderContext::new("s", RecorderConfig::lossless(), MemorySink::new());
        let mut runner = SessionRunner::new(&script, recorder, 0).unwrap();
        runner.run(&script.actions).await.unwrap();
        let inputs = runner
            .workflow()
            .to_steps()
            .unwrap()
            .iter()
            .filter(|s| s.kind() == StepKind::Input)
            .count();
        assert_eq!(inputs, 5);
    }

    #[tokio::test]
    async fn test_unknown_key_fails_with_context() {
        let script: SessionScript = serde_json::from_str(
            r#"{"url": "https://a.test/", "document": {"body": []},
                "actions": [{"action": "start"}, {"action": "click", "target": "missing"}]}"#,
        )
        .unwrap();
        let recorder = RecorderContext::new("s", RecorderConfig::default(), MemorySink::new());
        let mut runner = SessionRunner::new(&script, recorder, 0).unwrap();
        let err = runner.run(&script.actions).await.unwrap_err();
        assert_eq!(err.to_string(), "Action 1 failed");
        assert!(format!("{err:#}").contains("Unknown element key 'missing'"));
    }
}
