use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::keys::Platform;
use crate::Result;

/// Configuration for the step recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Whether to record click events
    pub record_clicks: bool,

    /// Whether to record value changes of text-entry controls
    pub record_inputs: bool,

    /// Whether to record selection changes of dropdowns
    pub record_changes: bool,

    /// Whether to record meaningful key presses and shortcuts
    pub record_keys: bool,

    /// Whether to record history changes and document loads
    pub record_navigation: bool,

    /// Coalescing window for consecutive input events on the same field (milliseconds).
    /// `None` keeps capture lossless: one raw input event, one step.
    pub input_debounce_ms: Option<u64>,

    /// Maximum length of the visible text captured for clicks (characters)
    pub max_element_text_len: usize,

    /// Placeholder emitted instead of the value of password fields
    pub password_mask: String,

    /// Number of countdown units between `close` and overlay teardown
    pub close_grace_units: u32,

    /// Length of one countdown unit (milliseconds)
    pub close_grace_unit_ms: u64,

    /// Decides which modifier forms `CmdOrCtrl+` shortcuts
    pub platform: Platform,

    /// Tab id written into persisted steps
    pub tab_id: u64,

    /// Id of the overlay's root element; events inside it are ignored
    pub overlay_root_id: String,

    /// Record a navigation step for the current page when recording starts
    pub record_initial_navigation: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            record_clicks: true,
            record_inputs: true,
            record_changes: true,
            record_keys: true,
            record_navigation: true,
            input_debounce_ms: None,
            max_element_text_len: 200,
            password_mask: "********".to_string(),
            close_grace_units: 3,
            close_grace_unit_ms: 1000,
            platform: Platform::current(),
            tab_id: 1,
            overlay_root_id: "agent-recorder-ui".to_string(),
            record_initial_navigation: false,
        }
    }
}

impl RecorderConfig {
    /// Every raw input event becomes its own step.
    pub fn lossless() -> Self {
        Self::default()
    }

    /// Consecutive input events on one field within `window_ms` collapse into one step
    /// carrying the final value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dom_step_recorder::RecorderConfig;
    ///
    /// let config = RecorderConfig::debounced(500);
    /// assert_eq!(config.input_debounce_ms, Some(500));
    /// ```
    pub fn debounced(window_ms: u64) -> Self {
        Self {
            input_debounce_ms: Some(window_ms),
            ..Self::default()
        }
    }

    pub fn close_grace_unit(&self) -> Duration {
        Duration::from_millis(self.close_grace_unit_ms)
    }

    /// Load a configuration from a JSON file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
