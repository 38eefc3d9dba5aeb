//! Key-press normalization.
//!
//! Plain character typing is captured through input events, so only navigation and
//! editing keys plus primary-modifier shortcuts become key-press steps.

use serde::{Deserialize, Serialize};

/// Keys recorded verbatim.
pub const MEANINGFUL_KEYS: &[&str] = &[
    "Enter",
    "Tab",
    "Escape",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "Home",
    "End",
    "PageUp",
    "PageDown",
    "Backspace",
    "Delete",
];

/// Platform-neutral token for the primary shortcut modifier.
pub const PRIMARY_MODIFIER_TOKEN: &str = "CmdOrCtrl";

/// Decides which physical modifier is the primary shortcut modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Command is primary.
    Apple,
    /// Control is primary.
    #[default]
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            Platform::Apple
        } else {
            Platform::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn meta() -> Self {
        Self {
            meta: true,
            ..Self::default()
        }
    }

    fn primary(&self, platform: Platform) -> bool {
        match platform {
            Platform::Apple => self.meta,
            Platform::Other => self.ctrl,
        }
    }
}

/// Returns the logical key to record, or `None` when the key press is not captured.
pub fn normalize_key(key: &str, modifiers: Modifiers, platform: Platform) -> Option<String> {
    if MEANINGFUL_KEYS.contains(&key) {
        return Some(key.to_string());
    }

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() && modifiers.primary(platform) => Some(
            format!("{}+{}", PRIMARY_MODIFIER_TOKEN, c.to_ascii_uppercase()),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meaningful_keys_pass_through() {
        for key in MEANINGFUL_KEYS {
            assert_eq!(
                normalize_key(key, Modifiers::default(), Platform::Other).as_deref(),
                Some(*key)
            );
        }
    }

    #[test]
    fn test_plain_characters_are_ignored() {
        assert_eq!(normalize_key("a", Modifiers::default(), Platform::Other), None);
        assert_eq!(normalize_key("Shift", Modifiers::default(), Platform::Other), None);
        assert_eq!(normalize_key("F5", Modifiers::ctrl(), Platform::Other), None);
    }

    #[test]
    fn test_primary_modifier_depends_on_platform() {
        assert_eq!(
            normalize_key("c", Modifiers::ctrl(), Platform::Other).as_deref(),
            Some("CmdOrCtrl+C")
        );
        assert_eq!(normalize_key("c", Modifiers::meta(), Platform::Other), None);
        assert_eq!(
            normalize_key("v", Modifiers::meta(), Platform::Apple).as_deref(),
            Some("CmdOrCtrl+V")
        );
        assert_eq!(normalize_key("v", Modifiers::ctrl(), Platform::Apple), None);
        assert_eq!(
            normalize_key("7", Modifiers::ctrl(), Platform::Other).as_deref(),
            Some("CmdOrCtrl+7")
        );
    }

    #[test]
    fn test_non_alphanumeric_shortcuts_are_ignored() {
        assert_eq!(normalize_key("/", Modifiers::ctrl(), Platform::Other), None);
        assert_eq!(normalize_key("é", Modifiers::ctrl(), Platform::Other), None);
    }
}
