//! Locator synthesis for captured elements.
//!
//! Every element gets two independent locators: an attribute-based CSS selector and a
//! structural XPath. Replay should try the CSS selector first and fall back to the
//! XPath. Both are derived only from what the element looks like at capture time, so
//! neither survives responsive layouts that render different controls at different
//! widths; that is a property of the recording, not a synthesis error.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::dom::{DomError, DomNode};

/// Attributes that carry identity or semantics and are safe to match on.
pub const SAFE_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "placeholder",
    "aria-label",
    "aria-labelledby",
    "aria-describedby",
    "role",
    "for",
    "autocomplete",
    "required",
    "readonly",
    "alt",
    "title",
    "src",
    "href",
    "target",
    // Common test hooks
    "data-testid",
    "data-id",
    "data-qa",
    "data-cy",
];

#[derive(Error, Debug)]
pub(crate) enum SelectorError {
    #[error(transparent)]
    Dom(#[from] DomError),

    #[error("Attribute '{attribute}' has a value that cannot be encoded in a selector")]
    UnencodableValue { attribute: String },
}

/// Locator strategies, in the order replay should attempt them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorStrategy {
    Css,
    XPath,
}

/// Alternative locators synthesized for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorBundle {
    pub xpath: String,
    pub css_selector: String,

    /// Reserved for an accessibility-tree locator. Not synthesized yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria: Option<String>,

    /// Reserved for a shadow-DOM piercing locator. Not synthesized yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pierce: Option<String>,
}

impl LocatorBundle {
    pub fn new(xpath: impl Into<String>, css_selector: impl Into<String>) -> Self {
        Self {
            xpath: xpath.into(),
            css_selector: css_selector.into(),
            aria: None,
            pierce: None,
        }
    }

    /// The synthesized locators in replay order.
    pub fn candidates(&self) -> Vec<(LocatorStrategy, &str)> {
        vec![
            (LocatorStrategy::Css, self.css_selector.as_str()),
            (LocatorStrategy::XPath, self.xpath.as_str()),
        ]
    }
}

/// Builds both locators for `node`. Never fails.
pub fn synthesize<N: DomNode>(node: &N) -> LocatorBundle {
    LocatorBundle::new(structural_path(node), attribute_selector(node))
}

/// Structural XPath for `node`.
///
/// An element with a non-empty id short-circuits to `id("...")`. Otherwise each level
/// contributes `tag[n]`, where `n` is the 1-based position among same-tag siblings,
/// until the walk reaches `<body>` or an ancestor with an id.
pub fn structural_path<N: DomNode>(node: &N) -> String {
    let mut segments = Vec::new();
    let mut prefix = String::new();
    let mut current: Option<N> = None;

    loop {
        let element = current.as_ref().unwrap_or(node);
        if let Some(id) = element.id() {
            prefix = format!("id(\"{id}\")");
            break;
        }
        let tag = element.tag_name().to_ascii_lowercase();
        if element.is_content_root() {
            prefix = tag;
            break;
        }
        segments.push(format!("{}[{}]", tag, element.preceding_same_tag_siblings() + 1));
        match element.parent_element() {
            Some(parent) => current = Some(parent),
            None => break,
        }
    }

    segments.reverse();
    let mut path = prefix;
    for segment in segments {
        path.push('/');
        path.push_str(&segment);
    }
    path
}

/// Attribute-based CSS selector for `node`, falling back to an embedded structural path
/// when attributes cannot be read or encoded.
pub fn attribute_selector<N: DomNode>(node: &N) -> String {
    match try_attribute_selector(node) {
        Ok(selector) => selector,
        Err(e) => {
            debug!("Falling back to structural selector: {}", e);
            fallback_selector(node)
        }
    }
}

fn try_attribute_selector<N: DomNode>(node: &N) -> Result<String, SelectorError> {
    let mut selector = node.tag_name().to_ascii_lowercase();

    for class in node.class_list() {
        if is_safe_class(&class) {
            selector.push('.');
            selector.push_str(&class);
        }
    }

    for attr in node.attributes()? {
        if !SAFE_ATTRIBUTES.contains(&attr.name.as_str()) {
            continue;
        }
        selector.push_str(&attribute_predicate(&attr.name, &attr.value)?);
    }

    Ok(selector)
}

fn fallback_selector<N: DomNode>(node: &N) -> String {
    format!(
        "{}[xpath=\"{}\"]",
        node.tag_name().to_ascii_lowercase(),
        escape_quoted(&structural_path(node))
    )
}

/// `[a-zA-Z_][a-zA-Z0-9_-]*`; anything else is likely generated and unstable.
pub fn is_safe_class(class: &str) -> bool {
    let mut chars = class.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Values with these characters are matched by substring instead of equality.
pub fn needs_substring_match(value: &str) -> bool {
    value
        .chars()
        .any(|c| matches!(c, '"' | '\'' | '<' | '>' | '`') || c.is_whitespace())
}

fn attribute_predicate(name: &str, value: &str) -> Result<String, SelectorError> {
    if value.is_empty() {
        return Ok(format!("[{name}]"));
    }
    if value.contains('\0') {
        return Err(SelectorError::UnencodableValue {
            attribute: name.to_string(),
        });
    }
    let escaped = escape_quoted(value);
    if needs_substring_match(value) {
        Ok(format!("[{name}*=\"{escaped}\"]"))
    } else {
        Ok(format!("[{name}=\"{escaped}\"]"))
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Attribute, Document};

    #[test]
    fn test_id_short_circuits_structural_path_at_any_depth() {
        let mut doc = Document::new();
        let mut parent = doc.body();
        for _ in 0..6 {
            parent = doc.append_element(parent, "div").unwrap();
        }
        let input = doc
            .append_element_with(parent, "input", &[("id", "search")])
            .unwrap();
        assert_eq!(
            structural_path(&doc.element(input).unwrap()),
            "id(\"search\")"
        );
    }

    #[test]
    fn test_positional_path_counts_same_tag_siblings() {
        let mut doc = Document::new();
        let body = doc.body();
        doc.append_element(body, "div").unwrap();
        let second = doc.append_element(body, "div").unwrap();
        doc.append_element(second, "span").unwrap();
        doc.append_element(second, "a").unwrap();
        let link = doc.append_element(second, "a").unwrap();
        assert_eq!(
            structural_path(&doc.element(link).unwrap()),
            "body/div[2]/a[2]"
        );
    }

    #[test]
    fn test_path_stops_at_ancestor_with_id() {
        let mut doc = Document::new();
        let body = doc.body();
        let form = doc.append_element_with(body, "form", &[("id", "login")]).unwrap();
        let button = doc.append_element(form, "button").unwrap();
        assert_eq!(
            structural_path(&doc.element(button).unwrap()),
            "id(\"login\")/button[1]"
        );
    }

    #[test]
    fn test_body_and_head_paths() {
        let doc = Document::new();
        let body = doc.element(doc.body()).unwrap();
        assert_eq!(structural_path(&body), "body");
        let html = body.parent_element().unwrap();
        assert_eq!(structural_path(&html), "/html[1]");
    }

    #[test]
    fn test_css_keeps_safe_classes_and_allowed_attributes() {
        let mut doc = Document::new();
        let body = doc.body();
        let button = doc
            .append_element_with(
                body,
                "button",
                &[
                    ("class", "btn primary css-1x9f 9lives _ok"),
                    ("type", "submit"),
                    ("style", "color: red"),
                    ("data-testid", "submit-btn"),
                ],
            )
            .unwrap();
        assert_eq!(
            attribute_selector(&doc.element(button).unwrap()),
            "button.btn.primary.css-1x9f._ok[type=\"submit\"][data-testid=\"submit-btn\"]"
        );
    }

    #[test]
    fn test_empty_attribute_is_presence_predicate() {
        let mut doc = Document::new();
        let body = doc.body();
        let input = doc
            .append_element_with(body, "input", &[("required", ""), ("name", "email")])
            .unwrap();
        assert_eq!(
            attribute_selector(&doc.element(input).unwrap()),
            "input[required][name=\"email\"]"
        );
    }

    #[test]
    fn test_special_characters_use_substring_match() {
        for value in [
            "Search the site",
            "say \"hi\"",
            "it's",
            "<b>",
            "a>b",
            "`tick`",
            "tab\there",
        ] {
            let predicate = attribute_predicate("title", value).unwrap();
            assert!(predicate.starts_with("[title*=\""), "{value}: {predicate}");
        }
        assert_eq!(
            attribute_predicate("title", "say \"hi\"").unwrap(),
            "[title*=\"say \\\"hi\\\"\"]"
        );
        assert_eq!(
            attribute_predicate("title", "plain-value_1").unwrap(),
            "[title=\"plain-value_1\"]"
        );
    }

    #[test]
    fn test_unencodable_value_falls_back_to_structural_path() {
        let mut doc = Document::new();
        let body = doc.body();
        let input = doc
            .append_element_with(body, "input", &[("name", "bad\0name")])
            .unwrap();
        assert_eq!(
            attribute_selector(&doc.element(input).unwrap()),
            "input[xpath=\"body/input[1]\"]"
        );
    }

    #[derive(Clone)]
    struct BrokenNode;

    impl DomNode for BrokenNode {
        fn tag_name(&self) -> String {
            "DIV".to_string()
        }
        fn attribute(&self, name: &str) -> Option<String> {
            (name == "id").then(|| "panel".to_string())
        }
        fn attributes(&self) -> Result<Vec<Attribute>, DomError> {
            Err(DomError::AttributeAccess("detached".to_string()))
        }
        fn parent_element(&self) -> Option<Self> {
            None
        }
        fn preceding_same_tag_siblings(&self) -> usize {
            0
        }
        fn is_content_root(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_attribute_failure_embeds_escaped_structural_path() {
        let bundle = synthesize(&BrokenNode);
        assert_eq!(bundle.xpath, "id(\"panel\")");
        assert_eq!(bundle.css_selector, "div[xpath=\"id(\\\"panel\\\")\"]");
    }

    #[test]
    fn test_candidates_order_css_first() {
        let bundle = LocatorBundle::new("id(\"a\")", "input[id=\"a\"]");
        let strategies: Vec<_> = bundle.candidates().into_iter().map(|(s, _)| s).collect();
        assert_eq!(strategies, vec![LocatorStrategy::Css, LocatorStrategy::XPath]);
    }

    #[test]
    fn test_reserved_strategies_are_omitted_when_empty() {
        let json = serde_json::to_value(LocatorBundle::new("x", "y")).unwrap();
        assert_eq!(json, serde_json::json!({"xpath": "x", "cssSelector": "y"}));
    }
}
