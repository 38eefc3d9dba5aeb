//! Rendered-document abstraction read by the capture layer and the selector synthesizer.
//!
//! The recorder never mutates the page it observes; it only needs to walk from an event
//! target towards the root, read attributes and read form-control state. [`DomNode`] is
//! that read-only surface. [`Document`] is an arena-backed implementation used by the
//! CLI session scripts and by tests; a browser binding implements [`DomNode`] over its
//! own element handles.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Node {0:?} does not exist")]
    MissingNode(NodeId),

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("Element {node:?} ({tag}) is not a {expected}")]
    WrongElementKind {
        node: NodeId,
        tag: String,
        expected: &'static str,
    },

    #[error("Attribute access failed: {0}")]
    AttributeAccess(String),

    #[error("Duplicate fixture key: {0}")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Read-only view of an element in a rendered document.
pub trait DomNode: Sized {
    /// Uppercase tag name, as `Element.tagName` reports it for HTML documents.
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    /// All attributes in document order. Bindings over a live page may fail here.
    fn attributes(&self) -> Result<Vec<Attribute>, DomError>;

    fn parent_element(&self) -> Option<Self>;

    /// Number of element siblings before this one that share its tag name.
    fn preceding_same_tag_siblings(&self) -> usize;

    /// Whether this element is the document's top-level content container (`<body>`).
    fn is_content_root(&self) -> bool;

    /// Non-empty `id` attribute, if any.
    fn id(&self) -> Option<String> {
        self.attribute("id").filter(|id| !id.is_empty())
    }

    fn class_list(&self) -> Vec<String> {
        self.attribute("class")
            .map(|classes| classes.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    node_type: NodeType,
}

#[derive(Debug, Clone)]
struct Element {
    tag_name: String,
    attrs: Vec<Attribute>,
    value: String,
    selected_index: Option<usize>,
}

/// Arena-backed document tree: `#document > HTML > (HEAD, BODY)`.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    html: NodeId,
    body: NodeId,
    id_index: HashMap<String, Vec<NodeId>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                node_type: NodeType::Document,
            }],
            html: NodeId(0),
            body: NodeId(0),
            id_index: HashMap::new(),
        };
        let html = doc.create_element_node(NodeId(0), "html");
        doc.create_element_node(html, "head");
        let body = doc.create_element_node(html, "body");
        doc.html = html;
        doc.body = body;
        doc
    }

    pub fn document_element(&self) -> NodeId {
        self.html
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    fn create_element_node(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.create_node(
            Some(parent),
            NodeType::Element(Element {
                tag_name: tag.to_ascii_uppercase(),
                attrs: Vec::new(),
                value: String::new(),
                selected_index: None,
            }),
        )
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::MissingNode(id))
    }

    fn element_data(&self, id: NodeId) -> Result<&Element, DomError> {
        match &self.node(id)?.node_type {
            NodeType::Element(element) => Ok(element),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    fn element_data_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.node_type) {
            Some(NodeType::Element(element)) => Ok(element),
            Some(_) => Err(DomError::NotAnElement(id)),
            None => Err(DomError::MissingNode(id)),
        }
    }

    /// Appends a new element under `parent` and returns its id.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, DomError> {
        self.element_data(parent)?;
        Ok(self.create_element_node(parent, tag))
    }

    /// Appends an element with the given attributes, in order.
    pub fn append_element_with(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let id = self.append_element(parent, tag)?;
        for (name, value) in attrs {
            self.set_attribute(id, name, value)?;
        }
        Ok(id)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        self.element_data(parent)?;
        Ok(self.create_node(Some(parent), NodeType::Text(text.to_string())))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        let previous_id = {
            let element = self.element_data_mut(id)?;
            let previous = element
                .attrs
                .iter()
                .find(|attr| attr.name == "id")
                .map(|attr| attr.value.clone());
            match element.attrs.iter_mut().find(|attr| attr.name == name) {
                Some(existing) => existing.value = value.to_string(),
                None => element.attrs.push(Attribute::new(name.clone(), value)),
            }
            if name == "value" {
                element.value = value.to_string();
            }
            previous
        };
        if name == "id" {
            if let Some(old) = previous_id {
                self.unindex_id(&old, id);
            }
            self.index_id(value, id);
        }
        Ok(())
    }

    fn index_id(&mut self, id: &str, node_id: NodeId) {
        if id.is_empty() {
            return;
        }
        self.id_index.entry(id.to_string()).or_default().push(node_id);
    }

    fn unindex_id(&mut self, id: &str, node_id: NodeId) {
        let Some(nodes) = self.id_index.get_mut(id) else {
            return;
        };
        nodes.retain(|candidate| *candidate != node_id);
        if nodes.is_empty() {
            self.id_index.remove(id);
        }
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).and_then(|ids| ids.first().copied())
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.element_data(id)
            .ok()
            .map(|data| ElementRef { doc: self, id, data })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// True when `node` is `ancestor` or lies anywhere beneath it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.nodes.get(id.0) else {
            return String::new();
        };
        match &node.node_type {
            NodeType::Text(text) => text.clone(),
            NodeType::Document | NodeType::Element(_) => node
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    /// Sets the live value of an `<input>` or `<textarea>`.
    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        let element = self.element_data_mut(id)?;
        match element.tag_name.as_str() {
            "INPUT" | "TEXTAREA" => {
                element.value = value.to_string();
                Ok(())
            }
            other => Err(DomError::WrongElementKind {
                node: id,
                tag: other.to_string(),
                expected: "text-entry control",
            }),
        }
    }

    /// Appends an `<option>` to a `<select>`. The first option becomes selected.
    pub fn add_option(
        &mut self,
        select: NodeId,
        value: &str,
        label: &str,
    ) -> Result<NodeId, DomError> {
        self.expect_select(select)?;
        let option = self.append_element_with(select, "option", &[("value", value)])?;
        self.append_text(option, label)?;
        let element = self.element_data_mut(select)?;
        if element.selected_index.is_none() {
            element.selected_index = Some(0);
        }
        Ok(option)
    }

    pub fn select_index(&mut self, select: NodeId, index: usize) -> Result<(), DomError> {
        let count = self.options(select)?.len();
        let element = self.element_data_mut(select)?;
        element.selected_index = (index < count).then_some(index);
        Ok(())
    }

    /// Selects the first option whose value equals `value`.
    pub fn select_value(&mut self, select: NodeId, value: &str) -> Result<(), DomError> {
        let position = self
            .options(select)?
            .iter()
            .position(|option| self.option_value(*option) == value);
        self.element_data_mut(select)?.selected_index = position;
        Ok(())
    }

    fn expect_select(&self, id: NodeId) -> Result<(), DomError> {
        let element = self.element_data(id)?;
        if element.tag_name == "SELECT" {
            Ok(())
        } else {
            Err(DomError::WrongElementKind {
                node: id,
                tag: element.tag_name.clone(),
                expected: "select",
            })
        }
    }

    fn options(&self, select: NodeId) -> Result<Vec<NodeId>, DomError> {
        self.expect_select(select)?;
        Ok(self
            .node(select)?
            .children
            .iter()
            .copied()
            .filter(|child| {
                self.element_data(*child)
                    .map(|e| e.tag_name == "OPTION")
                    .unwrap_or(false)
            })
            .collect())
    }

    fn option_value(&self, option: NodeId) -> String {
        self.element_data(option)
            .ok()
            .and_then(|e| e.attrs.iter().find(|a| a.name == "value"))
            .map(|a| a.value.clone())
            .unwrap_or_else(|| self.text_content(option))
    }

    fn element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.element_data(*child).is_ok())
            .collect()
    }
}

/// Borrowed handle to one element of a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a Document,
    id: NodeId,
    data: &'a Element,
}

impl<'a> ElementRef<'a> {
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    fn data(&self) -> &'a Element {
        self.data
    }

    pub fn text_content(&self) -> String {
        self.doc.text_content(self.id)
    }

    /// Live value for form controls; `None` for elements that carry no value.
    pub fn value(&self) -> Option<String> {
        let data = self.data();
        match data.tag_name.as_str() {
            "INPUT" | "TEXTAREA" => Some(data.value.clone()),
            "SELECT" => Some(
                self.selected_option()
                    .map(|(value, _)| value)
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    /// Lowercase `type` of an `<input>`, defaulting to `text`.
    pub fn input_type(&self) -> Option<String> {
        (self.data().tag_name == "INPUT").then(|| {
            self.attribute("type")
                .map(|t| t.to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text".to_string())
        })
    }

    pub fn is_select(&self) -> bool {
        self.data().tag_name == "SELECT"
    }

    /// `(value, label)` of the selected option of a `<select>`.
    pub fn selected_option(&self) -> Option<(String, String)> {
        let index = self.data().selected_index?;
        let option = *self.doc.options(self.id).ok()?.get(index)?;
        Some((
            self.doc.option_value(option),
            self.doc.text_content(option),
        ))
    }

    pub fn is_within(&self, ancestor: NodeId) -> bool {
        self.doc.contains(ancestor, self.id)
    }
}

impl DomNode for ElementRef<'_> {
    fn tag_name(&self) -> String {
        self.data().tag_name.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.data()
            .attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.clone())
    }

    fn attributes(&self) -> Result<Vec<Attribute>, DomError> {
        Ok(self.data().attrs.clone())
    }

    fn parent_element(&self) -> Option<Self> {
        self.doc.parent(self.id).and_then(|parent| self.doc.element(parent))
    }

    fn preceding_same_tag_siblings(&self) -> usize {
        let tag = &self.data().tag_name;
        self.doc
            .element_siblings(self.id)
            .into_iter()
            .take_while(|sibling| *sibling != self.id)
            .filter(|sibling| {
                self.doc
                    .element_data(*sibling)
                    .map(|e| &e.tag_name == tag)
                    .unwrap_or(false)
            })
            .count()
    }

    fn is_content_root(&self) -> bool {
        self.id == self.doc.body
    }
}

/// Declarative description of an element subtree, used to build fixture documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    pub tag: String,
    /// Attributes as `[name, value]` pairs, kept in order.
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub options: Vec<OptionSpec>,
    /// Name a session script uses to refer to this element.
    pub key: Option<String>,
    pub children: Vec<ElementSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionSpec {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
}

/// The `<body>` content of a fixture document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSpec {
    pub body: Vec<ElementSpec>,
}

impl DocumentSpec {
    /// Builds the document and returns it with the ids of every keyed element.
    pub fn build(&self) -> Result<(Document, HashMap<String, NodeId>), DomError> {
        let mut doc = Document::new();
        let mut keys = HashMap::new();
        let body = doc.body();
        for spec in &self.body {
            build_element(&mut doc, body, spec, &mut keys)?;
        }
        Ok((doc, keys))
    }
}

fn build_element(
    doc: &mut Document,
    parent: NodeId,
    spec: &ElementSpec,
    keys: &mut HashMap<String, NodeId>,
) -> Result<NodeId, DomError> {
    let id = doc.append_element(parent, &spec.tag)?;
    for (name, value) in &spec.attributes {
        doc.set_attribute(id, name, value)?;
    }
    if let Some(text) = &spec.text {
        doc.append_text(id, text)?;
    }
    if let Some(value) = &spec.value {
        doc.set_value(id, value)?;
    }
    for (index, option) in spec.options.iter().enumerate() {
        doc.add_option(id, &option.value, &option.label)?;
        if option.selected {
            doc.select_index(id, index)?;
        }
    }
    if let Some(key) = &spec.key {
        if keys.insert(key.clone(), id).is_some() {
            return Err(DomError::DuplicateKey(key.clone()));
        }
    }
    for child in &spec.children {
        build_element(doc, id, child, keys)?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_has_html_head_body() {
        let doc = Document::new();
        let body = doc.element(doc.body()).unwrap();
        assert_eq!(body.tag_name(), "BODY");
        assert!(body.is_content_root());
        let html = body.parent_element().unwrap();
        assert_eq!(html.tag_name(), "HTML");
        assert!(html.parent_element().is_none());
    }

    #[test]
    fn test_same_tag_sibling_count_ignores_other_tags() {
        let mut doc = Document::new();
        let body = doc.body();
        doc.append_element(body, "div").unwrap();
        doc.append_element(body, "span").unwrap();
        doc.append_element(body, "div").unwrap();
        let third = doc.append_element(body, "div").unwrap();
        assert_eq!(doc.element(third).unwrap().preceding_same_tag_siblings(), 2);
    }

    #[test]
    fn test_id_index_follows_attribute_changes() {
        let mut doc = Document::new();
        let body = doc.body();
        let input = doc.append_element_with(body, "input", &[("id", "a")]).unwrap();
        assert_eq!(doc.by_id("a"), Some(input));
        doc.set_attribute(input, "id", "b").unwrap();
        assert_eq!(doc.by_id("a"), None);
        assert_eq!(doc.by_id("b"), Some(input));
    }

    #[test]
    fn test_value_only_for_form_controls() {
        let mut doc = Document::new();
        let body = doc.body();
        let div = doc.append_element(body, "div").unwrap();
        let input = doc.append_element(body, "input").unwrap();
        doc.set_value(input, "hi").unwrap();
        assert_eq!(doc.element(div).unwrap().value(), None);
        assert_eq!(doc.element(input).unwrap().value(), Some("hi".to_string()));
        assert!(doc.set_value(div, "x").is_err());
    }

    #[test]
    fn test_select_tracks_selected_option() {
        let mut doc = Document::new();
        let body = doc.body();
        let select = doc.append_element(body, "select").unwrap();
        doc.add_option(select, "us", "United States").unwrap();
        doc.add_option(select, "fr", "France").unwrap();
        doc.select_value(select, "fr").unwrap();
        let element = doc.element(select).unwrap();
        assert_eq!(
            element.selected_option(),
            Some(("fr".to_string(), "France".to_string()))
        );
        assert_eq!(element.value(), Some("fr".to_string()));
    }

    #[test]
    fn test_spec_build_registers_keys() {
        let spec: DocumentSpec = serde_json::from_str(
            r#"{"body":[{"tag":"form","children":[
                {"tag":"input","key":"q","attributes":[["id","search"],["type","text"]]},
                {"tag":"button","key":"go","text":"Search"}
            ]}]}"#,
        )
        .unwrap();
        let (doc, keys) = spec.build().unwrap();
        assert_eq!(doc.by_id("search"), keys.get("q").copied());
        assert_eq!(doc.text_content(keys["go"]), "Search");
    }

    #[test]
    fn test_spec_build_rejects_duplicate_keys() {
        let spec = DocumentSpec {
            body: vec![
                ElementSpec {
                    tag: "a".into(),
                    key: Some("x".into()),
                    ..Default::default()
                },
                ElementSpec {
                    tag: "b".into(),
                    key: Some("x".into()),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(
            spec.build().unwrap_err(),
            DomError::DuplicateKey("x".to_string())
        );
    }
}
