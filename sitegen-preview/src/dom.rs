//! Arena document tree owned by a single sandbox.
//!
//! Text and attribute values are held decoded, the way the parser hands them
//! over. Serialization escapes on the way out, so any value a patch writes
//! comes back as well-formed markup.

use crate::error::PreviewResult;
use crate::selector::Selector;

pub type NodeId = usize;

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text children serialize verbatim.
pub const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// Decoded value; a bare attribute such as `disabled` holds `""`.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lowercase tag name.
    pub name: String,
    pub attrs: Vec<Attribute>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.attrs[i].value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) => self.attrs[i].value = value.to_string(),
            None => self.attrs.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: value.to_string(),
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.attrs.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().any(|t| t == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let mut classes = self.classes();
        classes.push(class.to_string());
        self.set_attr("class", &classes.join(" "));
    }

    /// Removes a class token. Drops the attribute once no class is left.
    pub fn remove_class(&mut self, class: &str) -> bool {
        if !self.has_class(class) {
            return false;
        }
        let classes: Vec<String> = self
            .classes()
            .into_iter()
            .filter(|c| c != class)
            .collect();
        if classes.is_empty() {
            self.remove_attr("class");
        } else {
            self.set_attr("class", &classes.join(" "));
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    /// Doctype name, e.g. `html`.
    Doctype(String),
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub const DOCUMENT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn document(&self) -> NodeId {
        Self::DOCUMENT
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Detaches a node (and its subtree) from the tree. The arena slot stays
    /// allocated but is no longer reachable from the document.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == Self::DOCUMENT {
                return true;
            }
            current = self.nodes[node].parent;
        }
        false
    }

    /// Preorder walk below `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node].children.iter().rev());
        }
        out
    }

    /// All connected elements in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(Self::DOCUMENT)
            .into_iter()
            .filter(|&n| self.element(n).is_some())
            .collect()
    }

    /// First element child of the document (the `<html>` element once composed).
    pub fn document_element(&self) -> Option<NodeId> {
        self.nodes[Self::DOCUMENT]
            .children
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some())
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&n| self.tag_name(n) == Some("body"))
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements().into_iter().find(|&n| {
            self.element(n)
                .and_then(|el| el.id())
                .map(|v| v == id)
                .unwrap_or(false)
        })
    }

    /// True when `id` or one of its ancestors satisfies `pred`.
    pub fn has_ancestor_or_self(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(el) = self.element(node) {
                if pred(el) {
                    return true;
                }
            }
            current = self.nodes[node].parent;
        }
        false
    }

    pub fn query_selector_all(&self, selector: &str) -> PreviewResult<Vec<NodeId>> {
        Ok(Selector::parse(selector)?.select(self))
    }

    pub fn query_selector(&self, selector: &str) -> PreviewResult<Option<NodeId>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    /// Concatenated text of every text node below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in std::iter::once(id).chain(self.descendants(id)) {
            if let NodeKind::Text(text) = &self.nodes[node].kind {
                out.push_str(text);
            }
        }
        out
    }

    /// Replaces every child of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        let children = std::mem::take(&mut self.nodes[id].children);
        for child in children {
            self.nodes[child].parent = None;
        }
        if !text.is_empty() {
            self.append(id, NodeKind::Text(text.to_string()));
        }
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.nodes[id].children {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serializes the whole document, doctype and top-level comments included.
    pub fn serialize(&self) -> String {
        self.inner_html(Self::DOCUMENT)
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Document => {
                for &child in &self.nodes[id].children {
                    self.write_node(child, out);
                }
            }
            NodeKind::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(&attr.value));
                    out.push('"');
                }
                out.push('>');
                if is_void(&el.name) {
                    return;
                }
                for &child in &self.nodes[id].children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
            NodeKind::Text(text) => {
                let verbatim = self.nodes[id]
                    .parent
                    .and_then(|p| self.tag_name(p))
                    .map(is_raw_text)
                    .unwrap_or(false);
                if verbatim {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            NodeKind::Comment(body) => {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
        }
    }
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
    out
}
