//! Selection and patch instrumentation that runs inside the isolated frame.
//!
//! `INSTRUMENTATION_SCRIPT` is the browser side, injected by `compose`. The
//! `Sandbox` type is the same behaviour over the native `Dom`: one instance per
//! mount, owning its document outright. Listeners only exist when the mounted
//! document carries the instrumentation script.

use crate::dom::{Dom, Element, NodeId};
use crate::export;
use crate::parser::parse_html;
use crate::protocol::{decode, ElementPatch, ElementSnapshot, ExtractedMarkup, HostMessage, SandboxMessage};
use crate::style::{ElementStyles, InlineStyle};

pub const STYLE_ID: &str = "ai-preview-style";
pub const SCRIPT_ID: &str = "ai-preview-script";
pub const SELECTED_CLASS: &str = "ai-selected-element";
pub const SELECTED_ATTR: &str = "data-ai-selected";
pub const HOVER_CLASS: &str = "ai-hover-element";

pub const INSTRUMENTATION_STYLE: &str = include_str!("assets/instrument.css");
pub const INSTRUMENTATION_SCRIPT: &str = include_str!("assets/instrument.js");

/// The style + script block appended to editable documents.
pub fn instrumentation_markup() -> String {
    format!(
        "<style id=\"{}\">{}</style><script id=\"{}\">{}</script>",
        STYLE_ID,
        INSTRUMENTATION_STYLE.trim_end(),
        SCRIPT_ID,
        INSTRUMENTATION_SCRIPT.trim_end()
    )
}

fn is_instrumentation_node(el: &Element) -> bool {
    el.id()
        .map(|id| id == STYLE_ID || id == SCRIPT_ID)
        .unwrap_or(false)
}

/// Where a simulated pointer event lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerTarget {
    /// First element matching the selector.
    Selector(String),
    /// Empty space: no element under the pointer.
    Background,
}

impl PointerTarget {
    pub fn selector(selector: impl Into<String>) -> Self {
        PointerTarget::Selector(selector.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEvent {
    Click(PointerTarget),
    Hover(PointerTarget),
    Leave,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    dom: Dom,
    listening: bool,
    selected: Option<NodeId>,
    hovered: Option<NodeId>,
    next_marker: u64,
}

impl Sandbox {
    /// Parses the composed document and installs listeners if it is instrumented.
    pub fn load(markup: &str) -> Self {
        let dom = parse_html(markup);
        let listening = dom.get_element_by_id(SCRIPT_ID).is_some();
        Self {
            dom,
            listening,
            selected: None,
            hovered: None,
            next_marker: 1,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Handles a pointer event. Returns the message to post to the host, if any.
    pub fn dispatch_pointer(&mut self, event: &PointerEvent) -> Option<SandboxMessage> {
        if !self.listening {
            return None;
        }
        match event {
            PointerEvent::Click(target) => {
                let node = self.resolve(target);
                if node.map(|n| self.is_instrumentation(n)).unwrap_or(false) {
                    return None;
                }
                match node.filter(|&n| self.is_editable(n)) {
                    Some(node) => Some(self.select(node)),
                    None => {
                        self.unmark();
                        Some(SandboxMessage::ClearSelection)
                    }
                }
            }
            PointerEvent::Hover(target) => {
                let node = self.resolve(target).filter(|&n| self.is_editable(n));
                if self.hovered != node {
                    self.clear_hover();
                    if let Some(n) = node {
                        if let Some(el) = self.dom.element_mut(n) {
                            el.add_class(HOVER_CLASS);
                        }
                        self.hovered = Some(n);
                    }
                }
                None
            }
            PointerEvent::Leave => {
                self.clear_hover();
                None
            }
        }
    }

    /// Handles a raw envelope from the host. Unknown envelopes are ignored.
    pub fn receive(&mut self, raw: &str) -> Option<SandboxMessage> {
        if !self.listening {
            return None;
        }
        match decode::<HostMessage>(raw)? {
            HostMessage::ClearSelectionRequest => {
                self.unmark();
                Some(SandboxMessage::ClearSelection)
            }
            HostMessage::UpdateElement(patch) => {
                self.apply_patch(&patch);
                None
            }
            HostMessage::ExtractRequest => Some(SandboxMessage::ExtractResult(ExtractedMarkup {
                html: self.extract(),
            })),
        }
    }

    /// Applies a patch to the marked element. Without a mark this is a no-op,
    /// since the host may still be sending for a selection that was just cleared.
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> bool {
        let Some(node) = self.selected else {
            tracing::debug!("patch arrived with no active selection; ignoring");
            return false;
        };

        if let Some(text) = &patch.text {
            self.dom.set_text_content(node, text);
        }

        let Some(el) = self.dom.element_mut(node) else {
            return false;
        };
        if let Some(class_name) = &patch.class_name {
            if class_name.trim().is_empty() {
                el.remove_attr("class");
            } else {
                el.set_attr("class", class_name.trim());
            }
            el.add_class(SELECTED_CLASS);
        }
        if let Some(styles) = &patch.styles {
            let mut inline = InlineStyle::parse(el.attr("style").unwrap_or_default());
            for (prop, value) in styles.entries() {
                inline.set(prop.css_name(), value);
            }
            if inline.is_empty() {
                el.remove_attr("style");
            } else {
                el.set_attr("style", &inline.to_string());
            }
        }
        true
    }

    pub fn snapshot(&self, node: NodeId) -> Option<ElementSnapshot> {
        let el = self.dom.element(node)?;
        let class_name = el
            .classes()
            .into_iter()
            .filter(|c| c != SELECTED_CLASS && c != HOVER_CLASS)
            .collect::<Vec<_>>()
            .join(" ");
        let inline = InlineStyle::parse(el.attr("style").unwrap_or_default());
        Some(ElementSnapshot {
            marker: el.attr(SELECTED_ATTR).unwrap_or_default().to_string(),
            tag_name: el.name.clone(),
            class_name,
            text: self.dom.text_content(node),
            styles: ElementStyles::from_inline(&inline),
        })
    }

    /// Clean markup of the current state. Works on a copy, so the live
    /// selection and listeners are left as they are.
    pub fn extract(&self) -> String {
        let mut copy = self.dom.clone();
        export::strip_instrumentation(&mut copy);
        export::root_markup(&copy)
    }

    fn select(&mut self, node: NodeId) -> SandboxMessage {
        self.unmark();
        let marker = self.next_marker;
        self.next_marker += 1;
        if let Some(el) = self.dom.element_mut(node) {
            el.add_class(SELECTED_CLASS);
            el.set_attr(SELECTED_ATTR, &marker.to_string());
        }
        self.selected = Some(node);
        match self.snapshot(node) {
            Some(snapshot) => SandboxMessage::ElementSelected(snapshot),
            None => SandboxMessage::ClearSelection,
        }
    }

    fn unmark(&mut self) {
        if let Some(node) = self.selected.take() {
            if let Some(el) = self.dom.element_mut(node) {
                el.remove_class(SELECTED_CLASS);
                el.remove_attr(SELECTED_ATTR);
            }
        }
    }

    fn clear_hover(&mut self) {
        if let Some(node) = self.hovered.take() {
            if let Some(el) = self.dom.element_mut(node) {
                el.remove_class(HOVER_CLASS);
            }
        }
    }

    fn resolve(&self, target: &PointerTarget) -> Option<NodeId> {
        match target {
            PointerTarget::Background => None,
            PointerTarget::Selector(sel) => match self.dom.query_selector(sel) {
                Ok(node) => node,
                Err(e) => {
                    tracing::debug!("pointer target did not resolve: {}", e);
                    None
                }
            },
        }
    }

    fn is_instrumentation(&self, node: NodeId) -> bool {
        self.dom.has_ancestor_or_self(node, is_instrumentation_node)
    }

    fn is_editable(&self, node: NodeId) -> bool {
        match self.dom.tag_name(node) {
            Some("html") | Some("body") | None => false,
            Some(_) => self.dom.is_connected(node) && !self.is_instrumentation(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose;
    use crate::style::{StyleProperty, StylePatch};
    use pretty_assertions::assert_eq;

    fn sandbox(body: &str) -> Sandbox {
        Sandbox::load(&compose(body, true))
    }

    fn click(sb: &mut Sandbox, sel: &str) -> Option<SandboxMessage> {
        sb.dispatch_pointer(&PointerEvent::Click(PointerTarget::selector(sel)))
    }

    fn marked(sb: &Sandbox) -> Vec<NodeId> {
        sb.dom()
            .query_selector_all(".ai-selected-element, [data-ai-selected]")
            .unwrap()
    }

    #[test]
    fn test_click_reports_snapshot() {
        let mut sb = sandbox("<div class=\"card\" style=\"padding: 8px\">Hi</div>");
        let Some(SandboxMessage::ElementSelected(snap)) = click(&mut sb, "div.card") else {
            panic!("expected selection");
        };
        assert_eq!(snap.tag_name, "div");
        assert_eq!(snap.class_name, "card");
        assert_eq!(snap.text, "Hi");
        assert_eq!(snap.styles.padding, "8px");
        assert_eq!(snap.marker, "1");
    }

    #[test]
    fn test_only_one_element_marked() {
        let mut sb = sandbox("<h1>A</h1><p>B</p><span>C</span>");
        click(&mut sb, "h1");
        click(&mut sb, "p");
        click(&mut sb, "span");
        click(&mut sb, "p");
        let marks = marked(&sb);
        assert_eq!(marks.len(), 1);
        assert_eq!(sb.dom().tag_name(marks[0]), Some("p"));
    }

    #[test]
    fn test_background_click_clears() {
        let mut sb = sandbox("<p>B</p>");
        click(&mut sb, "p");
        let msg = sb.dispatch_pointer(&PointerEvent::Click(PointerTarget::Background));
        assert_eq!(msg, Some(SandboxMessage::ClearSelection));
        assert!(marked(&sb).is_empty());
        assert_eq!(click(&mut sb, "body"), Some(SandboxMessage::ClearSelection));
    }

    #[test]
    fn test_instrumentation_nodes_are_not_selectable() {
        let mut sb = sandbox("<p>B</p>");
        assert_eq!(click(&mut sb, "#ai-preview-script"), None);
        assert_eq!(click(&mut sb, "#ai-preview-style"), None);
        assert!(marked(&sb).is_empty());
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut sb = sandbox("<p class=\"a\">B</p>");
        click(&mut sb, "p");
        let patch = ElementPatch {
            text: Some("C".into()),
            class_name: Some("b".into()),
            styles: Some(StylePatch::single(StyleProperty::Color, "red")),
        };
        assert!(sb.apply_patch(&patch));
        let once = sb.dom().serialize();
        sb.apply_patch(&patch);
        assert_eq!(sb.dom().serialize(), once);
        let p = sb.selected().unwrap();
        let el = sb.dom().element(p).unwrap();
        assert!(el.has_class("b") && el.has_class(SELECTED_CLASS) && !el.has_class("a"));
    }

    #[test]
    fn test_patch_without_selection_is_noop() {
        let mut sb = sandbox("<p>B</p>");
        let before = sb.dom().serialize();
        assert!(!sb.apply_patch(&ElementPatch::text("X")));
        assert_eq!(sb.dom().serialize(), before);
    }

    #[test]
    fn test_patch_touches_only_selected_element() {
        let mut sb = sandbox("<p id=\"one\">1</p><p id=\"two\">2</p>");
        click(&mut sb, "#two");
        sb.apply_patch(&ElementPatch::styles(StylePatch::single(StyleProperty::Margin, "4px")));
        let one = sb.dom().get_element_by_id("one").unwrap();
        assert_eq!(sb.dom().outer_html(one), "<p id=\"one\">1</p>");
    }

    #[test]
    fn test_unknown_envelope_changes_nothing() {
        let mut sb = sandbox("<p>B</p>");
        click(&mut sb, "p");
        let before = sb.dom().serialize();
        assert_eq!(sb.receive(r#"{"type":"DELETE_ELEMENT","payload":{}}"#), None);
        assert_eq!(sb.dom().serialize(), before);
        assert!(sb.selected().is_some());
    }

    #[test]
    fn test_hover_class_follows_pointer() {
        let mut sb = sandbox("<h1>A</h1><p>B</p>");
        sb.dispatch_pointer(&PointerEvent::Hover(PointerTarget::selector("h1")));
        sb.dispatch_pointer(&PointerEvent::Hover(PointerTarget::selector("p")));
        assert_eq!(sb.dom().query_selector_all(".ai-hover-element").unwrap().len(), 1);
        sb.dispatch_pointer(&PointerEvent::Leave);
        assert!(sb.dom().query_selector_all(".ai-hover-element").unwrap().is_empty());
    }

    #[test]
    fn test_extract_request_answers_with_clean_markup() {
        let mut sb = sandbox("<p>B</p>");
        click(&mut sb, "p");
        let Some(SandboxMessage::ExtractResult(extracted)) = sb.receive(r#"{"type":"EXTRACT_REQUEST"}"#) else {
            panic!("expected extracted markup");
        };
        assert_eq!(extracted.html, sb.extract());
        assert!(!extracted.html.contains(SELECTED_ATTR));
        assert!(sb.selected().is_some());
    }

    #[test]
    fn test_uninstrumented_document_has_no_listeners() {
        let mut sb = Sandbox::load(&compose("<p>B</p>", false));
        assert!(!sb.is_listening());
        assert_eq!(click(&mut sb, "p"), None);
        assert_eq!(sb.receive(r#"{"type":"CLEAR_SELECTION_REQUEST"}"#), None);
    }
}
