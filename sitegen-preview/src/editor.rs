//! Edit panel controller.
//!
//! Holds a local mirror of the selected element so inputs reflect edits
//! immediately, and turns each field edit into a single-field patch. Timing is
//! driven by the caller: `show`, `request_close` and `tick` take the current
//! instant, which keeps the slide-in and slide-out delays testable.

use std::time::{Duration, Instant};

use crate::protocol::{ElementPatch, ElementSnapshot};
use crate::style::{StyleProperty, StylePatch};

pub const SLIDE_IN_DELAY: Duration = Duration::from_millis(50);
pub const CLOSE_DELAY: Duration = Duration::from_millis(300);

/// Value shown in a colour picker when the element has no colour set.
pub const DEFAULT_PICKER_COLOR: &str = "#000000";

/// Receives what the panel produces.
pub trait EditorHooks {
    fn on_update(&mut self, patch: ElementPatch);
    fn on_close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPhase {
    Hidden,
    /// Selection received; slides in once `SLIDE_IN_DELAY` has passed.
    Opening { since: Instant },
    Open,
    /// Close requested; `on_close` fires once `CLOSE_DELAY` has passed.
    Closing { since: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Text,
    ClassName,
    Style(StyleProperty),
}

impl FieldKey {
    /// Display order of the panel.
    pub const ORDER: [FieldKey; 7] = [
        FieldKey::Text,
        FieldKey::ClassName,
        FieldKey::Style(StyleProperty::Padding),
        FieldKey::Style(StyleProperty::Margin),
        FieldKey::Style(StyleProperty::FontSize),
        FieldKey::Style(StyleProperty::BackgroundColor),
        FieldKey::Style(StyleProperty::Color),
    ];

    pub fn label(self) -> &'static str {
        match self {
            FieldKey::Text => "Text Content",
            FieldKey::ClassName => "Class Name",
            FieldKey::Style(prop) => prop.field_name(),
        }
    }

    pub fn input(self) -> InputKind {
        match self {
            FieldKey::Text => InputKind::TextArea,
            FieldKey::Style(prop) if prop.is_color() => InputKind::Color,
            _ => InputKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    TextArea,
    Text,
    Color,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelField {
    pub key: FieldKey,
    pub label: &'static str,
    pub input: InputKind,
    /// Value bound to the input. Colour pickers fall back to `#000000`.
    pub value: String,
    /// The mirrored value as-is, shown next to colour pickers.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub tag_name: String,
    /// False while opening or closing.
    pub slid_in: bool,
    pub fields: Vec<PanelField>,
}

#[derive(Debug)]
pub struct EditorPanel<H: EditorHooks> {
    hooks: H,
    phase: PanelPhase,
    mirror: Option<ElementSnapshot>,
}

impl<H: EditorHooks> EditorPanel<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            phase: PanelPhase::Hidden,
            mirror: None,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn phase(&self) -> PanelPhase {
        self.phase
    }

    pub fn selection(&self) -> Option<&ElementSnapshot> {
        self.mirror.as_ref()
    }

    /// Replaces the mirror with the host's current selection.
    pub fn show(&mut self, selection: Option<ElementSnapshot>, now: Instant) {
        match selection {
            Some(snapshot) => {
                self.mirror = Some(snapshot);
                self.phase = match self.phase {
                    PanelPhase::Open => PanelPhase::Open,
                    PanelPhase::Opening { since } => PanelPhase::Opening { since },
                    // A selection arriving mid-close cancels the close.
                    PanelPhase::Hidden | PanelPhase::Closing { .. } => PanelPhase::Opening { since: now },
                };
            }
            None => {
                self.mirror = None;
                self.phase = PanelPhase::Hidden;
            }
        }
    }

    /// Updates the mirror, then emits one patch carrying only that field.
    /// Ignored when nothing is selected.
    pub fn edit(&mut self, key: FieldKey, value: &str) {
        let Some(mirror) = self.mirror.as_mut() else {
            return;
        };
        let patch = match key {
            FieldKey::Text => {
                mirror.text = value.to_string();
                ElementPatch::text(value)
            }
            FieldKey::ClassName => {
                mirror.class_name = value.to_string();
                ElementPatch::class_name(value)
            }
            FieldKey::Style(prop) => {
                mirror.styles.set(prop, value);
                ElementPatch::styles(StylePatch::single(prop, value))
            }
        };
        self.hooks.on_update(patch);
    }

    pub fn set_text(&mut self, value: &str) {
        self.edit(FieldKey::Text, value);
    }

    pub fn set_class_name(&mut self, value: &str) {
        self.edit(FieldKey::ClassName, value);
    }

    pub fn set_style(&mut self, prop: StyleProperty, value: &str) {
        self.edit(FieldKey::Style(prop), value);
    }

    pub fn request_close(&mut self, now: Instant) {
        if self.mirror.is_some() && !matches!(self.phase, PanelPhase::Closing { .. }) {
            self.phase = PanelPhase::Closing { since: now };
        }
    }

    /// Advances the slide timers.
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            PanelPhase::Opening { since } if now.saturating_duration_since(since) >= SLIDE_IN_DELAY => {
                self.phase = PanelPhase::Open;
            }
            PanelPhase::Closing { since } if now.saturating_duration_since(since) >= CLOSE_DELAY => {
                self.mirror = None;
                self.phase = PanelPhase::Hidden;
                self.hooks.on_close();
            }
            _ => {}
        }
    }

    /// Earliest instant at which `tick` would change something.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            PanelPhase::Opening { since } => Some(since + SLIDE_IN_DELAY),
            PanelPhase::Closing { since } => Some(since + CLOSE_DELAY),
            PanelPhase::Hidden | PanelPhase::Open => None,
        }
    }

    pub fn view(&self) -> Option<PanelView> {
        let mirror = self.mirror.as_ref()?;
        let fields = FieldKey::ORDER
            .into_iter()
            .map(|key| {
                let raw = match key {
                    FieldKey::Text => mirror.text.clone(),
                    FieldKey::ClassName => mirror.class_name.clone(),
                    FieldKey::Style(prop) => mirror.styles.get(prop).to_string(),
                };
                let input = key.input();
                let value = if input == InputKind::Color && raw.is_empty() {
                    DEFAULT_PICKER_COLOR.to_string()
                } else {
                    raw.clone()
                };
                PanelField {
                    key,
                    label: key.label(),
                    input,
                    value,
                    raw,
                }
            })
            .collect();
        Some(PanelView {
            tag_name: mirror.tag_name.clone(),
            slid_in: self.phase == PanelPhase::Open,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ElementStyles;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Recorder {
        patches: Vec<ElementPatch>,
        closes: usize,
    }

    impl EditorHooks for Recorder {
        fn on_update(&mut self, patch: ElementPatch) {
            self.patches.push(patch);
        }

        fn on_close(&mut self) {
            self.closes += 1;
        }
    }

    fn snapshot(tag: &str) -> ElementSnapshot {
        ElementSnapshot {
            marker: "1".into(),
            tag_name: tag.into(),
            class_name: "hero".into(),
            text: "Hello".into(),
            styles: ElementStyles {
                color: "rgb(0, 0, 0)".into(),
                ..ElementStyles::default()
            },
        }
    }

    #[test]
    fn test_slides_in_after_delay() {
        let t0 = Instant::now();
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("h1")), t0);
        assert!(!panel.view().unwrap().slid_in);
        panel.tick(t0 + Duration::from_millis(20));
        assert!(matches!(panel.phase(), PanelPhase::Opening { .. }));
        panel.tick(t0 + SLIDE_IN_DELAY);
        assert_eq!(panel.phase(), PanelPhase::Open);
        assert!(panel.view().unwrap().slid_in);
    }

    #[test]
    fn test_edit_emits_single_field_patch() {
        let t0 = Instant::now();
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("h1")), t0);
        panel.set_style(StyleProperty::BackgroundColor, "#ff0000");
        panel.set_text("Hi");

        assert_eq!(
            panel.hooks().patches,
            vec![
                ElementPatch::styles(StylePatch::single(StyleProperty::BackgroundColor, "#ff0000")),
                ElementPatch::text("Hi"),
            ]
        );
        let mirror = panel.selection().unwrap();
        assert_eq!(mirror.styles.background_color, "#ff0000");
        assert_eq!(mirror.text, "Hi");
    }

    #[test]
    fn test_edit_without_selection_is_ignored() {
        let mut panel = EditorPanel::new(Recorder::default());
        panel.set_class_name("x");
        assert!(panel.hooks().patches.is_empty());
        assert!(panel.view().is_none());
    }

    #[test]
    fn test_close_fires_after_delay() {
        let t0 = Instant::now();
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("p")), t0);
        panel.tick(t0 + SLIDE_IN_DELAY);
        panel.request_close(t0 + Duration::from_millis(100));
        panel.tick(t0 + Duration::from_millis(200));
        assert_eq!(panel.hooks().closes, 0);
        panel.tick(t0 + Duration::from_millis(400));
        assert_eq!(panel.hooks().closes, 1);
        assert_eq!(panel.phase(), PanelPhase::Hidden);
        assert!(panel.view().is_none());
        panel.tick(t0 + Duration::from_millis(900));
        assert_eq!(panel.hooks().closes, 1);
    }

    #[test]
    fn test_new_selection_cancels_close() {
        let t0 = Instant::now();
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("p")), t0);
        panel.request_close(t0 + Duration::from_millis(60));
        panel.show(Some(snapshot("h2")), t0 + Duration::from_millis(100));
        panel.tick(t0 + Duration::from_millis(500));
        assert_eq!(panel.hooks().closes, 0);
        assert_eq!(panel.phase(), PanelPhase::Open);
        assert_eq!(panel.view().unwrap().tag_name, "h2");
    }

    #[test]
    fn test_view_field_order_and_color_default() {
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("div")), Instant::now());
        let view = panel.view().unwrap();
        let labels: Vec<&str> = view.fields.iter().map(|f| f.label).collect();
        assert_eq!(
            labels,
            vec!["Text Content", "Class Name", "padding", "margin", "fontSize", "backgroundColor", "color"]
        );
        assert_eq!(view.fields[0].input, InputKind::TextArea);
        let bg = &view.fields[5];
        assert_eq!(bg.input, InputKind::Color);
        assert_eq!(bg.value, DEFAULT_PICKER_COLOR);
        assert_eq!(bg.raw, "");
        assert_eq!(view.fields[6].value, "rgb(0, 0, 0)");
    }

    #[test]
    fn test_show_none_hides() {
        let t0 = Instant::now();
        let mut panel = EditorPanel::new(Recorder::default());
        panel.show(Some(snapshot("p")), t0);
        panel.show(None, t0);
        assert_eq!(panel.phase(), PanelPhase::Hidden);
        assert_eq!(panel.next_deadline(), None);
    }
}
