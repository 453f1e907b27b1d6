use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreviewError;

/// The five style properties the edit surface exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StyleProperty {
    Padding,
    Margin,
    BackgroundColor,
    Color,
    FontSize,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 5] = [
        StyleProperty::Padding,
        StyleProperty::Margin,
        StyleProperty::BackgroundColor,
        StyleProperty::Color,
        StyleProperty::FontSize,
    ];

    /// Declaration name inside a `style` attribute.
    pub fn css_name(self) -> &'static str {
        match self {
            StyleProperty::Padding => "padding",
            StyleProperty::Margin => "margin",
            StyleProperty::BackgroundColor => "background-color",
            StyleProperty::Color => "color",
            StyleProperty::FontSize => "font-size",
        }
    }

    /// Field name on the wire and in the edit panel.
    pub fn field_name(self) -> &'static str {
        match self {
            StyleProperty::Padding => "padding",
            StyleProperty::Margin => "margin",
            StyleProperty::BackgroundColor => "backgroundColor",
            StyleProperty::Color => "color",
            StyleProperty::FontSize => "fontSize",
        }
    }

    pub fn is_color(self) -> bool {
        matches!(self, StyleProperty::BackgroundColor | StyleProperty::Color)
    }
}

impl fmt::Display for StyleProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for StyleProperty {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StyleProperty::ALL
            .into_iter()
            .find(|p| p.field_name() == s || p.css_name() == s)
            .ok_or_else(|| PreviewError::UnknownStyleProperty {
                name: s.to_string(),
            })
    }
}

/// Style values reported for a selected element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementStyles {
    pub padding: String,
    pub margin: String,
    pub background_color: String,
    pub color: String,
    pub font_size: String,
}

impl ElementStyles {
    pub fn get(&self, prop: StyleProperty) -> &str {
        match prop {
            StyleProperty::Padding => &self.padding,
            StyleProperty::Margin => &self.margin,
            StyleProperty::BackgroundColor => &self.background_color,
            StyleProperty::Color => &self.color,
            StyleProperty::FontSize => &self.font_size,
        }
    }

    pub fn set(&mut self, prop: StyleProperty, value: impl Into<String>) {
        let slot = match prop {
            StyleProperty::Padding => &mut self.padding,
            StyleProperty::Margin => &mut self.margin,
            StyleProperty::BackgroundColor => &mut self.background_color,
            StyleProperty::Color => &mut self.color,
            StyleProperty::FontSize => &mut self.font_size,
        };
        *slot = value.into();
    }

    pub fn from_inline(style: &InlineStyle) -> Self {
        let mut styles = Self::default();
        for prop in StyleProperty::ALL {
            styles.set(prop, style.get(prop.css_name()).unwrap_or_default());
        }
        styles
    }
}

/// Partial style update. Only the properties that are set get applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
}

impl StylePatch {
    pub fn single(prop: StyleProperty, value: impl Into<String>) -> Self {
        let mut patch = Self::default();
        patch.set(prop, value);
        patch
    }

    pub fn set(&mut self, prop: StyleProperty, value: impl Into<String>) {
        let slot = match prop {
            StyleProperty::Padding => &mut self.padding,
            StyleProperty::Margin => &mut self.margin,
            StyleProperty::BackgroundColor => &mut self.background_color,
            StyleProperty::Color => &mut self.color,
            StyleProperty::FontSize => &mut self.font_size,
        };
        *slot = Some(value.into());
    }

    pub fn get(&self, prop: StyleProperty) -> Option<&str> {
        match prop {
            StyleProperty::Padding => self.padding.as_deref(),
            StyleProperty::Margin => self.margin.as_deref(),
            StyleProperty::BackgroundColor => self.background_color.as_deref(),
            StyleProperty::Color => self.color.as_deref(),
            StyleProperty::FontSize => self.font_size.as_deref(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (StyleProperty, &str)> + '_ {
        StyleProperty::ALL
            .into_iter()
            .filter_map(move |p| self.get(p).map(|v| (p, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

/// Ordered declarations of a `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(source: &str) -> Self {
        let declarations = source
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim();
                if name.is_empty() || value.is_empty() {
                    return None;
                }
                Some((name, value.to_string()))
            })
            .collect();
        Self { declarations }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a declaration in place, or appends it. An empty value removes it.
    pub fn set(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.declarations.retain(|(n, _)| n != name);
            return;
        }
        match self.declarations.iter_mut().find(|(n, _)| n == name) {
            Some(decl) => decl.1 = value.to_string(),
            None => self.declarations.push((name.to_string(), value.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.declarations {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}: {};", name, value)?;
        }
        Ok(())
    }
}
