//! Envelopes exchanged across the frame boundary.
//!
//! Every message is plain JSON `{"type": ..., "payload": ...}`. Each direction
//! has a closed set of kinds; a receiver drops anything outside its set, and
//! anything whose payload does not fit, without reporting an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::style::{ElementStyles, StylePatch};

pub const ELEMENT_SELECTED: &str = "ELEMENT_SELECTED";
pub const CLEAR_SELECTION: &str = "CLEAR_SELECTION";
pub const CLEAR_SELECTION_REQUEST: &str = "CLEAR_SELECTION_REQUEST";
pub const UPDATE_ELEMENT: &str = "UPDATE_ELEMENT";
pub const EXTRACT_REQUEST: &str = "EXTRACT_REQUEST";
pub const EXTRACT_RESULT: &str = "EXTRACT_RESULT";

/// What the sandbox reports about the element a user clicked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    /// Value of the element's `data-ai-selected` attribute.
    #[serde(default)]
    pub marker: String,
    pub tag_name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub styles: ElementStyles,
}

/// Partial update for the selected element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<StylePatch>,
}

impl ElementPatch {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        Self {
            class_name: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn styles(styles: StylePatch) -> Self {
        Self {
            styles: Some(styles),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.class_name.is_none()
            && self.styles.as_ref().map(StylePatch::is_empty).unwrap_or(true)
    }
}

/// Clean markup of the frame's document, posted in answer to `EXTRACT_REQUEST`.
/// A browser host whose frame lacks `allow-same-origin` reads the document this way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMarkup {
    pub html: String,
}

/// Sandbox → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxMessage {
    ElementSelected(ElementSnapshot),
    ClearSelection,
    ExtractResult(ExtractedMarkup),
}

/// Host → sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    ClearSelectionRequest,
    UpdateElement(ElementPatch),
    ExtractRequest,
}

/// A message type with a closed set of wire kinds.
pub trait Envelope: Serialize + DeserializeOwned {
    const KINDS: &'static [&'static str];
}

impl Envelope for SandboxMessage {
    const KINDS: &'static [&'static str] = &[ELEMENT_SELECTED, CLEAR_SELECTION, EXTRACT_RESULT];
}

impl Envelope for HostMessage {
    const KINDS: &'static [&'static str] = &[CLEAR_SELECTION_REQUEST, UPDATE_ELEMENT, EXTRACT_REQUEST];
}

/// Serializes an envelope. On failure the error is logged and the result is
/// empty, which every receiver drops.
pub fn encode<M: Envelope>(message: &M) -> String {
    match serde_json::to_string(message) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("failed to encode envelope: {}", e);
            String::new()
        }
    }
}

/// Decodes an envelope, discarding unknown kinds and malformed payloads.
pub fn decode<M: Envelope>(raw: &str) -> Option<M> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("dropping non-JSON envelope: {}", e);
            return None;
        }
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        tracing::debug!("dropping envelope without a type");
        return None;
    };
    if !M::KINDS.contains(&kind) {
        tracing::debug!(kind, "dropping envelope of unknown type");
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(kind, "dropping envelope with malformed payload: {}", e);
            None
        }
    }
}
