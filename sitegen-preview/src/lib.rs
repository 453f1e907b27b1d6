//! Sandboxed preview and live visual editing for generated websites.
//!
//! Generated markup is composed into a full document, optionally instrumented,
//! and mounted in an isolated frame. The host and the frame talk only through
//! JSON envelopes; the edit panel turns field changes into patches, and
//! `extract` is the one way to read the edited document back out.

pub mod compose;
pub mod dom;
pub mod editor;
pub mod error;
pub mod export;
pub mod frame;
pub mod instrument;
pub mod parser;
pub mod protocol;
pub mod selector;
pub mod style;

pub use compose::{compose, compose_with, ComposeOptions};
pub use dom::{Dom, Element, NodeId, NodeKind};
pub use editor::{EditorHooks, EditorPanel, FieldKey, InputKind, PanelField, PanelPhase, PanelView};
pub use error::{PreviewError, PreviewResult};
pub use export::{data_url, download_file_name, write_download};
pub use frame::{Device, FrameDescriptor, FrameLink, HostConfig, PanelHooks, PreviewHost, SandboxPolicy};
pub use instrument::{PointerEvent, PointerTarget, Sandbox};
pub use parser::parse_html;
pub use protocol::{decode, encode, ElementPatch, ElementSnapshot, Envelope, HostMessage, SandboxMessage};
pub use selector::Selector;
pub use style::{ElementStyles, InlineStyle, StylePatch, StyleProperty};
