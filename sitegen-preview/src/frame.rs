//! Isolated frame runtime and the host that mounts it.
//!
//! A mounted frame is a tokio task that owns a `Sandbox` outright. The host
//! reaches it only through string envelopes on an unbounded channel, and the
//! frame answers on a shared outbox tagged with its mount id. Remounting aborts
//! the old task and starts a fresh one, so nothing installed by one mount can
//! survive into the next.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::compose::{compose_with, ComposeOptions};
use crate::editor::{EditorHooks, EditorPanel};
use crate::instrument::{PointerEvent, PointerTarget, Sandbox};
use crate::protocol::{decode, encode, ElementPatch, HostMessage, SandboxMessage};

pub const DEFAULT_MOUNT_DELAY: Duration = Duration::from_millis(10);

/// Token list for the frame's `sandbox` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    tokens: Vec<String>,
}

impl SandboxPolicy {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

impl Default for SandboxPolicy {
    /// Scripts and forms run inside the frame; no same-origin access, so the
    /// frame cannot reach the host's storage, cookies or top navigation.
    fn default() -> Self {
        Self::new(["allow-scripts", "allow-forms"])
    }
}

impl fmt::Display for SandboxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Desktop,
    Tablet,
    Phone,
}

impl Device {
    pub fn width(self) -> &'static str {
        match self {
            Device::Desktop => "100%",
            Device::Tablet => "768px",
            Device::Phone => "412px",
        }
    }
}

/// Everything a web UI needs to embed the current mount.
///
/// The sandbox token list leaves out `allow-same-origin`, so the embedding page
/// cannot reach into `contentDocument`. A browser host reads the edited markup
/// by posting `EXTRACT_REQUEST` and waiting for `EXTRACT_RESULT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub srcdoc: String,
    pub sandbox: String,
    pub title: String,
    pub width: &'static str,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub mount_delay: Duration,
    pub policy: SandboxPolicy,
    /// Instrument mounted documents for visual editing.
    pub editing: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mount_delay: DEFAULT_MOUNT_DELAY,
            policy: SandboxPolicy::default(),
            editing: true,
        }
    }
}

#[derive(Debug)]
enum FrameInput {
    /// Envelope from the host.
    Post(String),
    /// User input inside the frame.
    Pointer(PointerEvent),
    Extract(oneshot::Sender<String>),
}

#[derive(Debug)]
struct FramePost {
    mount: u64,
    data: String,
}

struct Frame {
    mount: u64,
    input: mpsc::UnboundedSender<FrameInput>,
    task: JoinHandle<()>,
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_frame(mount: u64, srcdoc: String, outbox: mpsc::UnboundedSender<FramePost>) -> Frame {
    let (input, mut rx) = mpsc::unbounded_channel::<FrameInput>();
    let task = tokio::spawn(async move {
        let mut sandbox = Sandbox::load(&srcdoc);
        tracing::debug!(mount, listening = sandbox.is_listening(), "frame loaded");
        let post = |msg: SandboxMessage| {
            let _ = outbox.send(FramePost {
                mount,
                data: encode(&msg),
            });
        };
        while let Some(input) = rx.recv().await {
            match input {
                FrameInput::Post(raw) => {
                    if let Some(reply) = sandbox.receive(&raw) {
                        post(reply);
                    }
                }
                FrameInput::Pointer(event) => {
                    if let Some(msg) = sandbox.dispatch_pointer(&event) {
                        post(msg);
                    }
                }
                FrameInput::Extract(reply) => {
                    let _ = reply.send(sandbox.extract());
                }
            }
        }
    });
    Frame { mount, input, task }
}

#[derive(Default)]
struct FrameSlot {
    /// Bumped on every accepted `load`; a pending mount only lands if it still matches.
    generation: u64,
    frame: Option<Frame>,
}

/// Shared handle to whichever frame is currently mounted.
#[derive(Clone, Default)]
pub struct FrameLink {
    slot: Arc<Mutex<FrameSlot>>,
}

impl FrameLink {
    fn lock(&self) -> MutexGuard<'_, FrameSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, input: FrameInput) -> bool {
        match &self.lock().frame {
            Some(frame) => frame.input.send(input).is_ok(),
            None => false,
        }
    }

    /// Fire-and-forget envelope to the mounted frame. False when nothing is mounted.
    pub fn post(&self, message: &HostMessage) -> bool {
        self.send(FrameInput::Post(encode(message)))
    }

    pub fn mount_id(&self) -> Option<u64> {
        self.lock().frame.as_ref().map(|f| f.mount)
    }
}

/// Connects the edit panel to the mounted frame.
pub struct PanelHooks {
    link: FrameLink,
}

impl EditorHooks for PanelHooks {
    fn on_update(&mut self, patch: ElementPatch) {
        if !self.link.post(&HostMessage::UpdateElement(patch)) {
            tracing::debug!("no frame mounted; patch dropped");
        }
    }

    fn on_close(&mut self) {
        self.link.post(&HostMessage::ClearSelectionRequest);
    }
}

pub struct PreviewHost {
    config: HostConfig,
    link: FrameLink,
    outbox_tx: mpsc::UnboundedSender<FramePost>,
    outbox_rx: mpsc::UnboundedReceiver<FramePost>,
    mounted_tx: watch::Sender<u64>,
    pending: Option<JoinHandle<()>>,
    loaded: Option<(String, String)>,
    title: String,
    panel: EditorPanel<PanelHooks>,
}

impl PreviewHost {
    pub fn new(config: HostConfig) -> Self {
        let link = FrameLink::default();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (mounted_tx, _) = watch::channel(0);
        let panel = EditorPanel::new(PanelHooks { link: link.clone() });
        Self {
            config,
            link,
            outbox_tx,
            outbox_rx,
            mounted_tx,
            pending: None,
            loaded: None,
            title: String::from("Website Preview"),
            panel,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn load(&mut self, identity: &str, markup: &str) {
        let opts = ComposeOptions {
            editing: self.config.editing,
            title: None,
        };
        self.load_with(identity, markup, &opts);
    }

    /// Composes `markup` and schedules a fresh mount if the (identity, document)
    /// pair changed. The current frame is discarded right away; a later `load`
    /// within the mount delay supersedes this one.
    pub fn load_with(&mut self, identity: &str, markup: &str, opts: &ComposeOptions) {
        let srcdoc = compose_with(markup, opts);
        let key = (identity.to_string(), srcdoc);
        if self.loaded.as_ref() == Some(&key) {
            return;
        }
        if let Some(title) = &opts.title {
            self.title = title.clone();
        }

        let generation = {
            let mut slot = self.link.lock();
            slot.generation += 1;
            slot.frame = None;
            slot.generation
        };
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.panel.show(None, now());

        let link = self.link.clone();
        let outbox = self.outbox_tx.clone();
        let mounted = self.mounted_tx.clone();
        let delay = self.config.mount_delay;
        let srcdoc = key.1.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut slot = link.lock();
            if slot.generation != generation {
                return;
            }
            slot.frame = Some(spawn_frame(generation, srcdoc, outbox));
            drop(slot);
            tracing::info!(mount = generation, "preview mounted");
            mounted.send_replace(generation);
        }));
        self.loaded = Some(key);
    }

    /// Resolves once the most recently scheduled mount is live.
    pub async fn wait_mounted(&self) {
        let target = self.link.lock().generation;
        let mut rx = self.mounted_tx.subscribe();
        let _ = rx.wait_for(|mounted| *mounted >= target).await;
    }

    pub fn mount_id(&self) -> Option<u64> {
        self.link.mount_id()
    }

    pub fn frame_descriptor(&self, device: Device) -> Option<FrameDescriptor> {
        let (_, srcdoc) = self.loaded.as_ref()?;
        Some(FrameDescriptor {
            srcdoc: srcdoc.clone(),
            sandbox: self.config.policy.to_string(),
            title: self.title.clone(),
            width: device.width(),
        })
    }

    /// Delivers a pointer event inside the mounted frame, as if the user acted.
    pub fn pointer(&self, event: PointerEvent) -> bool {
        self.link.send(FrameInput::Pointer(event))
    }

    pub fn click(&self, target: PointerTarget) -> bool {
        self.pointer(PointerEvent::Click(target))
    }

    pub fn post(&self, message: &HostMessage) -> bool {
        self.link.post(message)
    }

    /// Waits for the next envelope from the current mount and routes it to the
    /// edit panel. Posts from discarded mounts and unknown envelopes are skipped.
    pub async fn next_message(&mut self) -> Option<SandboxMessage> {
        loop {
            let post = self.outbox_rx.recv().await?;
            if self.link.mount_id() != Some(post.mount) {
                tracing::debug!(mount = post.mount, "dropping post from a discarded frame");
                continue;
            }
            let Some(message) = decode::<SandboxMessage>(&post.data) else {
                continue;
            };
            match &message {
                SandboxMessage::ElementSelected(snapshot) => {
                    self.panel.show(Some(snapshot.clone()), now());
                }
                SandboxMessage::ClearSelection => self.panel.show(None, now()),
                SandboxMessage::ExtractResult(_) => {}
            }
            return Some(message);
        }
    }

    /// Clean markup of the mounted document, or `None` when nothing is mounted.
    pub async fn extract(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        if !self.link.send(FrameInput::Extract(tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn panel(&self) -> &EditorPanel<PanelHooks> {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut EditorPanel<PanelHooks> {
        &mut self.panel
    }

    pub fn close_panel(&mut self) {
        self.panel.request_close(now());
    }

    /// Advances the panel's slide timers.
    pub fn tick(&mut self) {
        self.panel.tick(now());
    }
}

impl Drop for PreviewHost {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.link.lock().frame = None;
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
