//! One open project: its backend calls, generation polling and notices.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sitegen_preview::{export, PreviewHost};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::{ConversationEntry, ProjectStatus, Role, SharedBackend};
use crate::notice::{Notice, Notifier};
use crate::status::{
    spawn_poller, Baseline, PollHandle, ProgressStage, SessionTicket, SharedSync, StatusSynchronizer, SyncEvent,
    COMPLETION_PHRASES,
};

pub const ENHANCED_PROMPT_PHRASE: &str = "I've enhanced your prompt";
pub const GENERATING_PHRASE: &str = "now generating your website";

pub fn is_enhanced_prompt_message(content: &str) -> bool {
    content.contains(ENHANCED_PROMPT_PHRASE)
}

/// Progress chatter the backend writes into the conversation.
pub fn is_status_message(content: &str) -> bool {
    content.contains(GENERATING_PHRASE) || COMPLETION_PHRASES.iter().any(|p| content.contains(p))
}

/// Whether an entry offers a rollback to the version it produced.
pub fn can_rollback(entry: &ConversationEntry, index: usize) -> bool {
    entry.role == Role::Assistant && entry.version_id.is_some() && !is_status_message(&entry.content) && index > 0
}

pub struct ProjectWorkspace {
    project_id: String,
    backend: SharedBackend,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    project: Option<ProjectStatus>,
    messages: Vec<ConversationEntry>,
    generating: bool,
    published: bool,
    sync: SharedSync,
    poller: Option<PollHandle>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl ProjectWorkspace {
    pub fn new(
        project_id: impl Into<String>,
        backend: SharedBackend,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            project_id: project_id.into(),
            backend,
            notifier,
            poll_interval,
            project: None,
            messages: Vec::new(),
            generating: false,
            published: false,
            sync: Arc::new(Mutex::new(StatusSynchronizer::new())),
            poller: None,
            events_tx,
            events_rx,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn project(&self) -> Option<&ProjectStatus> {
        self.project.as_ref()
    }

    pub fn code(&self) -> Option<&str> {
        self.project.as_ref().and_then(ProjectStatus::code)
    }

    pub fn messages(&self) -> &[ConversationEntry] {
        &self.messages
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().map(|p| !p.is_finished()).unwrap_or(false)
    }

    pub fn stage(&self) -> ProgressStage {
        self.lock_sync().stage()
    }

    fn lock_sync(&self) -> std::sync::MutexGuard<'_, StatusSynchronizer> {
        self.sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    /// Loads the project and its conversation. A project without code is
    /// still being generated, so polling starts.
    pub async fn open(&mut self) -> bool {
        match self.backend.fetch_project(&self.project_id).await {
            Ok(project) => {
                self.published = project.is_published;
                self.generating = project.code().is_none();
                if !project.conversation.is_empty() {
                    self.messages = project.conversation.clone();
                }
                self.project = Some(project);
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to fetch project")));
                self.generating = false;
                return false;
            }
        }
        self.refresh_conversation(true).await;
        if self.generating {
            self.start_polling(Baseline::default());
        }
        true
    }

    async fn refresh_conversation(&mut self, report_failure: bool) {
        match self.backend.fetch_conversation(&self.project_id).await {
            Ok(entries) => self.messages = entries,
            Err(e) => {
                tracing::warn!(project = %self.project_id, "conversation fetch failed: {}", e);
                if report_failure && self.messages.is_empty() {
                    self.notify(Notice::error("Failed to load conversation"));
                }
            }
        }
    }

    async fn refresh_project(&mut self) {
        match self.backend.fetch_project(&self.project_id).await {
            Ok(project) => {
                self.published = project.is_published;
                self.project = Some(project);
            }
            Err(e) => tracing::warn!(project = %self.project_id, "project fetch failed: {}", e),
        }
    }

    fn push_user_message(&mut self, content: &str) {
        self.messages.push(ConversationEntry {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.to_string(),
            timestamp: None,
            version_id: None,
        });
    }

    /// Where a revision starts from: the current code and every conversation
    /// entry seen so far.
    fn revision_baseline(&self) -> Baseline {
        let known = self.project.as_ref().map(|p| p.conversation.len()).unwrap_or(0);
        Baseline::revision(self.code(), known.max(self.messages.len()))
    }

    fn start_polling(&mut self, baseline: Baseline) -> SessionTicket {
        let ticket = self.lock_sync().begin_from(&self.project_id, baseline);
        self.poller = Some(spawn_poller(
            self.backend.clone(),
            self.sync.clone(),
            ticket.clone(),
            self.poll_interval,
            self.events_tx.clone(),
        ));
        ticket
    }

    pub fn stop_polling(&mut self) {
        self.lock_sync().cancel();
        self.poller = None;
    }

    /// Runs a first generation. Refused when the prompt is blank or a run is
    /// already in flight.
    pub async fn generate(&mut self, prompt: &str) -> bool {
        if self.project.is_none() || prompt.trim().is_empty() || self.generating {
            return false;
        }
        self.generating = true;
        let result = self.backend.generate(&self.project_id, prompt).await;
        self.generating = false;
        match result {
            Ok(code) => {
                if let (Some(project), Some(code)) = (self.project.as_mut(), code) {
                    project.current_code = Some(code);
                }
                self.stop_polling();
                self.notify(Notice::success("Website generated successfully!"));
                true
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to generate website")));
                false
            }
        }
    }

    /// Sends a chat message. Without any code yet this becomes a generation.
    pub async fn revise(&mut self, prompt: &str) -> bool {
        if prompt.trim().is_empty() || self.generating {
            return false;
        }
        let baseline = self.revision_baseline();
        self.push_user_message(prompt);
        if self.code().is_none() {
            return self.generate(prompt).await;
        }

        self.generating = true;
        match self.backend.revise(&self.project_id, prompt).await {
            Ok(()) => {
                self.notify(Notice::info("Making changes to your website..."));
                self.start_polling(baseline);
                true
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to send message")));
                self.generating = false;
                false
            }
        }
    }

    /// Persists the preview's current markup.
    pub async fn save(&mut self, preview: &PreviewHost) -> bool {
        let Some(code) = preview.extract().await else {
            return false;
        };
        match self.backend.save(&self.project_id, &code).await {
            Ok(message) => {
                if let Some(project) = self.project.as_mut() {
                    project.current_code = Some(code);
                }
                self.notify(Notice::success(message.unwrap_or_else(|| "Project saved".to_string())));
                true
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to save project")));
                false
            }
        }
    }

    /// Writes the preview's current markup to `<dir>/<project>.html`.
    pub async fn download(&self, preview: &PreviewHost, dir: &Path) -> Option<PathBuf> {
        let Some(code) = preview.extract().await else {
            self.notify(Notice::error("No code to download"));
            return None;
        };
        let name = self.project.as_ref().and_then(|p| p.name.as_deref());
        match export::write_download(dir, name, &code) {
            Ok(path) => {
                self.notify(Notice::success("HTML downloaded successfully!"));
                Some(path)
            }
            Err(e) => {
                self.notify(Notice::error(e.to_string()));
                None
            }
        }
    }

    pub async fn toggle_publish(&mut self) -> bool {
        if self.project.is_none() {
            return false;
        }
        match self.backend.toggle_publish(&self.project_id).await {
            Ok(()) => {
                self.notify(Notice::success(if self.published {
                    "Project unpublished"
                } else {
                    "Project published"
                }));
                self.published = !self.published;
                true
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to toggle publish")));
                false
            }
        }
    }

    /// Restores the version produced by the conversation entry `message_id`.
    pub async fn rollback(&mut self, message_id: &str) -> bool {
        let version = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| m.version_id.clone());
        let Some(version) = version else {
            self.notify(Notice::error("Version not found"));
            return false;
        };

        self.generating = true;
        self.notify(Notice::info("Rolling back..."));
        let result = self.backend.rollback(&self.project_id, &version).await;
        let ok = match result {
            Ok(message) => {
                self.refresh_project().await;
                self.refresh_conversation(false).await;
                self.notify(Notice::success(message.unwrap_or_else(|| "Rolled back successfully".to_string())));
                true
            }
            Err(e) => {
                self.notify(Notice::error(e.notice_text("Failed to rollback")));
                false
            }
        };
        self.generating = false;
        ok
    }

    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events_rx.recv().await
    }

    /// Applies a poller event. Events for a superseded session are dropped.
    pub fn handle(&mut self, event: SyncEvent) -> bool {
        if !self.lock_sync().is_current(event.ticket()) {
            tracing::debug!(epoch = event.ticket().epoch, "dropping event from a stale session");
            return false;
        }
        match event {
            SyncEvent::Progress { stage, .. } => {
                tracing::debug!(stage = stage.label(), "generation progress");
            }
            SyncEvent::Completed { project, .. } => {
                if !project.conversation.is_empty() {
                    self.messages = project.conversation.clone();
                }
                self.published = project.is_published;
                let keep_code = project.code().is_none();
                let previous = self.project.take();
                let mut project = project;
                if keep_code {
                    project.current_code = previous.and_then(|p| p.current_code);
                }
                self.project = Some(project);
                self.generating = false;
                self.poller = None;
            }
            SyncEvent::Failed { message, .. } => self.notify(Notice::error(message)),
        }
        true
    }

    /// Processes poller events until the current run finishes.
    pub async fn wait_until_idle(&mut self) {
        while self.generating {
            let Some(event) = self.next_event().await else {
                break;
            };
            self.handle(event);
        }
    }
}
