//! Generation-status synchronizer.
//!
//! Tracks one generation session at a time as `Idle -> Polling -> Terminated`.
//! The terminal transition happens through a single guard in
//! `StatusSynchronizer::observe`, so however many fetches see completion, only
//! the first one reports it. Every observation carries the `SessionTicket` it
//! was issued for; observations from an older session are ignored.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{ApiError, ConversationEntry, ProjectStatus, Role, SharedBackend};

/// Phrases the backend writes into the conversation once a run finishes.
pub const COMPLETION_PHRASES: [&str; 2] = ["I've Created your website", "I've Made the changes"];

pub const STATUS_COMPLETED: &str = "completed";

pub const CONVERSATION_LOAD_FAILED: &str = "Failed to load conversation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Polling,
    Terminated,
}

/// Coarse progress shown while a run is in flight. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressStage {
    Analyzing,
    Enhancing,
    Generating,
    Finalizing,
}

impl ProgressStage {
    pub const ALL: [ProgressStage; 4] = [
        ProgressStage::Analyzing,
        ProgressStage::Enhancing,
        ProgressStage::Generating,
        ProgressStage::Finalizing,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgressStage::Analyzing => "Analyzing your request",
            ProgressStage::Enhancing => "Enhancing your prompt",
            ProgressStage::Generating => "Generating website code",
            ProgressStage::Finalizing => "Finalizing & optimizing",
        }
    }

    pub fn percent(self) -> u8 {
        let step = Self::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1;
        (step * 100 / Self::ALL.len()) as u8
    }

    /// Stage suggested by the latest assistant message, if any keyword matches.
    /// Later rules win when several match.
    pub fn detect(conversation: &[ConversationEntry]) -> Option<Self> {
        let last = conversation.last().filter(|e| e.role == Role::Assistant)?;
        let content = last.content.to_lowercase();
        let mut stage = None;
        if content.contains("enhanc") {
            stage = Some(ProgressStage::Enhancing);
        }
        if content.contains("generat") {
            stage = Some(ProgressStage::Generating);
        }
        if content.contains("final") || content.contains("preview") {
            stage = Some(ProgressStage::Finalizing);
        }
        stage
    }
}

/// What the project looked like when a session began.
///
/// A first generation starts from the empty baseline. A revision starts from
/// the current code and conversation, which already look finished, so only
/// changes past that point can end it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub code: Option<String>,
    /// Conversation entries that existed before the request.
    pub conversation_len: usize,
}

impl Baseline {
    pub fn revision(code: Option<&str>, conversation_len: usize) -> Self {
        Self {
            code: code.map(str::to_string),
            conversation_len,
        }
    }

    fn is_revision(&self) -> bool {
        self.code.is_some()
    }
}

/// True once the backend reports the run that started at `baseline` as finished.
pub fn is_complete(status: &ProjectStatus, baseline: &Baseline) -> bool {
    if let Some(code) = status.code() {
        if baseline.code.as_deref() != Some(code) {
            return true;
        }
    }
    let has_new_entries = status.conversation.len() > baseline.conversation_len;
    if let Some(s) = &status.status {
        if s.eq_ignore_ascii_case(STATUS_COMPLETED) && (!baseline.is_revision() || has_new_entries) {
            return true;
        }
    }
    // Phrase matching covers backends without an explicit status. Only an
    // entry written after the request counts.
    has_new_entries
        && status
            .conversation
            .last()
            .map(|e| COMPLETION_PHRASES.iter().any(|p| e.content.contains(p)))
            .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionTicket {
    pub project_id: String,
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Stale ticket, or the session already terminated.
    Ignored,
    Progress(ProgressStage),
    Completed,
}

#[derive(Debug)]
pub struct StatusSynchronizer {
    phase: SyncPhase,
    ticket: Option<SessionTicket>,
    baseline: Baseline,
    epoch: u64,
    stage: ProgressStage,
    loaded_once: bool,
    failure_reported: bool,
}

impl Default for StatusSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSynchronizer {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            ticket: None,
            baseline: Baseline::default(),
            epoch: 0,
            stage: ProgressStage::Analyzing,
            loaded_once: false,
            failure_reported: false,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn stage(&self) -> ProgressStage {
        self.stage
    }

    pub fn ticket(&self) -> Option<&SessionTicket> {
        self.ticket.as_ref()
    }

    pub fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.ticket.as_ref() == Some(ticket)
    }

    /// Starts a first-generation session, superseding any previous one.
    pub fn begin(&mut self, project_id: &str) -> SessionTicket {
        self.begin_from(project_id, Baseline::default())
    }

    /// Starts a session that ends only on changes past `baseline`.
    pub fn begin_from(&mut self, project_id: &str, baseline: Baseline) -> SessionTicket {
        self.epoch += 1;
        let ticket = SessionTicket {
            project_id: project_id.to_string(),
            epoch: self.epoch,
        };
        self.phase = SyncPhase::Polling;
        self.ticket = Some(ticket.clone());
        self.baseline = baseline;
        self.stage = ProgressStage::Analyzing;
        self.loaded_once = false;
        self.failure_reported = false;
        tracing::debug!(project = project_id, epoch = self.epoch, "status sync started");
        ticket
    }

    /// Drops the current session. Late results for it are ignored from here on.
    pub fn cancel(&mut self) {
        if self.ticket.take().is_some() {
            tracing::debug!(epoch = self.epoch, "status sync cancelled");
        }
        self.phase = SyncPhase::Idle;
    }

    pub fn observe(&mut self, ticket: &SessionTicket, status: &ProjectStatus) -> Observation {
        if !self.is_current(ticket) || self.phase != SyncPhase::Polling {
            return Observation::Ignored;
        }
        self.loaded_once = true;
        if let Some(stage) = ProgressStage::detect(&status.conversation) {
            self.stage = stage;
        }
        if is_complete(status, &self.baseline) {
            self.phase = SyncPhase::Terminated;
            tracing::info!(project = %ticket.project_id, epoch = ticket.epoch, "generation complete");
            return Observation::Completed;
        }
        Observation::Progress(self.stage)
    }

    /// Records a failed fetch. Returns a notice only when nothing has loaded
    /// in this session yet, and only once.
    pub fn observe_failure(&mut self, ticket: &SessionTicket, error: &ApiError) -> Option<String> {
        if !self.is_current(ticket) || self.phase != SyncPhase::Polling {
            return None;
        }
        tracing::warn!(project = %ticket.project_id, "status poll failed: {}", error);
        if self.loaded_once || self.failure_reported {
            return None;
        }
        self.failure_reported = true;
        Some(CONVERSATION_LOAD_FAILED.to_string())
    }
}

pub type SharedSync = Arc<Mutex<StatusSynchronizer>>;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Progress {
        ticket: SessionTicket,
        stage: ProgressStage,
    },
    Completed {
        ticket: SessionTicket,
        project: ProjectStatus,
    },
    Failed {
        ticket: SessionTicket,
        message: String,
    },
}

impl SyncEvent {
    pub fn ticket(&self) -> &SessionTicket {
        match self {
            SyncEvent::Progress { ticket, .. }
            | SyncEvent::Completed { ticket, .. }
            | SyncEvent::Failed { ticket, .. } => ticket,
        }
    }
}

/// Owns a running poller. Dropping it stops the polling.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls the project right away, then every `interval`, until the session
/// completes or is superseded.
pub fn spawn_poller(
    backend: SharedBackend,
    sync: SharedSync,
    ticket: SessionTicket,
    interval: Duration,
    events: mpsc::UnboundedSender<SyncEvent>,
) -> PollHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = backend.fetch_project(&ticket.project_id).await;

            let event = {
                let mut sync = sync.lock().unwrap_or_else(PoisonError::into_inner);
                match result {
                    Ok(project) => match sync.observe(&ticket, &project) {
                        Observation::Ignored => break,
                        Observation::Progress(stage) => Some(SyncEvent::Progress {
                            ticket: ticket.clone(),
                            stage,
                        }),
                        Observation::Completed => {
                            let _ = events.send(SyncEvent::Completed {
                                ticket: ticket.clone(),
                                project,
                            });
                            break;
                        }
                    },
                    Err(e) => {
                        if !sync.is_current(&ticket) {
                            break;
                        }
                        sync.observe_failure(&ticket, &e).map(|message| SyncEvent::Failed {
                            ticket: ticket.clone(),
                            message,
                        })
                    }
                }
            };
            if let Some(event) = event {
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    });
    PollHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assistant(content: &str) -> ConversationEntry {
        ConversationEntry {
            id: "a".into(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
            version_id: None,
        }
    }

    fn status_with(entries: Vec<ConversationEntry>, code: Option<&str>) -> ProjectStatus {
        ProjectStatus {
            id: "p1".into(),
            conversation: entries,
            current_code: code.map(str::to_string),
            ..ProjectStatus::default()
        }
    }

    #[test]
    fn test_stage_detection_later_rules_win() {
        assert_eq!(ProgressStage::detect(&[assistant("Enhancing your prompt")]), Some(ProgressStage::Enhancing));
        assert_eq!(
            ProgressStage::detect(&[assistant("I've enhanced your prompt, now generating your website")]),
            Some(ProgressStage::Generating)
        );
        assert_eq!(
            ProgressStage::detect(&[assistant("Generated. Preparing the preview")]),
            Some(ProgressStage::Finalizing)
        );
        assert_eq!(ProgressStage::detect(&[assistant("hello")]), None);
        let mut user = assistant("generate please");
        user.role = Role::User;
        assert_eq!(ProgressStage::detect(&[user]), None);
    }

    #[test]
    fn test_stage_percent() {
        let percents: Vec<u8> = ProgressStage::ALL.iter().map(|s| s.percent()).collect();
        assert_eq!(percents, vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_completion_sources() {
        let fresh = Baseline::default();
        assert!(is_complete(&status_with(vec![], Some("<html></html>")), &fresh));
        assert!(!is_complete(&status_with(vec![], Some("  ")), &fresh));
        assert!(is_complete(
            &status_with(vec![assistant("I've Made the changes to the hero")], None),
            &fresh
        ));
        let mut explicit = status_with(vec![], None);
        explicit.status = Some("completed".into());
        assert!(is_complete(&explicit, &fresh));
        assert!(!is_complete(&status_with(vec![assistant("working")], None), &fresh));
    }

    #[test]
    fn test_revision_ignores_state_it_started_from() {
        let done = assistant("I've Created your website");
        let baseline = Baseline::revision(Some("<p>old</p>"), 1);

        let unchanged = status_with(vec![done.clone()], Some("<p>old</p>"));
        assert!(!is_complete(&unchanged, &baseline));
        let mut stale_status = unchanged.clone();
        stale_status.status = Some("completed".into());
        assert!(!is_complete(&stale_status, &baseline));

        let working = status_with(vec![done.clone(), assistant("now generating your website")], Some("<p>old</p>"));
        assert!(!is_complete(&working, &baseline));

        let new_code = status_with(vec![done.clone()], Some("<p>new</p>"));
        assert!(is_complete(&new_code, &baseline));

        let same_code_new_phrase = status_with(vec![done.clone(), assistant("I've Made the changes")], Some("<p>old</p>"));
        assert!(is_complete(&same_code_new_phrase, &baseline));

        let mut reported = status_with(vec![done, assistant("working")], Some("<p>old</p>"));
        reported.status = Some("completed".into());
        assert!(is_complete(&reported, &baseline));
    }

    #[test]
    fn test_revision_session_does_not_complete_on_old_code() {
        let mut sync = StatusSynchronizer::new();
        let ticket = sync.begin_from("p1", Baseline::revision(Some("<p>old</p>"), 0));
        let old = status_with(vec![assistant("now generating your website")], Some("<p>old</p>"));
        assert_eq!(sync.observe(&ticket, &old), Observation::Progress(ProgressStage::Generating));
        assert_eq!(sync.phase(), SyncPhase::Polling);
        let new = status_with(vec![assistant("I've Made the changes")], Some("<p>new</p>"));
        assert_eq!(sync.observe(&ticket, &new), Observation::Completed);
    }

    #[test]
    fn test_terminal_transition_happens_once() {
        let mut sync = StatusSynchronizer::new();
        let ticket = sync.begin("p1");
        let done = status_with(vec![], Some("<p>x</p>"));
        assert_eq!(sync.observe(&ticket, &done), Observation::Completed);
        assert_eq!(sync.phase(), SyncPhase::Terminated);
        assert_eq!(sync.observe(&ticket, &done), Observation::Ignored);
        assert_eq!(sync.observe(&ticket, &status_with(vec![], None)), Observation::Ignored);
        assert_eq!(sync.phase(), SyncPhase::Terminated);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut sync = StatusSynchronizer::new();
        let old = sync.begin("p1");
        let new = sync.begin("p1");
        let done = status_with(vec![], Some("<p>x</p>"));
        assert_eq!(sync.observe(&old, &done), Observation::Ignored);
        assert_eq!(sync.phase(), SyncPhase::Polling);
        sync.cancel();
        assert_eq!(sync.observe(&new, &done), Observation::Ignored);
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_failure_notice_only_before_first_load() {
        let mut sync = StatusSynchronizer::new();
        let ticket = sync.begin("p1");
        let err = ApiError::Network("down".into());
        assert_eq!(sync.observe_failure(&ticket, &err).as_deref(), Some(CONVERSATION_LOAD_FAILED));
        assert_eq!(sync.observe_failure(&ticket, &err), None);

        let ticket = sync.begin("p1");
        sync.observe(&ticket, &status_with(vec![], None));
        assert_eq!(sync.observe_failure(&ticket, &err), None);
    }
}
