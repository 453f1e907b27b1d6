//! Client side of site generation: configuration, the REST backend, the
//! generation-status synchronizer and the per-project workspace that ties
//! them to a preview.

pub mod api;
pub mod config;
pub mod notice;
pub mod status;
pub mod workspace;

pub use api::{ApiError, ApiResult, ConversationEntry, HttpBackend, ProjectBackend, ProjectStatus, Role, SharedBackend};
pub use config::{ClientConfig, ConfigError};
pub use notice::{Notice, NoticeLevel, NoticeLog, Notifier, TracingNotifier};
pub use status::{
    spawn_poller, Baseline, Observation, PollHandle, ProgressStage, SessionTicket, StatusSynchronizer, SyncEvent, SyncPhase,
};
pub use workspace::{can_rollback, is_enhanced_prompt_message, is_status_message, ProjectWorkspace};
