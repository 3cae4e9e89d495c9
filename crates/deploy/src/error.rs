//! Deployment error taxonomy.
//!
//! The categories drive behavior: permission and conflict errors abort the
//! surrounding transaction immediately, transient errors are retried before
//! becoming fatal, persistence errors still trigger compensation for any
//! platform side-effect that already happened.

use common::{AdminId, ChannelId, GuildId, PanelKind};
use platform::{PlatformError, ResourceKind};
use store::StoreError;
use thiserror::Error;

use crate::session::SessionState;
use crate::validate::ValidationError;

/// Errors raised by the orchestration core.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The platform rejected an operation for lack of rights.
    #[error("permission denied for {action}: missing {missing}")]
    Permission { action: String, missing: String },

    /// A blueprint name resolved to a resource of the wrong kind.
    #[error("'{name}' exists as a {actual}, expected a {expected}")]
    ResourceConflict {
        name: String,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    /// A transient platform error survived the retry budget.
    #[error("{action} still failing after {attempts} attempts: {reason}")]
    Transient {
        action: String,
        attempts: u32,
        reason: String,
    },

    /// The durable store failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A deployed panel does not match expectations (fail-closed policy only).
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An unclassified platform error.
    #[error("platform error: {0}")]
    Platform(PlatformError),

    /// The session is not in a state that allows the requested verb.
    #[error("invalid session state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },

    /// No active session exists for this key.
    #[error("no active session for admin {admin} in guild {guild}")]
    SessionNotFound { guild: GuildId, admin: AdminId },

    /// A session already exists for this key.
    #[error("a session is already active for admin {admin} in guild {guild}")]
    SessionAlreadyActive { guild: GuildId, admin: AdminId },

    /// Someone other than the owning admin tried to drive the session.
    #[error("admin {actor} does not own this session")]
    NotSessionOwner { actor: AdminId },

    /// No content builder is registered for the panel kind.
    #[error("no content builder registered for panel kind '{0}'")]
    UnknownPanelKind(PanelKind),

    /// An overwrite references a role that cannot be resolved.
    #[error("overwrite references unknown role '{name}'")]
    UnknownRole { name: String },

    /// The selected target channel does not exist.
    #[error("channel {channel} does not exist in guild {guild}")]
    TargetMissing { guild: GuildId, channel: ChannelId },

    /// A wizard was started with an empty goal list.
    #[error("session needs at least one goal")]
    NoGoals,

    /// A stored session row could not be interpreted.
    #[error("corrupt session row: {reason}")]
    CorruptSession { reason: String },

    /// Blueprint loading or validation failed.
    #[error(transparent)]
    Blueprint(#[from] blueprint::BlueprintError),
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl From<PlatformError> for DeployError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::Permission { action, missing } => {
                DeployError::Permission { action, missing }
            }
            PlatformError::Conflict {
                name,
                expected,
                actual,
            } => DeployError::ResourceConflict {
                name,
                expected,
                actual,
            },
            PlatformError::Transient { reason } => DeployError::Transient {
                action: "platform call".to_string(),
                attempts: 1,
                reason,
            },
            other => DeployError::Platform(other),
        }
    }
}

impl DeployError {
    /// True when the platform reported the entity as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeployError::Platform(e) if e.is_not_found())
    }

    /// Short category name for logs and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            DeployError::Permission { .. } => "permission",
            DeployError::ResourceConflict { .. } => "conflict",
            DeployError::Transient { .. } => "transient",
            DeployError::Persistence(_) => "persistence",
            DeployError::Validation(_) => "validation",
            DeployError::Platform(_) => "platform",
            DeployError::InvalidState { .. }
            | DeployError::SessionNotFound { .. }
            | DeployError::SessionAlreadyActive { .. }
            | DeployError::NotSessionOwner { .. }
            | DeployError::NoGoals
            | DeployError::CorruptSession { .. } => "session",
            DeployError::UnknownPanelKind(_)
            | DeployError::UnknownRole { .. }
            | DeployError::TargetMissing { .. }
            | DeployError::Blueprint(_) => "input",
        }
    }

    /// One concise, category-specific message safe to show an admin.
    ///
    /// Never leaks internal traces; the full error stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DeployError::Permission { missing, .. } => {
                format!("The bot is missing the '{missing}' permission. Grant it and retry.")
            }
            DeployError::ResourceConflict { name, expected, .. } => {
                format!("'{name}' already exists but is not a {expected}. Rename it and retry.")
            }
            DeployError::Transient { .. } => {
                "The platform is rate limiting us. Wait a moment and retry.".to_string()
            }
            DeployError::Persistence(_) => {
                "Saving progress failed; the step was undone. Retry in a moment.".to_string()
            }
            DeployError::Validation(_) => {
                "The panel was deployed but does not look right. Check the channel.".to_string()
            }
            DeployError::Platform(_) => {
                "The platform rejected the request. Retry or cancel.".to_string()
            }
            DeployError::InvalidState { expected, .. } => {
                format!("That action is not available right now (waiting for: {expected}).")
            }
            DeployError::SessionNotFound { .. } => {
                "No setup wizard is running. Start one first.".to_string()
            }
            DeployError::SessionAlreadyActive { .. } => {
                "A setup wizard is already running. Finish or cancel it first.".to_string()
            }
            DeployError::NotSessionOwner { .. } => {
                "Only the admin who started this wizard can use it.".to_string()
            }
            DeployError::UnknownPanelKind(kind) => {
                format!("Unknown panel type '{kind}'.")
            }
            DeployError::UnknownRole { name } => {
                format!("The blueprint references a role '{name}' that does not exist.")
            }
            DeployError::TargetMissing { .. } => {
                "That channel no longer exists. Pick another one.".to_string()
            }
            DeployError::NoGoals => "Pick at least one panel to deploy.".to_string(),
            DeployError::CorruptSession { .. } => {
                "The saved wizard state is unreadable. Cancel and start over.".to_string()
            }
            DeployError::Blueprint(_) => "The blueprint is invalid. Fix it and retry.".to_string(),
        }
    }
}
