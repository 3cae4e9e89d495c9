//! Platform error types.

use thiserror::Error;

use crate::types::ResourceKind;

/// Errors returned by platform operations.
///
/// The variants matter more than the messages: callers branch on them to
/// decide whether to abort (permission, conflict), retry (transient), or
/// tolerate (not found, during rollback replay).
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform rejected the operation for lack of rights.
    #[error("permission denied for {action}: missing {missing}")]
    Permission { action: String, missing: String },

    /// Rate limit or timeout; the operation may succeed if retried.
    #[error("transient platform error: {reason}")]
    Transient { reason: String },

    /// The referenced entity does not exist.
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// A name resolved to a resource of the wrong kind.
    #[error("'{name}' exists as a {actual}, expected a {expected}")]
    Conflict {
        name: String,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    /// Anything the platform reported that we cannot classify.
    #[error("platform error: {0}")]
    Unknown(String),
}

impl PlatformError {
    /// Builds a permission error for the given action.
    pub fn permission(action: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::Permission {
            action: action.into(),
            missing: missing.into(),
        }
    }

    /// Builds a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Builds a not-found error.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Returns true if retrying the operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient { .. })
    }

    /// Returns true if the referenced entity is simply gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
