//! Domain errors for the task relay.

use thiserror::Error;

/// Domain-level errors that can occur while relaying a task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Work item not found: {0}")]
    WorkItemNotFound(String),

    #[error("Platform API error: {0}")]
    PlatformApi(String),

    #[error("Custom field '{field}' not found on task {task_id}")]
    CustomFieldNotFound { task_id: String, field: String },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Failed to spawn agent: {0}")]
    AgentSpawn(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Operation not supported by {platform}: {operation}")]
    Unsupported { platform: String, operation: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl DomainError {
    /// Whether retrying the same call might succeed.
    ///
    /// Network and platform failures are transient; a missing work item or a
    /// validation failure is not.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::PlatformApi(_) | Self::Io(_))
    }
}
