use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("work item already exists: {0}")]
    WorkItemExists(String),

    #[error("invalid work id '{0}': must be 1-64 characters of letters, digits, '-', '_' or '.'")]
    InvalidWorkId(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("progress must be between 0 and 100, got {0}")]
    InvalidProgress(i64),

    #[error("unknown message type: {0}")]
    InvalidMessageType(String),

    #[error("unknown harmony: {0}")]
    InvalidHarmony(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("unknown transition type: {0}")]
    InvalidTransitionType(String),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WeaveError>;
