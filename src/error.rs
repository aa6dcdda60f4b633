use thiserror::Error;

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDetails(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(format!("Database error: {}", err))
    }
}

impl From<::config::ConfigError> for AuditError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid event type: {0}. Valid types: {}", crate::audit::EventType::valid_list())]
    InvalidEventType(String),

    #[error("Invalid event details: {0}")]
    InvalidDetails(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Chain conflict: tail checksum is {expected:?}, append supplied {supplied:?}")]
    ChainConflict {
        expected: Option<String>,
        supplied: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type AuditResult<T> = Result<T, AuditError>;

impl AuditError {
    pub fn corrupt_record(id: i64, reason: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(format!("Corrupt audit record {}: {}", id, reason))
    }
}
