//! Quest Errors
//!
//! Rejection reasons surfaced to the player, plus the faults raised by
//! the content and storage collaborators.

use std::path::PathBuf;
use thiserror::Error;

/// Reason a quest could not be accepted (sent to the client as-is)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuestInvalidReason {
    #[error("level too low")]
    LowLevel,
    #[error("prerequisite quest not completed")]
    PrerequisiteMissing,
    #[error("quest already active")]
    AlreadyHave,
    #[error("quest already completed")]
    AlreadyCompleted,
    #[error("quest giver will not offer quests right now")]
    Tired,
    #[error("daily quest limit reached")]
    DailyQuestsExceeded,
    #[error("not enough inventory space for the quest items")]
    NoRequiredSpace,
}

/// Why `add_quest` refused a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcceptError {
    #[error("quest log is full")]
    LogFull,
    #[error("quest rejected: {0}")]
    Invalid(#[from] QuestInvalidReason),
}

/// Errors from the quest storage port
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode quest counters: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt quest record: {0}")]
    Corrupt(String),
    #[error("storage temporarily unavailable: {0}")]
    Transient(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Transient(_) => true,
            StorageError::Database(sqlx::Error::Io(_))
            | StorageError::Database(sqlx::Error::PoolTimedOut)
            | StorageError::Database(sqlx::Error::WorkerCrashed) => true,
            // SQLITE_BUSY / SQLITE_LOCKED
            StorageError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("5") | Some("6"))
            }
            _ => false,
        }
    }
}

/// Errors raised while loading quest templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("quest '{quest_id}' is invalid: {reason}")]
    Invalid { quest_id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Transient("busy".into()).is_transient());
        assert!(StorageError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StorageError::Corrupt("bad slot".into()).is_transient());
        assert!(!StorageError::Database(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_reason_converts_into_accept_error() {
        let err: AcceptError = QuestInvalidReason::Tired.into();
        assert_eq!(err, AcceptError::Invalid(QuestInvalidReason::Tired));
        assert_eq!(err.to_string(), "quest rejected: quest giver will not offer quests right now");
    }
}
