use crate::domain::models::{EntityId, EntityKind};
use crate::domain::timer::InvalidTransition;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: EntityId },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("startup reconciliation has not run yet")]
    StartupPending,
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    pub fn not_found(kind: EntityKind, id: EntityId) -> Self {
        Self::NotFound { kind, id }
    }
}
