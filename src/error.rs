use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

/// A collaborator call failed. Retried according to the stage's policy.
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse collaborator response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{service} returned an error: {message}")]
    Service { service: &'static str, message: String },
}

impl ExternalError {
    pub fn service(service: &'static str, message: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: message.into(),
        }
    }
}

/// Errors that abort a pipeline job instead of being recorded on its row.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("External collaborator error: {0}")]
    External(#[from] ExternalError),
}

impl PipelineError {
    pub fn video_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Video", id }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
