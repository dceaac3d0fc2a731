use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error_handling::types::SinkError;

/// Result of handing a session's records to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// The session produced no records; nothing was written anywhere.
    NothingToPersist,
    /// Records were uploaded under `key` and the staging artifact removed.
    Persisted { key: String, rows: usize },
    /// The staging artifact could not be written; nothing was uploaded.
    SerializeFailed { reason: String },
    /// The upload failed; the staging artifact is kept for manual recovery.
    UploadFailed {
        key: String,
        staging_path: PathBuf,
        reason: String,
    },
}

impl FinalizeOutcome {
    pub fn is_failure(&self) -> bool {
        self.error().is_some()
    }

    pub fn error(&self) -> Option<SinkError> {
        match self {
            FinalizeOutcome::SerializeFailed { reason } => Some(SinkError::Serialize(reason.clone())),
            FinalizeOutcome::UploadFailed { reason, .. } => Some(SinkError::Upload(reason.clone())),
            _ => None,
        }
    }
}
