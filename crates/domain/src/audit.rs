use std::str::FromStr;

use evidex_core::AppError;
use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by the archival and purge pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Archive finalised with at least one file.
    EvidenceBackupCompleted,
    /// Archive run ended without a usable archive.
    EvidenceBackupFailed,
    /// Purge run finished, fully or partially.
    EvidenceDeletionCompleted,
    /// Purge run aborted by an unexpected error.
    EvidenceDeletionFailed,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvidenceBackupCompleted => "evidence.backup.completed",
            Self::EvidenceBackupFailed => "evidence.backup.failed",
            Self::EvidenceDeletionCompleted => "evidence.deletion.completed",
            Self::EvidenceDeletionFailed => "evidence.deletion.failed",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "evidence.backup.completed" => Ok(Self::EvidenceBackupCompleted),
            "evidence.backup.failed" => Ok(Self::EvidenceBackupFailed),
            "evidence.deletion.completed" => Ok(Self::EvidenceDeletionCompleted),
            "evidence.deletion.failed" => Ok(Self::EvidenceDeletionFailed),
            _ => Err(AppError::Validation(format!(
                "unknown audit action '{value}'"
            ))),
        }
    }
}
