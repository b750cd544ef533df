use std::str::FromStr;

use chrono::{DateTime, Utc};
use evidex_core::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date_range::EvidenceDateRange;

/// Lifecycle state of one archival run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    /// Archive is still streaming.
    InProgress,
    /// Archive finalised with at least one file.
    Completed,
    /// Archive could not be produced.
    Failed,
}

impl BackupStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Returns whether the status is a terminal write.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl FromStr for BackupStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown backup status '{value}'"
            ))),
        }
    }
}

/// Persisted archival run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Backup identifier.
    pub backup_id: Uuid,
    /// Window the archive was scoped to.
    pub date_range: EvidenceDateRange,
    /// Candidate file count announced at start.
    pub total_files: u64,
    /// Candidate byte count announced at start.
    pub total_bytes: u64,
    /// Current lifecycle state.
    pub status: BackupStatus,
    /// Outcome note written with the terminal status.
    pub note: Option<String>,
    /// Subject that ran the backup.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// State of one archived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupFileStatus {
    /// File is present in an archive and still in storage.
    BackedUp,
    /// File was purged from storage after archival.
    Deleted,
}

impl BackupFileStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackedUp => "Backed Up",
            Self::Deleted => "Deleted",
        }
    }
}

impl FromStr for BackupFileStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Backed Up" => Ok(Self::BackedUp),
            "Deleted" => Ok(Self::Deleted),
            _ => Err(AppError::Validation(format!(
                "unknown backup file status '{value}'"
            ))),
        }
    }
}

/// Link between an archival run and one archived submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFileDetail {
    /// Owning backup.
    pub backup_id: Uuid,
    /// Archived submission.
    pub submission_id: Uuid,
    /// Current state.
    pub status: BackupFileStatus,
    /// Bytes captured in the archive.
    pub size_bytes: u64,
    /// Purge timestamp once deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Why a candidate file was left out of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Stored reference could not be resolved to a storage key.
    InvalidReference,
    /// Object could not be opened after all attempts.
    DownloadFailed,
    /// Transfer broke after the object was opened.
    StreamError,
}

impl SkipReason {
    /// Returns a stable tag for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidReference => "InvalidReference",
            Self::DownloadFailed => "DownloadFailed",
            Self::StreamError => "StreamError",
        }
    }
}
