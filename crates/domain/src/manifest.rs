use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backup::SkipReason;
use crate::date_range::EvidenceDateRange;

/// JSON index embedded as the last entry of every evidence archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// Time the archive was finalised.
    pub backup_date: DateTime<Utc>,
    /// Archived window.
    pub date_range: ManifestDateRange,
    /// Candidate count.
    pub total_files: usize,
    /// Files present in the archive.
    pub added_files: usize,
    /// Candidates left out.
    pub skipped_count: usize,
    /// Backup record the archive belongs to.
    pub backup_id: Uuid,
    /// Bytes announced before streaming started.
    pub total_size_bytes: u64,
    /// Subject that requested the archive.
    pub created_by: String,
    /// Archived files in completion order.
    pub files: Vec<ManifestFileEntry>,
    /// Skipped candidates in completion order.
    pub skipped_files: Vec<ManifestSkippedEntry>,
}

/// Inclusive window as written to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDateRange {
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl From<EvidenceDateRange> for ManifestDateRange {
    fn from(value: EvidenceDateRange) -> Self {
        Self {
            start: value.start(),
            end: value.end(),
        }
    }
}

/// One archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFileEntry {
    /// Submission identifier.
    pub submission_id: Uuid,
    /// Activity title.
    pub activity_name: String,
    /// Practitioner name.
    pub practitioner: String,
    /// Submission date.
    pub date: NaiveDate,
    /// Path inside the archive.
    pub path: String,
    /// Bytes written.
    pub size: u64,
}

/// One skipped candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSkippedEntry {
    /// Submission identifier.
    pub submission_id: Uuid,
    /// Planned archive path.
    pub filename: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}
