use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use evidex_core::AppResult;
use evidex_domain::{
    BackupFileDetail, BackupRecord, BackupStatus, DeletionCandidate, DeletionRecord,
    EvidenceDateRange, EvidenceSubmission,
};

/// Repository port over approved compliance submissions.
#[async_trait]
pub trait EvidenceRepository: Send + Sync {
    /// Lists approved submissions with a non-null evidence reference inside the window.
    async fn list_archivable(&self, range: EvidenceDateRange)
    -> AppResult<Vec<EvidenceSubmission>>;

    /// Lists approved submissions inside the window that still have a
    /// `Backed Up` detail row, one entry per submission.
    async fn list_deletion_candidates(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<DeletionCandidate>>;

    /// Clears the evidence reference and size of the given submissions.
    ///
    /// Returns the number of rows updated.
    async fn clear_evidence(&self, submission_ids: &[Uuid]) -> AppResult<u64>;
}

/// Input payload for opening a backup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBackupRecord {
    /// Window being archived.
    pub date_range: EvidenceDateRange,
    /// Candidate file count.
    pub total_files: u64,
    /// Candidate byte count.
    pub total_bytes: u64,
    /// Subject running the backup.
    pub created_by: String,
}

/// Repository port for archival runs and their per-file rows.
#[async_trait]
pub trait BackupRepository: Send + Sync {
    /// Creates a backup record in the `InProgress` state.
    async fn create_backup(&self, input: NewBackupRecord) -> AppResult<BackupRecord>;

    /// Writes the single terminal status of a backup record.
    async fn finish_backup(
        &self,
        backup_id: Uuid,
        status: BackupStatus,
        note: &str,
    ) -> AppResult<()>;

    /// Records one archived file.
    async fn record_file_detail(&self, detail: BackupFileDetail) -> AppResult<()>;

    /// Finds the newest completed backup created by `created_by` after
    /// `created_after` whose window covers `range`.
    async fn find_covering_backup(
        &self,
        created_by: &str,
        range: EvidenceDateRange,
        created_after: DateTime<Utc>,
    ) -> AppResult<Option<BackupRecord>>;

    /// Flips `Backed Up` detail rows of the given submissions to `Deleted`.
    ///
    /// Returns the number of rows updated.
    async fn mark_files_deleted(
        &self,
        submission_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Lists the most recent backup records.
    async fn list_recent_backups(&self, limit: usize) -> AppResult<Vec<BackupRecord>>;
}

/// Input payload for the append-only deletion record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeletionRecord {
    /// Window that was purged.
    pub date_range: EvidenceDateRange,
    /// Files the run tried to delete.
    pub attempted_count: u64,
    /// Files removed from storage.
    pub succeeded_count: u64,
    /// Files that could not be removed.
    pub failed_count: u64,
    /// Bytes released.
    pub bytes_freed: u64,
    /// Subject running the purge.
    pub actor: String,
    /// Covering backup.
    pub backup_id: Option<Uuid>,
    /// Free-text summary.
    pub note: Option<String>,
}

/// Repository port for purge runs.
#[async_trait]
pub trait DeletionRepository: Send + Sync {
    /// Returns the most recent deletion, optionally restricted to one actor.
    async fn latest_deletion(&self, actor: Option<&str>) -> AppResult<Option<DeletionRecord>>;

    /// Appends a deletion record.
    async fn create_deletion(&self, input: NewDeletionRecord) -> AppResult<DeletionRecord>;

    /// Lists the most recent deletion records.
    async fn list_recent_deletions(&self, limit: usize) -> AppResult<Vec<DeletionRecord>>;
}
