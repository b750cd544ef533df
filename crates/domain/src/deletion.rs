use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::date_range::EvidenceDateRange;

/// Archived evidence file eligible for purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCandidate {
    /// Submission owning the evidence file.
    pub submission_id: Uuid,
    /// Stored reference to the evidence object.
    pub evidence_reference: String,
    /// Backup holding a `Backed Up` detail row for the file.
    pub backup_id: Uuid,
    /// Size captured at archival time, falling back to the submission's size.
    pub size_bytes: Option<u64>,
}

/// Append-only record of one purge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    /// Deletion identifier.
    pub deletion_id: Uuid,
    /// Window the purge was scoped to.
    pub date_range: EvidenceDateRange,
    /// Files the run tried to delete.
    pub attempted_count: u64,
    /// Files removed from storage.
    pub succeeded_count: u64,
    /// Files that could not be removed.
    pub failed_count: u64,
    /// Bytes released from storage.
    pub bytes_freed: u64,
    /// Subject that ran the purge.
    pub actor: String,
    /// Covering backup that authorised the purge.
    pub backup_id: Option<Uuid>,
    /// Free-text summary.
    pub note: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
