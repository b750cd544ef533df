use chrono::{DateTime, NaiveDate, Utc};
use evidex_application::{AuditChainVerification, DeletionFailure, DeletionOutcome};
use evidex_domain::{BackupRecord, DeletionRecord};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Incoming payload for an evidence archive download.
#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/backup-evidence-request.ts"
)]
pub struct BackupEvidenceRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Incoming payload for purging archived evidence.
#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/delete-archived-request.ts"
)]
pub struct DeleteArchivedRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub confirmation_token: Option<String>,
}

/// One file that could not be removed from storage.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/deletion-failure-response.ts"
)]
pub struct DeletionFailureResponse {
    pub submission_id: String,
    pub reason: String,
}

impl From<DeletionFailure> for DeletionFailureResponse {
    fn from(value: DeletionFailure) -> Self {
        Self {
            submission_id: value.submission_id.to_string(),
            reason: value.reason,
        }
    }
}

/// Result of a purge run.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/delete-archived-response.ts"
)]
pub struct DeleteArchivedResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub failed_count: usize,
    #[serde(rename = "spaceMB")]
    #[ts(rename = "spaceMB")]
    pub space_mb: f64,
    pub message: String,
    pub deletion_id: String,
    pub failures: Vec<DeletionFailureResponse>,
}

impl From<DeletionOutcome> for DeleteArchivedResponse {
    fn from(value: DeletionOutcome) -> Self {
        let space_mb = (value.bytes_freed as f64 / BYTES_PER_MEGABYTE * 100.0).round() / 100.0;
        let message = if value.failed_count == 0 {
            format!(
                "Deleted {} archived evidence files and freed {space_mb:.2} MB",
                value.deleted_count
            )
        } else {
            format!(
                "Deleted {} archived evidence files and freed {space_mb:.2} MB; {} files could not be deleted",
                value.deleted_count, value.failed_count
            )
        };

        Self {
            success: true,
            deleted_count: value.deleted_count,
            failed_count: value.failed_count,
            space_mb,
            message,
            deletion_id: value.deletion_id.to_string(),
            failures: value
                .failures
                .into_iter()
                .map(DeletionFailureResponse::from)
                .collect(),
        }
    }
}

/// API representation of an archival run.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/backup-record-response.ts"
)]
pub struct BackupRecordResponse {
    pub backup_id: String,
    #[ts(type = "string")]
    pub start_date: NaiveDate,
    #[ts(type = "string")]
    pub end_date: NaiveDate,
    pub total_files: u64,
    pub total_bytes: u64,
    pub status: String,
    pub note: Option<String>,
    pub created_by: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<BackupRecord> for BackupRecordResponse {
    fn from(value: BackupRecord) -> Self {
        Self {
            backup_id: value.backup_id.to_string(),
            start_date: value.date_range.start(),
            end_date: value.date_range.end(),
            total_files: value.total_files,
            total_bytes: value.total_bytes,
            status: value.status.as_str().to_owned(),
            note: value.note,
            created_by: value.created_by,
            created_at: value.created_at,
        }
    }
}

/// API representation of a purge run.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/deletion-record-response.ts"
)]
pub struct DeletionRecordResponse {
    pub deletion_id: String,
    #[ts(type = "string")]
    pub start_date: NaiveDate,
    #[ts(type = "string")]
    pub end_date: NaiveDate,
    pub attempted_count: u64,
    pub succeeded_count: u64,
    pub failed_count: u64,
    pub bytes_freed: u64,
    pub actor: String,
    pub backup_id: Option<String>,
    pub note: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<DeletionRecord> for DeletionRecordResponse {
    fn from(value: DeletionRecord) -> Self {
        Self {
            deletion_id: value.deletion_id.to_string(),
            start_date: value.date_range.start(),
            end_date: value.date_range.end(),
            attempted_count: value.attempted_count,
            succeeded_count: value.succeeded_count,
            failed_count: value.failed_count,
            bytes_freed: value.bytes_freed,
            actor: value.actor,
            backup_id: value.backup_id.map(|id| id.to_string()),
            note: value.note,
            created_at: value.created_at,
        }
    }
}

/// Recent archival and purge runs.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/backup-history-response.ts"
)]
pub struct BackupHistoryResponse {
    pub backups: Vec<BackupRecordResponse>,
    pub deletions: Vec<DeletionRecordResponse>,
}

/// Outcome of re-computing the audit hash chain.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-chain-verification-response.ts"
)]
pub struct AuditChainVerificationResponse {
    pub valid: bool,
    pub records_checked: u64,
    pub first_broken_at: Option<i64>,
}

impl From<AuditChainVerification> for AuditChainVerificationResponse {
    fn from(value: AuditChainVerification) -> Self {
        Self {
            valid: value.valid,
            records_checked: value.records_checked,
            first_broken_at: value.first_broken_at,
        }
    }
}
