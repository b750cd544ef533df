use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use evidex_core::{AppError, AppResult, UserIdentity};
use evidex_domain::{
    AuditAction, BackupRecord, BackupStatus, EvidenceDateRange, EvidenceSubmission,
    plan_archive_paths,
};

use crate::access::require_privileged;
use crate::audit_trail::AuditTrail;
use crate::evidence_locator::EvidenceLocator;
use crate::evidence_ports::{
    ArchiveByteStream, ArchiveWriter, AuditEvent, BackupRepository, EvidenceStorage,
    NewBackupRecord,
};
use crate::size_resolver::{ResolvedSizes, SizeLookup, SizeResolver};

mod archive_run;
mod config;
mod delivery;
#[cfg(test)]
mod tests;

use archive_run::{ArchiveJob, ArchiveRun};
use delivery::DeliveryWatch;

pub use archive_run::ArchiveRunReport;
pub use config::BackupPolicy;

/// Raw input of one archival request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBackupRequest {
    /// Inclusive first day, `YYYY-MM-DD` or RFC 3339.
    pub start_date: Option<String>,
    /// Inclusive last day, `YYYY-MM-DD` or RFC 3339.
    pub end_date: Option<String>,
    /// Client address recorded in the audit trail.
    pub ip_address: Option<String>,
}

/// A started archival run whose bytes are produced while the caller reads `body`.
pub struct EvidenceBackupDownload {
    /// Backup record identifier.
    pub backup_id: Uuid,
    /// Suggested download file name.
    pub file_name: String,
    /// Candidate count.
    pub total_files: usize,
    /// Sum of resolved candidate sizes.
    pub total_bytes: u64,
    /// Candidates whose size could not be determined up front.
    pub missing_size_count: usize,
    /// Archive bytes.
    pub body: ArchiveByteStream,
    /// Background run; resolves once the record reaches a terminal status.
    pub completion: JoinHandle<ArchiveRunReport>,
}

/// Application service that archives evidence files into a streamed ZIP.
#[derive(Clone)]
pub struct EvidenceBackupService {
    locator: EvidenceLocator,
    size_resolver: SizeResolver,
    storage: Arc<dyn EvidenceStorage>,
    backup_repository: Arc<dyn BackupRepository>,
    archive_writer: Arc<dyn ArchiveWriter>,
    audit_trail: AuditTrail,
    policy: BackupPolicy,
}

impl EvidenceBackupService {
    /// Creates a new backup service.
    #[must_use]
    pub fn new(
        locator: EvidenceLocator,
        storage: Arc<dyn EvidenceStorage>,
        backup_repository: Arc<dyn BackupRepository>,
        archive_writer: Arc<dyn ArchiveWriter>,
        audit_trail: AuditTrail,
        policy: BackupPolicy,
    ) -> Self {
        Self {
            locator,
            size_resolver: SizeResolver::new(storage.clone(), policy.size_probe_concurrency),
            storage,
            backup_repository,
            archive_writer,
            audit_trail,
            policy,
        }
    }

    /// Validates the request, opens a backup record and starts streaming the archive.
    ///
    /// Every validation failure returns before any storage object is read.
    pub async fn start_backup(
        &self,
        actor: &UserIdentity,
        request: EvidenceBackupRequest,
    ) -> AppResult<EvidenceBackupDownload> {
        require_privileged(actor)?;

        let range = EvidenceDateRange::parse(
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            Utc::now().date_naive(),
        )?;

        if !self.size_resolver.storage_reachable() {
            return Err(AppError::StorageUnavailable(
                "evidence storage is not configured".to_owned(),
            ));
        }

        let candidates = match self.locator.locate_for_backup(range).await {
            Ok(candidates) => candidates,
            Err(error) => {
                if matches!(error, AppError::Internal(_)) {
                    self.audit_setup_failure(actor, &request, range, None, &error)
                        .await;
                }
                return Err(error);
            }
        };
        if candidates.is_empty() {
            return Err(AppError::NotFound(format!(
                "no approved evidence files between {} and {}",
                range.start(),
                range.end()
            )));
        }

        if candidates.len() > self.policy.max_files {
            return Err(AppError::LimitExceeded {
                message: format!(
                    "{} evidence files match this range; at most {} can be archived at once, narrow the date range",
                    candidates.len(),
                    self.policy.max_files
                ),
                requested: candidates.len(),
                limit: self.policy.max_files,
            });
        }

        let lookups: Vec<SizeLookup> = candidates.iter().map(SizeLookup::from).collect();
        let sizes = self.size_resolver.resolve(&lookups).await;
        let total_files = candidates.len();

        let record = match self
            .backup_repository
            .create_backup(NewBackupRecord {
                date_range: range,
                total_files: u64::try_from(total_files).unwrap_or(u64::MAX),
                total_bytes: sizes.total_bytes(),
                created_by: actor.subject().to_owned(),
            })
            .await
        {
            Ok(record) => record,
            Err(error) => {
                self.audit_setup_failure(actor, &request, range, None, &error)
                    .await;
                return Err(error);
            }
        };

        let archive = match self.archive_writer.open() {
            Ok(archive) => archive,
            Err(error) => {
                if let Err(finish_error) = self
                    .backup_repository
                    .finish_backup(record.backup_id, BackupStatus::Failed, &error.to_string())
                    .await
                {
                    error!(backup_id = %record.backup_id, error = %finish_error, "failed to mark backup failed");
                }
                self.audit_setup_failure(actor, &request, range, Some(record.backup_id), &error)
                    .await;
                return Err(error);
            }
        };

        info!(
            backup_id = %record.backup_id,
            actor = %actor.subject(),
            range = %range,
            total_files,
            total_bytes = sizes.total_bytes(),
            missing_sizes = sizes.missing_count(),
            "evidence backup started"
        );

        let backup_id = record.backup_id;
        let (body, delivered) = DeliveryWatch::wrap(archive.body);
        let run = ArchiveRun {
            jobs: plan_jobs(candidates, &sizes),
            backup: record,
            actor: actor.subject().to_owned(),
            ip_address: request.ip_address.clone(),
            storage: self.storage.clone(),
            backup_repository: self.backup_repository.clone(),
            audit_trail: self.audit_trail.clone(),
            sink: archive.sink,
            delivered,
            policy: self.policy.clone(),
        };
        let completion = tokio::spawn(run.execute());

        Ok(EvidenceBackupDownload {
            backup_id,
            file_name: archive_file_name(range),
            total_files,
            total_bytes: sizes.total_bytes(),
            missing_size_count: sizes.missing_count(),
            body,
            completion,
        })
    }

    /// Lists recent archival runs, newest first.
    pub async fn list_recent_backups(
        &self,
        actor: &UserIdentity,
        limit: usize,
    ) -> AppResult<Vec<BackupRecord>> {
        require_privileged(actor)?;
        self.backup_repository
            .list_recent_backups(limit.clamp(1, 200))
            .await
    }

    async fn audit_setup_failure(
        &self,
        actor: &UserIdentity,
        request: &EvidenceBackupRequest,
        range: EvidenceDateRange,
        backup_id: Option<Uuid>,
        failure: &AppError,
    ) {
        let event = AuditEvent {
            actor: actor.subject().to_owned(),
            action: AuditAction::EvidenceBackupFailed,
            target_table: "evidence_backups".to_owned(),
            target_key: backup_id.map(|id| id.to_string()),
            payload: serde_json::json!({
                "backupId": backup_id,
                "dateRange": { "start": range.start(), "end": range.end() },
                "error": failure.to_string(),
            }),
            ip_address: request.ip_address.clone(),
        };

        if let Err(error) = self.audit_trail.record(event).await {
            error!(error = %error, "failed to write backup audit entry");
        }
    }
}

/// Download file name for an archive of `range`.
#[must_use]
pub fn archive_file_name(range: EvidenceDateRange) -> String {
    format!("evidence-backup_{}_{}.zip", range.start(), range.end())
}

fn plan_jobs(candidates: Vec<EvidenceSubmission>, sizes: &ResolvedSizes) -> Vec<ArchiveJob> {
    let paths = plan_archive_paths(&candidates);
    candidates
        .into_iter()
        .zip(paths)
        .map(|(submission, path)| ArchiveJob {
            announced_size: sizes.size_of(submission.submission_id),
            submission,
            path,
        })
        .collect()
}
