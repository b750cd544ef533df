use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use evidex_core::{AppError, AppResult};
use evidex_domain::{
    AuditAction, BackupFileDetail, BackupFileStatus, BackupManifest, BackupRecord, BackupStatus,
    EvidenceSubmission, MANIFEST_FILE_NAME, ManifestFileEntry, ManifestSkippedEntry, SkipReason,
    StorageKey,
};

use crate::audit_trail::AuditTrail;
use crate::evidence_ports::{
    ArchiveSink, AuditEvent, BackupRepository, EvidenceByteStream, EvidenceStorage,
};

use super::BackupPolicy;

/// One candidate with its planned archive path.
#[derive(Debug, Clone)]
pub(super) struct ArchiveJob {
    pub(super) submission: EvidenceSubmission,
    pub(super) path: String,
    pub(super) announced_size: Option<u64>,
}

/// Summary of a finished archival run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRunReport {
    /// Terminal status written to the backup record.
    pub status: BackupStatus,
    /// Files present in the archive.
    pub added_files: usize,
    /// Candidates left out.
    pub skipped_files: usize,
}

enum JobOutcome {
    Added(ManifestFileEntry),
    Skipped(ManifestSkippedEntry),
}

#[derive(Default)]
struct ArchiveLedger {
    files: Vec<ManifestFileEntry>,
    skipped: Vec<ManifestSkippedEntry>,
}

/// Everything one archival run needs once streaming has started.
pub(super) struct ArchiveRun {
    pub(super) backup: BackupRecord,
    pub(super) jobs: Vec<ArchiveJob>,
    pub(super) actor: String,
    pub(super) ip_address: Option<String>,
    pub(super) storage: Arc<dyn EvidenceStorage>,
    pub(super) backup_repository: Arc<dyn BackupRepository>,
    pub(super) audit_trail: AuditTrail,
    pub(super) sink: Arc<dyn ArchiveSink>,
    /// Fires once the caller has read the whole archive body.
    pub(super) delivered: oneshot::Receiver<()>,
    pub(super) policy: BackupPolicy,
}

/// State shared by the workers of one run.
struct WorkerPool {
    jobs: Vec<ArchiveJob>,
    cursor: AtomicUsize,
    sink_failed: AtomicBool,
    ledger: Mutex<ArchiveLedger>,
    backup_id: uuid::Uuid,
    storage: Arc<dyn EvidenceStorage>,
    backup_repository: Arc<dyn BackupRepository>,
    sink: Arc<dyn ArchiveSink>,
    policy: BackupPolicy,
}

impl ArchiveRun {
    /// Runs the worker pool to completion, then finalises or aborts the archive.
    pub(super) async fn execute(self) -> ArchiveRunReport {
        let ArchiveRun {
            backup,
            jobs,
            actor,
            ip_address,
            storage,
            backup_repository,
            audit_trail,
            sink,
            delivered,
            policy,
        } = self;

        let worker_count = policy.concurrency.max(1).min(jobs.len());
        let total_files = jobs.len();
        let pool = Arc::new(WorkerPool {
            jobs,
            cursor: AtomicUsize::new(0),
            sink_failed: AtomicBool::new(false),
            ledger: Mutex::new(ArchiveLedger::default()),
            backup_id: backup.backup_id,
            storage,
            backup_repository: backup_repository.clone(),
            sink: sink.clone(),
            policy,
        });

        info!(
            backup_id = %backup.backup_id,
            total_files,
            worker_count,
            "evidence archive run started"
        );

        let mut workers = JoinSet::new();
        for worker_index in 0..worker_count {
            let pool = Arc::clone(&pool);
            workers.spawn(async move { pool.run_worker(worker_index).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(join_error) = joined {
                error!(backup_id = %backup.backup_id, error = %join_error, "archive worker crashed");
                pool.sink_failed.store(true, Ordering::Release);
            }
        }

        let ledger = std::mem::take(&mut *pool.ledger.lock().await);
        let finalizer = Finalizer {
            backup,
            total_files,
            actor,
            ip_address,
            backup_repository,
            audit_trail,
            sink,
        };

        if pool.sink_failed.load(Ordering::Acquire) {
            return finalizer
                .fail(
                    "archive stream failed before all files were written",
                    &ledger,
                )
                .await;
        }

        if ledger.files.is_empty() {
            return finalizer
                .fail(
                    "NoFilesArchived: none of the evidence files could be archived",
                    &ledger,
                )
                .await;
        }

        finalizer.complete(ledger, delivered).await
    }
}

impl WorkerPool {
    async fn run_worker(&self, worker_index: usize) {
        loop {
            if self.sink_failed.load(Ordering::Acquire) {
                break;
            }

            let index = self.cursor.fetch_add(1, Ordering::AcqRel);
            let Some(job) = self.jobs.get(index) else {
                break;
            };

            let outcome = self.archive_one(job).await;
            let mut ledger = self.ledger.lock().await;
            match outcome {
                JobOutcome::Added(entry) => ledger.files.push(entry),
                JobOutcome::Skipped(entry) => ledger.skipped.push(entry),
            }
        }

        debug!(backup_id = %self.backup_id, worker_index, "archive worker finished");
    }

    async fn archive_one(&self, job: &ArchiveJob) -> JobOutcome {
        let submission_id = job.submission.submission_id;

        let key = match StorageKey::from_reference(&job.submission.evidence_reference) {
            Ok(key) => key,
            Err(error) => {
                warn!(%submission_id, error = %error, "skipping evidence with malformed reference");
                return skipped(job, SkipReason::InvalidReference);
            }
        };

        let stream = match self.open_with_retry(&key).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%submission_id, key = %key, error = %error, "evidence download failed");
                return skipped(job, SkipReason::DownloadFailed);
            }
        };

        let contents = match drain_stream(stream, self.policy.max_file_bytes).await {
            Ok(contents) => contents,
            Err(error) => {
                warn!(%submission_id, key = %key, error = %error, "evidence stream could not be read into the archive");
                return skipped(job, SkipReason::StreamError);
            }
        };

        let observed_size = u64::try_from(contents.len()).unwrap_or(u64::MAX);
        let size = job
            .announced_size
            .filter(|size| *size > 0)
            .unwrap_or(observed_size);

        if let Err(error) = self.sink.append_entry(job.path.clone(), contents).await {
            error!(%submission_id, error = %error, "archive writer rejected entry");
            self.sink_failed.store(true, Ordering::Release);
            return skipped(job, SkipReason::StreamError);
        }

        let detail = BackupFileDetail {
            backup_id: self.backup_id,
            submission_id,
            status: BackupFileStatus::BackedUp,
            size_bytes: size,
            deleted_at: None,
        };
        if let Err(error) = self.backup_repository.record_file_detail(detail).await {
            // The file is in the archive but stays ineligible for purge.
            error!(%submission_id, error = %error, "failed to record backup file detail");
        }

        JobOutcome::Added(ManifestFileEntry {
            submission_id,
            activity_name: job.submission.activity_name.clone(),
            practitioner: job.submission.practitioner_name.clone(),
            date: job.submission.submitted_on,
            path: job.path.clone(),
            size,
        })
    }

    async fn open_with_retry(&self, key: &StorageKey) -> AppResult<EvidenceByteStream> {
        let max_attempts = self.policy.download_attempts.max(1);
        let mut attempt = 0_u32;

        loop {
            attempt = attempt.saturating_add(1);
            match self.storage.open_stream(key).await {
                Ok(stream) => return Ok(stream),
                Err(error) if attempt >= max_attempts => return Err(error),
                Err(error) => {
                    debug!(key = %key, attempt, error = %error, "retrying evidence download");
                    tokio::time::sleep(self.policy.retry_backoff.saturating_mul(attempt)).await;
                }
            }
        }
    }
}

fn skipped(job: &ArchiveJob, reason: SkipReason) -> JobOutcome {
    JobOutcome::Skipped(ManifestSkippedEntry {
        submission_id: job.submission.submission_id,
        filename: job.path.clone(),
        reason,
    })
}

async fn drain_stream(mut stream: EvidenceByteStream, max_bytes: u64) -> AppResult<Bytes> {
    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buffer.len().saturating_add(chunk.len()) > limit {
            return Err(AppError::Internal(format!(
                "evidence object exceeds the {max_bytes} byte archive limit"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

struct Finalizer {
    backup: BackupRecord,
    total_files: usize,
    actor: String,
    ip_address: Option<String>,
    backup_repository: Arc<dyn BackupRepository>,
    audit_trail: AuditTrail,
    sink: Arc<dyn ArchiveSink>,
}

impl Finalizer {
    async fn complete(
        self,
        ledger: ArchiveLedger,
        delivered: oneshot::Receiver<()>,
    ) -> ArchiveRunReport {
        let added_files = ledger.files.len();
        let skipped_files = ledger.skipped.len();

        let manifest = BackupManifest {
            backup_date: Utc::now(),
            date_range: self.backup.date_range.into(),
            total_files: self.total_files,
            added_files,
            skipped_count: skipped_files,
            backup_id: self.backup.backup_id,
            total_size_bytes: self.backup.total_bytes,
            created_by: self.actor.clone(),
            files: ledger.files,
            skipped_files: ledger.skipped,
        };

        let manifest_bytes = match serde_json::to_vec_pretty(&manifest) {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(backup_id = %self.backup.backup_id, error = %error, "failed to encode manifest");
                return self
                    .fail_counts(
                        "archive manifest could not be encoded",
                        added_files,
                        skipped_files,
                        &manifest.skipped_files,
                    )
                    .await;
            }
        };

        let finalized = async {
            self.sink
                .append_entry(MANIFEST_FILE_NAME.to_owned(), Bytes::from(manifest_bytes))
                .await?;
            self.sink.finish().await
        }
        .await;

        if let Err(error) = finalized {
            error!(backup_id = %self.backup.backup_id, error = %error, "failed to finalise archive");
            return self
                .fail_counts(
                    "archive could not be finalised",
                    added_files,
                    skipped_files,
                    &manifest.skipped_files,
                )
                .await;
        }

        if delivered.await.is_err() {
            return self
                .fail_counts(
                    "archive download ended before the client received every byte",
                    added_files,
                    skipped_files,
                    &manifest.skipped_files,
                )
                .await;
        }

        let note = format!("added {added_files}, skipped {skipped_files}");
        if let Err(error) = self
            .backup_repository
            .finish_backup(self.backup.backup_id, BackupStatus::Completed, &note)
            .await
        {
            error!(backup_id = %self.backup.backup_id, error = %error, "failed to mark backup completed");
            let reason =
                format!("archive delivered but the backup record could not be completed: {error}");
            self.audit(
                AuditAction::EvidenceBackupFailed,
                added_files,
                skipped_files,
                &manifest.skipped_files,
                Some(&reason),
            )
            .await;
            return ArchiveRunReport {
                status: BackupStatus::Failed,
                added_files,
                skipped_files,
            };
        }

        self.audit(
            AuditAction::EvidenceBackupCompleted,
            added_files,
            skipped_files,
            &manifest.skipped_files,
            None,
        )
        .await;

        info!(
            backup_id = %self.backup.backup_id,
            added_files,
            skipped_files,
            "evidence archive completed"
        );

        ArchiveRunReport {
            status: BackupStatus::Completed,
            added_files,
            skipped_files,
        }
    }

    async fn fail(self, reason: &str, ledger: &ArchiveLedger) -> ArchiveRunReport {
        self.fail_counts(
            reason,
            ledger.files.len(),
            ledger.skipped.len(),
            &ledger.skipped,
        )
        .await
    }

    async fn fail_counts(
        &self,
        reason: &str,
        added_files: usize,
        skipped_files: usize,
        skipped: &[ManifestSkippedEntry],
    ) -> ArchiveRunReport {
        error!(backup_id = %self.backup.backup_id, reason, "evidence archive failed");
        self.sink.abort(reason.to_owned()).await;

        if let Err(error) = self
            .backup_repository
            .finish_backup(self.backup.backup_id, BackupStatus::Failed, reason)
            .await
        {
            error!(backup_id = %self.backup.backup_id, error = %error, "failed to mark backup failed");
        }

        self.audit(
            AuditAction::EvidenceBackupFailed,
            added_files,
            skipped_files,
            skipped,
            Some(reason),
        )
        .await;

        ArchiveRunReport {
            status: BackupStatus::Failed,
            added_files,
            skipped_files,
        }
    }

    async fn audit(
        &self,
        action: AuditAction,
        added_files: usize,
        skipped_files: usize,
        skipped: &[ManifestSkippedEntry],
        error: Option<&str>,
    ) {
        let mut skip_reasons: BTreeMap<&'static str, usize> = BTreeMap::new();
        for entry in skipped {
            *skip_reasons.entry(entry.reason.as_str()).or_default() += 1;
        }

        let event = AuditEvent {
            actor: self.actor.clone(),
            action,
            target_table: "evidence_backups".to_owned(),
            target_key: Some(self.backup.backup_id.to_string()),
            payload: serde_json::json!({
                "backupId": self.backup.backup_id,
                "dateRange": {
                    "start": self.backup.date_range.start(),
                    "end": self.backup.date_range.end(),
                },
                "totalFiles": self.total_files,
                "addedFiles": added_files,
                "skippedCount": skipped_files,
                "skipReasons": skip_reasons,
                "totalSizeBytes": self.backup.total_bytes,
                "error": error,
            }),
            ip_address: self.ip_address.clone(),
        };

        if let Err(error) = self.audit_trail.record(event).await {
            error!(backup_id = %self.backup.backup_id, error = %error, "failed to write backup audit entry");
        }
    }
}
