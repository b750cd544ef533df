//! In-memory port implementations shared by the evidence service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use futures::channel::mpsc;
use tokio::sync::Mutex;
use uuid::Uuid;

use evidex_core::{AppError, AppResult, UserIdentity, UserRole};
use evidex_domain::{
    ApprovalStatus, BackupFileDetail, BackupFileStatus, BackupRecord, BackupStatus,
    DeletionCandidate, DeletionRecord, EvidenceDateRange, EvidenceSubmission, StorageKey,
};

use crate::evidence_ports::{
    ArchiveSink, ArchiveWriter, AuditLogEntry, AuditRepository, BackupRepository,
    DeletionRepository, EvidenceByteStream, EvidenceRepository, EvidenceStorage, NewBackupRecord,
    NewDeletionRecord, OpenedArchive,
};

pub(crate) fn admin() -> UserIdentity {
    UserIdentity::new("admin-1", "Ada Admin", None, UserRole::Administrator)
}

pub(crate) fn practitioner() -> UserIdentity {
    UserIdentity::new("pract-1", "Pat Practitioner", None, UserRole::Practitioner)
}

pub(crate) fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or_default()
}

pub(crate) fn submission(reference: &str, submitted_on: &str) -> EvidenceSubmission {
    EvidenceSubmission {
        submission_id: Uuid::new_v4(),
        license_id: "LIC-1001".to_owned(),
        practitioner_name: "Jamie Rivera".to_owned(),
        activity_name: "Annual CPR Refresher".to_owned(),
        submitted_on: day(submitted_on),
        evidence_reference: reference.to_owned(),
        approval_status: ApprovalStatus::Approved,
        size_bytes: None,
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) submissions: Vec<EvidenceSubmission>,
    pub(crate) backups: Vec<BackupRecord>,
    pub(crate) details: Vec<BackupFileDetail>,
    pub(crate) deletions: Vec<DeletionRecord>,
    pub(crate) audit: Vec<AuditLogEntry>,
    pub(crate) evidence_queries: usize,
    pub(crate) cleared_ids: Vec<Uuid>,
    pub(crate) deleted_detail_ids: Vec<Uuid>,
    pub(crate) fail_clear_evidence: bool,
    pub(crate) fail_evidence_queries: bool,
    pub(crate) fail_finish_backup: bool,
}

/// One in-memory database implementing every repository port.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    pub(crate) state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub(crate) async fn seed_submissions(&self, submissions: &[EvidenceSubmission]) {
        self.state
            .lock()
            .await
            .submissions
            .extend_from_slice(submissions);
    }

    /// Inserts a completed backup covering `range` with one detail row per submission.
    pub(crate) async fn seed_completed_backup(
        &self,
        created_by: &str,
        range: EvidenceDateRange,
        created_at: DateTime<Utc>,
        sizes: &[(Uuid, u64)],
    ) -> Uuid {
        let backup_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        state.backups.push(BackupRecord {
            backup_id,
            date_range: range,
            total_files: sizes.len() as u64,
            total_bytes: sizes.iter().map(|(_, size)| size).sum(),
            status: BackupStatus::Completed,
            note: Some(format!("added {}, skipped 0", sizes.len())),
            created_by: created_by.to_owned(),
            created_at,
        });
        for (submission_id, size_bytes) in sizes {
            state.details.push(BackupFileDetail {
                backup_id,
                submission_id: *submission_id,
                status: BackupFileStatus::BackedUp,
                size_bytes: *size_bytes,
                deleted_at: None,
            });
        }
        backup_id
    }
}

fn has_evidence(submission: &EvidenceSubmission) -> bool {
    submission.approval_status == ApprovalStatus::Approved
        && !submission.evidence_reference.is_empty()
}

#[async_trait]
impl EvidenceRepository for InMemoryStore {
    async fn list_archivable(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<EvidenceSubmission>> {
        let mut state = self.state.lock().await;
        state.evidence_queries += 1;
        if state.fail_evidence_queries {
            return Err(AppError::Internal("connection reset".to_owned()));
        }
        Ok(state
            .submissions
            .iter()
            .filter(|submission| has_evidence(submission))
            .filter(|submission| range.contains_date(submission.submitted_on))
            .cloned()
            .collect())
    }

    async fn list_deletion_candidates(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<DeletionCandidate>> {
        let mut state = self.state.lock().await;
        state.evidence_queries += 1;
        if state.fail_evidence_queries {
            return Err(AppError::Internal("connection reset".to_owned()));
        }

        let mut candidates = Vec::new();
        for submission in state.submissions.iter().filter(|submission| {
            has_evidence(submission) && range.contains_date(submission.submitted_on)
        }) {
            let Some(detail) = state.details.iter().find(|detail| {
                detail.submission_id == submission.submission_id
                    && detail.status == BackupFileStatus::BackedUp
            }) else {
                continue;
            };

            candidates.push(DeletionCandidate {
                submission_id: submission.submission_id,
                evidence_reference: submission.evidence_reference.clone(),
                backup_id: detail.backup_id,
                size_bytes: Some(detail.size_bytes)
                    .filter(|size| *size > 0)
                    .or(submission.size_bytes),
            });
        }

        Ok(candidates)
    }

    async fn clear_evidence(&self, submission_ids: &[Uuid]) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        if state.fail_clear_evidence {
            return Err(AppError::Internal("connection reset".to_owned()));
        }

        let mut updated = 0;
        for submission in state
            .submissions
            .iter_mut()
            .filter(|submission| submission_ids.contains(&submission.submission_id))
        {
            submission.evidence_reference.clear();
            submission.size_bytes = None;
            updated += 1;
        }
        state.cleared_ids.extend_from_slice(submission_ids);
        Ok(updated)
    }
}

#[async_trait]
impl BackupRepository for InMemoryStore {
    async fn create_backup(&self, input: NewBackupRecord) -> AppResult<BackupRecord> {
        let record = BackupRecord {
            backup_id: Uuid::new_v4(),
            date_range: input.date_range,
            total_files: input.total_files,
            total_bytes: input.total_bytes,
            status: BackupStatus::InProgress,
            note: None,
            created_by: input.created_by,
            created_at: Utc::now(),
        };
        self.state.lock().await.backups.push(record.clone());
        Ok(record)
    }

    async fn finish_backup(
        &self,
        backup_id: Uuid,
        status: BackupStatus,
        note: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_finish_backup {
            return Err(AppError::Internal("connection reset".to_owned()));
        }
        let Some(record) = state
            .backups
            .iter_mut()
            .find(|record| record.backup_id == backup_id && !record.status.is_terminal())
        else {
            return Err(AppError::NotFound(format!(
                "backup {backup_id} is not in progress"
            )));
        };
        record.status = status;
        record.note = Some(note.to_owned());
        Ok(())
    }

    async fn record_file_detail(&self, detail: BackupFileDetail) -> AppResult<()> {
        self.state.lock().await.details.push(detail);
        Ok(())
    }

    async fn find_covering_backup(
        &self,
        created_by: &str,
        range: EvidenceDateRange,
        created_after: DateTime<Utc>,
    ) -> AppResult<Option<BackupRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .backups
            .iter()
            .filter(|record| {
                record.status == BackupStatus::Completed
                    && record.created_by == created_by
                    && record.created_at > created_after
                    && record.date_range.covers(&range)
            })
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn mark_files_deleted(
        &self,
        submission_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for detail in state.details.iter_mut().filter(|detail| {
            detail.status == BackupFileStatus::BackedUp
                && submission_ids.contains(&detail.submission_id)
        }) {
            detail.status = BackupFileStatus::Deleted;
            detail.deleted_at = Some(deleted_at);
            updated += 1;
        }
        state.deleted_detail_ids.extend_from_slice(submission_ids);
        Ok(updated)
    }

    async fn list_recent_backups(&self, limit: usize) -> AppResult<Vec<BackupRecord>> {
        let mut records = self.state.lock().await.backups.clone();
        records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl DeletionRepository for InMemoryStore {
    async fn latest_deletion(&self, actor: Option<&str>) -> AppResult<Option<DeletionRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .deletions
            .iter()
            .filter(|record| actor.is_none_or(|actor| record.actor == actor))
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn create_deletion(&self, input: NewDeletionRecord) -> AppResult<DeletionRecord> {
        let record = DeletionRecord {
            deletion_id: Uuid::new_v4(),
            date_range: input.date_range,
            attempted_count: input.attempted_count,
            succeeded_count: input.succeeded_count,
            failed_count: input.failed_count,
            bytes_freed: input.bytes_freed,
            actor: input.actor,
            backup_id: input.backup_id,
            note: input.note,
            created_at: Utc::now(),
        };
        self.state.lock().await.deletions.push(record.clone());
        Ok(record)
    }

    async fn list_recent_deletions(&self, limit: usize) -> AppResult<Vec<DeletionRecord>> {
        let mut records = self.state.lock().await.deletions.clone();
        records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn latest_entry(&self) -> AppResult<Option<AuditLogEntry>> {
        Ok(self.state.lock().await.audit.last().cloned())
    }

    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()> {
        self.state.lock().await.audit.push(entry);
        Ok(())
    }

    async fn list_entries_after(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .audit
            .iter()
            .filter(|entry| entry.sequence_number > after_sequence)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Object storage double with scripted failures.
pub(crate) struct FakeStorage {
    configured: bool,
    objects: Mutex<HashMap<String, Bytes>>,
    always_failing: HashSet<String>,
    flaky: Mutex<HashMap<String, u32>>,
    broken_streams: HashSet<String>,
    refusing_deletes: HashSet<String>,
    pub(crate) open_calls: AtomicUsize,
    pub(crate) delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl FakeStorage {
    pub(crate) fn new() -> Self {
        Self {
            configured: true,
            objects: Mutex::new(HashMap::new()),
            always_failing: HashSet::new(),
            flaky: Mutex::new(HashMap::new()),
            broken_streams: HashSet::new(),
            refusing_deletes: HashSet::new(),
            open_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub(crate) fn with_object(self, key: &str, contents: &'static [u8]) -> Self {
        if let Ok(mut objects) = self.objects.try_lock() {
            objects.insert(key.to_owned(), Bytes::from_static(contents));
        }
        self
    }

    pub(crate) fn failing(mut self, key: &str) -> Self {
        self.always_failing.insert(key.to_owned());
        self
    }

    pub(crate) fn flaky(self, key: &str, failures: u32) -> Self {
        if let Ok(mut flaky) = self.flaky.try_lock() {
            flaky.insert(key.to_owned(), failures);
        }
        self
    }

    pub(crate) fn broken_stream(mut self, key: &str) -> Self {
        self.broken_streams.insert(key.to_owned());
        self
    }

    pub(crate) fn refusing_delete(mut self, key: &str) -> Self {
        self.refusing_deletes.insert(key.to_owned());
        self
    }

    pub(crate) async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }
}

#[async_trait]
impl EvidenceStorage for FakeStorage {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn open_stream(&self, key: &StorageKey) -> AppResult<EvidenceByteStream> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight
            .fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_failing.contains(key.as_str()) {
            return Err(AppError::Internal(format!("503 from storage for {key}")));
        }

        if let Some(remaining) = self.flaky.lock().await.get_mut(key.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Internal(format!("timeout opening {key}")));
            }
        }

        let Some(contents) = self.objects.lock().await.get(key.as_str()).cloned() else {
            return Err(AppError::NotFound(format!("object {key} not found")));
        };

        if self.broken_streams.contains(key.as_str()) {
            let chunks: Vec<AppResult<Bytes>> = vec![
                Ok(contents.slice(..contents.len() / 2)),
                Err(AppError::Internal(
                    "connection reset mid-transfer".to_owned(),
                )),
            ];
            return Ok(Box::pin(futures::stream::iter(chunks)));
        }

        Ok(Box::pin(futures::stream::iter(vec![Ok(contents)])))
    }

    async fn delete(&self, key: &StorageKey) -> AppResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.refusing_deletes.contains(key.as_str()) {
            return Err(AppError::Internal(format!("access denied deleting {key}")));
        }
        Ok(self.objects.lock().await.remove(key.as_str()).is_some())
    }

    async fn object_size(&self, key: &StorageKey) -> AppResult<Option<u64>> {
        Ok(self
            .objects
            .lock()
            .await
            .get(key.as_str())
            .map(|contents| contents.len() as u64))
    }
}

/// What a [`RecordingArchiveWriter`] saw.
#[derive(Debug, Default)]
pub(crate) struct RecordedArchive {
    pub(crate) entries: Vec<(String, Bytes)>,
    pub(crate) finished: bool,
    pub(crate) aborted: Option<String>,
}

struct RecordingSink {
    record: Arc<Mutex<RecordedArchive>>,
    output: Mutex<Option<mpsc::UnboundedSender<Result<Bytes, std::io::Error>>>>,
}

#[async_trait]
impl ArchiveSink for RecordingSink {
    async fn append_entry(&self, path: String, contents: Bytes) -> AppResult<()> {
        let output = self.output.lock().await;
        let Some(sender) = output.as_ref() else {
            return Err(AppError::Internal("archive already closed".to_owned()));
        };
        sender
            .unbounded_send(Ok(Bytes::from(path.clone())))
            .map_err(|_| AppError::Internal("archive consumer disconnected".to_owned()))?;
        self.record.lock().await.entries.push((path, contents));
        Ok(())
    }

    async fn finish(&self) -> AppResult<()> {
        self.output.lock().await.take();
        self.record.lock().await.finished = true;
        Ok(())
    }

    async fn abort(&self, reason: String) {
        if let Some(sender) = self.output.lock().await.take() {
            let _ = sender.unbounded_send(Err(std::io::Error::other(reason.clone())));
        }
        self.record.lock().await.aborted = Some(reason);
    }
}

/// Archive writer that records entries instead of producing a ZIP.
#[derive(Default)]
pub(crate) struct RecordingArchiveWriter {
    pub(crate) record: Arc<Mutex<RecordedArchive>>,
}

impl ArchiveWriter for RecordingArchiveWriter {
    fn open(&self) -> AppResult<OpenedArchive> {
        let (sender, receiver) = mpsc::unbounded();
        Ok(OpenedArchive {
            sink: Arc::new(RecordingSink {
                record: self.record.clone(),
                output: Mutex::new(Some(sender)),
            }),
            body: Box::pin(receiver),
        })
    }
}
