use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use evidex_core::{AppError, AppResult};
use evidex_domain::{DeletionCandidate, StorageKey};

use crate::evidence_ports::{BackupRepository, EvidenceRepository, EvidenceStorage};

/// One file that could not be removed from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionFailure {
    /// Submission whose evidence is still stored.
    pub submission_id: Uuid,
    /// Short explanation.
    pub reason: String,
}

/// What a purge run did, including persistence problems after the storage loop.
#[derive(Debug)]
pub struct ExecutionSummary {
    /// Submissions whose evidence left storage.
    pub deleted_ids: Vec<Uuid>,
    /// Files left in place.
    pub failures: Vec<DeletionFailure>,
    /// Bytes released by the deleted files.
    pub bytes_freed: u64,
    /// Error raised by the batched database updates, if any.
    pub persistence_error: Option<AppError>,
}

/// Deletes evidence objects one by one, then updates the database in two batches.
#[derive(Clone)]
pub struct DeletionExecutor {
    storage: Arc<dyn EvidenceStorage>,
    evidence_repository: Arc<dyn EvidenceRepository>,
    backup_repository: Arc<dyn BackupRepository>,
}

impl DeletionExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(
        storage: Arc<dyn EvidenceStorage>,
        evidence_repository: Arc<dyn EvidenceRepository>,
        backup_repository: Arc<dyn BackupRepository>,
    ) -> Self {
        Self {
            storage,
            evidence_repository,
            backup_repository,
        }
    }

    /// Deletes every candidate independently; a failing file never stops the run.
    ///
    /// Only submissions whose object was actually removed are passed to the
    /// batched updates.
    pub async fn execute(&self, candidates: &[DeletionCandidate]) -> ExecutionSummary {
        let mut deleted_ids = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();
        let mut bytes_freed = 0_u64;

        for candidate in candidates {
            match self.delete_one(candidate).await {
                Ok(()) => {
                    deleted_ids.push(candidate.submission_id);
                    bytes_freed = bytes_freed.saturating_add(candidate.size_bytes.unwrap_or(0));
                }
                Err(reason) => {
                    warn!(
                        submission_id = %candidate.submission_id,
                        reason = %reason,
                        "evidence file could not be deleted"
                    );
                    failures.push(DeletionFailure {
                        submission_id: candidate.submission_id,
                        reason,
                    });
                }
            }
        }

        let persistence_error = self.persist(&deleted_ids).await.err();

        info!(
            deleted = deleted_ids.len(),
            failed = failures.len(),
            bytes_freed,
            "evidence deletion loop finished"
        );

        ExecutionSummary {
            deleted_ids,
            failures,
            bytes_freed,
            persistence_error,
        }
    }

    async fn delete_one(&self, candidate: &DeletionCandidate) -> Result<(), String> {
        let key = StorageKey::from_reference(&candidate.evidence_reference)
            .map_err(|error| format!("invalid evidence reference: {error}"))?;

        match self.storage.delete(&key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("storage reported nothing was deleted".to_owned()),
            Err(error) => Err(error.to_string()),
        }
    }

    async fn persist(&self, deleted_ids: &[Uuid]) -> AppResult<()> {
        if deleted_ids.is_empty() {
            return Ok(());
        }

        let cleared = self.evidence_repository.clear_evidence(deleted_ids).await?;
        let flipped = self
            .backup_repository
            .mark_files_deleted(deleted_ids, Utc::now())
            .await?;

        if cleared != flipped {
            warn!(
                cleared,
                flipped, "submission and backup detail updates disagree"
            );
        }

        Ok(())
    }
}
