use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use evidex_core::{AppError, AppResult, UserIdentity};
use evidex_domain::{AuditAction, DeletionRecord};

use crate::access::require_privileged;
use crate::audit_trail::AuditTrail;
use crate::evidence_locator::EvidenceLocator;
use crate::evidence_ports::{
    AuditEvent, BackupRepository, DeletionRepository, EvidenceRepository, EvidenceStorage,
    NewDeletionRecord,
};

mod config;
mod executor;
mod guard;

pub use config::{CooldownScope, DeletionPolicy};
pub use executor::{DeletionExecutor, DeletionFailure, ExecutionSummary};
pub use guard::{AuthorizedDeletion, DeletionGuard};

/// Raw input of one purge request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceDeletionRequest {
    /// Inclusive first day.
    pub start_date: Option<String>,
    /// Inclusive last day.
    pub end_date: Option<String>,
    /// Phrase the caller typed to confirm.
    pub confirmation_token: Option<String>,
    /// Client address recorded in the audit trail.
    pub ip_address: Option<String>,
}

/// Result of a purge. Partial failure is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Appended deletion record.
    pub deletion_id: Uuid,
    /// Files removed from storage.
    pub deleted_count: usize,
    /// Files left in place.
    pub failed_count: usize,
    /// Bytes released.
    pub bytes_freed: u64,
    /// Per-file failure reasons.
    pub failures: Vec<DeletionFailure>,
    /// Backup that covered the purged window.
    pub backup_id: Uuid,
}

/// Application service that purges archived evidence after the safety checks pass.
#[derive(Clone)]
pub struct EvidenceDeletionService {
    guard: DeletionGuard,
    executor: DeletionExecutor,
    deletion_repository: Arc<dyn DeletionRepository>,
    audit_trail: AuditTrail,
}

impl EvidenceDeletionService {
    /// Creates a new deletion service.
    #[must_use]
    pub fn new(
        locator: EvidenceLocator,
        storage: Arc<dyn EvidenceStorage>,
        evidence_repository: Arc<dyn EvidenceRepository>,
        backup_repository: Arc<dyn BackupRepository>,
        deletion_repository: Arc<dyn DeletionRepository>,
        audit_trail: AuditTrail,
        policy: DeletionPolicy,
    ) -> Self {
        Self {
            guard: DeletionGuard::new(
                locator,
                storage.clone(),
                backup_repository.clone(),
                deletion_repository.clone(),
                policy,
            ),
            executor: DeletionExecutor::new(storage, evidence_repository, backup_repository),
            deletion_repository,
            audit_trail,
        }
    }

    /// Deletes archived evidence in the requested window.
    pub async fn purge_archived(
        &self,
        actor: &UserIdentity,
        request: EvidenceDeletionRequest,
    ) -> AppResult<DeletionOutcome> {
        let authorized = match self.guard.authorize(actor, &request, Utc::now()).await {
            Ok(authorized) => authorized,
            Err(error @ AppError::Internal(_)) => {
                error!(actor = %actor.subject(), error = %error, "evidence deletion checks failed unexpectedly");
                let payload = serde_json::json!({
                    "dateRange": { "start": request.start_date, "end": request.end_date },
                    "error": error.to_string(),
                });
                self.audit(
                    actor,
                    &request,
                    AuditAction::EvidenceDeletionFailed,
                    None,
                    payload,
                )
                .await;
                return Err(error);
            }
            Err(rejection) => return Err(rejection),
        };
        let AuthorizedDeletion {
            range,
            covering_backup,
            candidates,
        } = authorized;

        info!(
            actor = %actor.subject(),
            range = %range,
            backup_id = %covering_backup.backup_id,
            candidates = candidates.len(),
            "evidence deletion started"
        );

        let summary = self.executor.execute(&candidates).await;
        let deleted_count = summary.deleted_ids.len();
        let failed_count = summary.failures.len();

        let note = match &summary.persistence_error {
            Some(persistence_error) => format!(
                "deleted {deleted_count}, failed {failed_count}; database update failed: {persistence_error}"
            ),
            None => format!("deleted {deleted_count}, failed {failed_count}"),
        };

        let record = self
            .deletion_repository
            .create_deletion(NewDeletionRecord {
                date_range: range,
                attempted_count: count(candidates.len()),
                succeeded_count: count(deleted_count),
                failed_count: count(failed_count),
                bytes_freed: summary.bytes_freed,
                actor: actor.subject().to_owned(),
                backup_id: Some(covering_backup.backup_id),
                note: Some(note),
            })
            .await;

        let failure = match (&record, &summary.persistence_error) {
            (Err(record_error), _) => Some(record_error.to_string()),
            (Ok(_), Some(persistence_error)) => Some(persistence_error.to_string()),
            (Ok(_), None) => None,
        };

        let action = if failure.is_some() {
            AuditAction::EvidenceDeletionFailed
        } else {
            AuditAction::EvidenceDeletionCompleted
        };

        let deletion_id = record.as_ref().ok().map(|record| record.deletion_id);
        let payload = serde_json::json!({
            "deletionId": deletion_id,
            "backupId": covering_backup.backup_id,
            "dateRange": { "start": range.start(), "end": range.end() },
            "attemptedCount": candidates.len(),
            "deletedCount": deleted_count,
            "failedCount": failed_count,
            "bytesFreed": summary.bytes_freed,
            "failures": summary.failures,
            "error": failure,
        });
        self.audit(actor, &request, action, deletion_id, payload)
            .await;

        let record = record?;
        if let Some(persistence_error) = summary.persistence_error {
            error!(deletion_id = %record.deletion_id, error = %persistence_error, "evidence deletion bookkeeping failed");
            return Err(AppError::Internal(format!(
                "evidence deletion bookkeeping failed: {persistence_error}"
            )));
        }

        info!(
            deletion_id = %record.deletion_id,
            deleted_count,
            failed_count,
            bytes_freed = summary.bytes_freed,
            "evidence deletion finished"
        );

        Ok(DeletionOutcome {
            deletion_id: record.deletion_id,
            deleted_count,
            failed_count,
            bytes_freed: summary.bytes_freed,
            failures: summary.failures,
            backup_id: covering_backup.backup_id,
        })
    }

    /// Lists recent purges, newest first.
    pub async fn list_recent_deletions(
        &self,
        actor: &UserIdentity,
        limit: usize,
    ) -> AppResult<Vec<DeletionRecord>> {
        require_privileged(actor)?;
        self.deletion_repository
            .list_recent_deletions(limit.clamp(1, 200))
            .await
    }

    async fn audit(
        &self,
        actor: &UserIdentity,
        request: &EvidenceDeletionRequest,
        action: AuditAction,
        deletion_id: Option<Uuid>,
        payload: serde_json::Value,
    ) {
        let event = AuditEvent {
            actor: actor.subject().to_owned(),
            action,
            target_table: "evidence_deletions".to_owned(),
            target_key: deletion_id.map(|id| id.to_string()),
            payload,
            ip_address: request.ip_address.clone(),
        };

        if let Err(error) = self.audit_trail.record(event).await {
            error!(error = %error, "failed to write deletion audit entry");
        }
    }
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
