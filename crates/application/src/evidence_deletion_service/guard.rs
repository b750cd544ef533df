use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use evidex_core::{AppError, AppResult, UserIdentity};
use evidex_domain::{BackupRecord, DeletionCandidate, EvidenceDateRange};

use crate::access::require_privileged;
use crate::evidence_locator::EvidenceLocator;
use crate::evidence_ports::{BackupRepository, DeletionRepository, EvidenceStorage};

use super::{CooldownScope, DeletionPolicy, EvidenceDeletionRequest};

/// A request that passed every safety check.
#[derive(Debug, Clone)]
pub struct AuthorizedDeletion {
    /// Window to purge.
    pub range: EvidenceDateRange,
    /// Backup that covers the window.
    pub covering_backup: BackupRecord,
    /// Files to delete.
    pub candidates: Vec<DeletionCandidate>,
}

/// Validates a purge request before any deletion I/O happens.
///
/// Checks run in a fixed order and the first failure wins. Nothing is
/// mutated and nothing is audited on rejection.
#[derive(Clone)]
pub struct DeletionGuard {
    locator: EvidenceLocator,
    storage: Arc<dyn EvidenceStorage>,
    backup_repository: Arc<dyn BackupRepository>,
    deletion_repository: Arc<dyn DeletionRepository>,
    policy: DeletionPolicy,
}

impl DeletionGuard {
    /// Creates a new guard.
    #[must_use]
    pub fn new(
        locator: EvidenceLocator,
        storage: Arc<dyn EvidenceStorage>,
        backup_repository: Arc<dyn BackupRepository>,
        deletion_repository: Arc<dyn DeletionRepository>,
        policy: DeletionPolicy,
    ) -> Self {
        Self {
            locator,
            storage,
            backup_repository,
            deletion_repository,
            policy,
        }
    }

    /// Runs every safety check against `request` at time `now`.
    pub async fn authorize(
        &self,
        actor: &UserIdentity,
        request: &EvidenceDeletionRequest,
        now: DateTime<Utc>,
    ) -> AppResult<AuthorizedDeletion> {
        require_privileged(actor)?;

        let (Some(start_date), Some(end_date)) =
            (request.start_date.as_deref(), request.end_date.as_deref())
        else {
            return Err(AppError::Validation(
                "start date and end date are required".to_owned(),
            ));
        };

        let Some(token) = request
            .confirmation_token
            .as_deref()
            .filter(|token| !token.is_empty())
        else {
            return Err(AppError::Validation(
                "confirmation token is required".to_owned(),
            ));
        };

        if token != self.policy.confirmation_phrase {
            return Err(AppError::Validation(format!(
                "confirmation token must be exactly '{}'",
                self.policy.confirmation_phrase
            )));
        }

        let range = EvidenceDateRange::parse(Some(start_date), Some(end_date), now.date_naive())?;

        if !self.storage.is_configured() {
            return Err(AppError::StorageUnavailable(
                "evidence storage is not configured".to_owned(),
            ));
        }

        let covering_backup = self.require_covering_backup(actor, range, now).await?;
        self.require_cooldown_elapsed(actor, now).await?;

        let candidates = self.locator.locate_for_deletion(range).await?;
        if candidates.is_empty() {
            return Err(AppError::NotFound(format!(
                "no archived evidence files left to delete between {} and {}",
                range.start(),
                range.end()
            )));
        }

        if candidates.len() > self.policy.max_files {
            return Err(AppError::LimitExceeded {
                message: format!(
                    "{} archived files match this range; at most {} can be deleted at once, narrow the date range",
                    candidates.len(),
                    self.policy.max_files
                ),
                requested: candidates.len(),
                limit: self.policy.max_files,
            });
        }

        debug!(
            actor = %actor.subject(),
            range = %range,
            backup_id = %covering_backup.backup_id,
            candidates = candidates.len(),
            "evidence deletion authorised"
        );

        Ok(AuthorizedDeletion {
            range,
            covering_backup,
            candidates,
        })
    }

    async fn require_covering_backup(
        &self,
        actor: &UserIdentity,
        range: EvidenceDateRange,
        now: DateTime<Utc>,
    ) -> AppResult<BackupRecord> {
        let max_age =
            TimeDelta::from_std(self.policy.covering_backup_max_age).unwrap_or(TimeDelta::zero());

        self.backup_repository
            .find_covering_backup(actor.subject(), range, now - max_age)
            .await?
            .ok_or_else(|| {
                AppError::SafetyGate(format!(
                    "no completed backup created by you in the last {} hours covers {}; back up this range before deleting",
                    self.policy.covering_backup_max_age.as_secs() / 3_600,
                    range
                ))
            })
    }

    async fn require_cooldown_elapsed(
        &self,
        actor: &UserIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let scope_actor = match self.policy.cooldown_scope {
            CooldownScope::PerActor => Some(actor.subject()),
            CooldownScope::SystemWide => None,
        };

        let Some(latest) = self
            .deletion_repository
            .latest_deletion(scope_actor)
            .await?
        else {
            return Ok(());
        };

        let cooldown = TimeDelta::from_std(self.policy.cooldown).unwrap_or(TimeDelta::zero());
        let elapsed = now.signed_duration_since(latest.created_at);
        if elapsed >= cooldown {
            return Ok(());
        }

        let remaining = cooldown - elapsed;
        let mut retry_after_seconds = remaining.num_seconds();
        if remaining.subsec_nanos() > 0 {
            retry_after_seconds += 1;
        }

        Err(AppError::CooldownActive {
            retry_after_seconds: u64::try_from(retry_after_seconds.max(1)).unwrap_or(1),
        })
    }
}
