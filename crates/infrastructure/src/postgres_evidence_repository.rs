use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use evidex_application::EvidenceRepository;
use evidex_core::{AppError, AppResult};
use evidex_domain::{ApprovalStatus, DeletionCandidate, EvidenceDateRange, EvidenceSubmission};

use crate::postgres_values::from_bigint;


/// PostgreSQL-backed repository over approved compliance submissions.
#[derive(Clone)]
pub struct PostgresEvidenceRepository {
    pool: PgPool,
}

impl PostgresEvidenceRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EvidenceSubmissionRow {
    id: Uuid,
    license_id: String,
    practitioner_name: String,
    activity_name: String,
    submitted_on: NaiveDate,
    evidence_reference: String,
    evidence_size_bytes: Option<i64>,
    approval_status: String,
}

impl TryFrom<EvidenceSubmissionRow> for EvidenceSubmission {
    type Error = AppError;

    fn try_from(row: EvidenceSubmissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            submission_id: row.id,
            license_id: row.license_id,
            practitioner_name: row.practitioner_name,
            activity_name: row.activity_name,
            submitted_on: row.submitted_on,
            evidence_reference: row.evidence_reference,
            approval_status: ApprovalStatus::from_str(row.approval_status.as_str())?,
            size_bytes: row
                .evidence_size_bytes
                .map(|size| from_bigint("evidence_size_bytes", size))
                .transpose()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeletionCandidateRow {
    submission_id: Uuid,
    evidence_reference: String,
    backup_id: Uuid,
    size_bytes: Option<i64>,
}

#[async_trait]
impl EvidenceRepository for PostgresEvidenceRepository {
    async fn list_archivable(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<EvidenceSubmission>> {
        let rows = sqlx::query_as::<_, EvidenceSubmissionRow>(
            r#"
            SELECT
                id,
                license_id,
                practitioner_name,
                activity_name,
                submitted_on,
                evidence_reference,
                evidence_size_bytes,
                approval_status
            FROM evidence_submissions
            WHERE approval_status = 'approved'
                AND evidence_reference IS NOT NULL
                AND evidence_reference <> ''
                AND submitted_on >= $1
                AND submitted_on < $2
            ORDER BY submitted_on, id
            "#,
        )
        .bind(range.start())
        .bind(range.exclusive_upper_bound())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list archivable evidence: {error}"))
        })?;

        rows.into_iter().map(EvidenceSubmission::try_from).collect()
    }

    async fn list_deletion_candidates(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<DeletionCandidate>> {
        let rows = sqlx::query_as::<_, DeletionCandidateRow>(
            r#"
            SELECT DISTINCT ON (submissions.id)
                submissions.id AS submission_id,
                submissions.evidence_reference,
                files.backup_id,
                COALESCE(NULLIF(files.size_bytes, 0), submissions.evidence_size_bytes) AS size_bytes
            FROM evidence_submissions submissions
            INNER JOIN evidence_backup_files files
                ON files.submission_id = submissions.id
                AND files.status = 'Backed Up'
            INNER JOIN evidence_backups backups
                ON backups.id = files.backup_id
                AND backups.status = 'Completed'
            WHERE submissions.approval_status = 'approved'
                AND submissions.evidence_reference IS NOT NULL
                AND submissions.evidence_reference <> ''
                AND submissions.submitted_on >= $1
                AND submissions.submitted_on < $2
            ORDER BY submissions.id, backups.created_at DESC
            "#,
        )
        .bind(range.start())
        .bind(range.exclusive_upper_bound())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list deletion candidates: {error}"))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(DeletionCandidate {
                    submission_id: row.submission_id,
                    evidence_reference: row.evidence_reference,
                    backup_id: row.backup_id,
                    size_bytes: row
                        .size_bytes
                        .map(|size| from_bigint("size_bytes", size))
                        .transpose()?,
                })
            })
            .collect()
    }

    async fn clear_evidence(&self, submission_ids: &[Uuid]) -> AppResult<u64> {
        if submission_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE evidence_submissions
            SET evidence_reference = NULL,
                evidence_size_bytes = NULL
            WHERE id = ANY($1)
                AND evidence_reference IS NOT NULL
            "#,
        )
        .bind(submission_ids)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to clear evidence references: {error}"))
        })?;

        Ok(result.rows_affected())
    }
}
