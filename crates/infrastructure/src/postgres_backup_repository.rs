use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use evidex_application::{BackupRepository, NewBackupRecord};
use evidex_core::{AppError, AppResult};
use evidex_domain::{BackupFileDetail, BackupRecord, BackupStatus, EvidenceDateRange};

use crate::postgres_values::{from_bigint, to_bigint};

/// PostgreSQL-backed repository for archival runs and their per-file rows.
#[derive(Clone)]
pub struct PostgresBackupRepository {
    pool: PgPool,
}

impl PostgresBackupRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BackupRow {
    id: Uuid,
    range_start: NaiveDate,
    range_end: NaiveDate,
    total_files: i64,
    total_bytes: i64,
    status: String,
    note: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BackupRow> for BackupRecord {
    type Error = AppError;

    fn try_from(row: BackupRow) -> Result<Self, Self::Error> {
        Ok(Self {
            backup_id: row.id,
            date_range: EvidenceDateRange::from_stored(row.range_start, row.range_end),
            total_files: from_bigint("total_files", row.total_files)?,
            total_bytes: from_bigint("total_bytes", row.total_bytes)?,
            status: BackupStatus::from_str(row.status.as_str())?,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl BackupRepository for PostgresBackupRepository {
    async fn create_backup(&self, input: NewBackupRecord) -> AppResult<BackupRecord> {
        let row = sqlx::query_as::<_, BackupRow>(
            r#"
            INSERT INTO evidence_backups (
                id,
                range_start,
                range_end,
                total_files,
                total_bytes,
                status,
                created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING
                id,
                range_start,
                range_end,
                total_files,
                total_bytes,
                status,
                note,
                created_by,
                created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.date_range.start())
        .bind(input.date_range.end())
        .bind(to_bigint(input.total_files))
        .bind(to_bigint(input.total_bytes))
        .bind(BackupStatus::InProgress.as_str())
        .bind(input.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create backup record: {error}")))?;

        BackupRecord::try_from(row)
    }

    async fn finish_backup(
        &self,
        backup_id: Uuid,
        status: BackupStatus,
        note: &str,
    ) -> AppResult<()> {
        if !status.is_terminal() {
            return Err(AppError::Validation(format!(
                "backup status '{}' is not terminal",
                status.as_str()
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE evidence_backups
            SET status = $2,
                note = $3
            WHERE id = $1
                AND status = 'In Progress'
            "#,
        )
        .bind(backup_id)
        .bind(status.as_str())
        .bind(note)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to finish backup record: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "backup '{backup_id}' does not exist or already finished"
            )));
        }

        Ok(())
    }

    async fn record_file_detail(&self, detail: BackupFileDetail) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence_backup_files (
                backup_id,
                submission_id,
                status,
                size_bytes,
                deleted_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (backup_id, submission_id) DO NOTHING
            "#,
        )
        .bind(detail.backup_id)
        .bind(detail.submission_id)
        .bind(detail.status.as_str())
        .bind(to_bigint(detail.size_bytes))
        .bind(detail.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to record backup file detail: {error}"))
        })?;

        Ok(())
    }

    async fn find_covering_backup(
        &self,
        created_by: &str,
        range: EvidenceDateRange,
        created_after: DateTime<Utc>,
    ) -> AppResult<Option<BackupRecord>> {
        let row = sqlx::query_as::<_, BackupRow>(
            r#"
            SELECT
                id,
                range_start,
                range_end,
                total_files,
                total_bytes,
                status,
                note,
                created_by,
                created_at
            FROM evidence_backups
            WHERE status = 'Completed'
                AND created_by = $1
                AND created_at > $2
                AND range_start <= $3
                AND range_end >= $4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(created_by)
        .bind(created_after)
        .bind(range.start())
        .bind(range.end())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find covering backup: {error}")))?;

        row.map(BackupRecord::try_from).transpose()
    }

    async fn mark_files_deleted(
        &self,
        submission_ids: &[Uuid],
        deleted_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        if submission_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE evidence_backup_files
            SET status = 'Deleted',
                deleted_at = $2
            WHERE submission_id = ANY($1)
                AND status = 'Backed Up'
            "#,
        )
        .bind(submission_ids)
        .bind(deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to mark backup files deleted: {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn list_recent_backups(&self, limit: usize) -> AppResult<Vec<BackupRecord>> {
        let rows = sqlx::query_as::<_, BackupRow>(
            r#"
            SELECT
                id,
                range_start,
                range_end,
                total_files,
                total_bytes,
                status,
                note,
                created_by,
                created_at
            FROM evidence_backups
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list backups: {error}")))?;

        rows.into_iter().map(BackupRecord::try_from).collect()
    }
}
