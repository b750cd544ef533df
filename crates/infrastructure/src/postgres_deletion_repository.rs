use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use evidex_application::{DeletionRepository, NewDeletionRecord};
use evidex_core::{AppError, AppResult};
use evidex_domain::{DeletionRecord, EvidenceDateRange};

use crate::postgres_values::{from_bigint, to_bigint};

/// PostgreSQL-backed append-only repository for purge runs.
#[derive(Clone)]
pub struct PostgresDeletionRepository {
    pool: PgPool,
}

impl PostgresDeletionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DeletionRow {
    id: Uuid,
    range_start: NaiveDate,
    range_end: NaiveDate,
    attempted_count: i64,
    succeeded_count: i64,
    failed_count: i64,
    bytes_freed: i64,
    actor: String,
    backup_id: Option<Uuid>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeletionRow> for DeletionRecord {
    type Error = AppError;

    fn try_from(row: DeletionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            deletion_id: row.id,
            date_range: EvidenceDateRange::from_stored(row.range_start, row.range_end),
            attempted_count: from_bigint("attempted_count", row.attempted_count)?,
            succeeded_count: from_bigint("succeeded_count", row.succeeded_count)?,
            failed_count: from_bigint("failed_count", row.failed_count)?,
            bytes_freed: from_bigint("bytes_freed", row.bytes_freed)?,
            actor: row.actor,
            backup_id: row.backup_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

const DELETION_COLUMNS: &str = r#"
    id,
    range_start,
    range_end,
    attempted_count,
    succeeded_count,
    failed_count,
    bytes_freed,
    actor,
    backup_id,
    note,
    created_at
"#;

#[async_trait]
impl DeletionRepository for PostgresDeletionRepository {
    async fn latest_deletion(&self, actor: Option<&str>) -> AppResult<Option<DeletionRecord>> {
        let row = sqlx::query_as::<_, DeletionRow>(&format!(
            r#"
            SELECT {DELETION_COLUMNS}
            FROM evidence_deletions
            WHERE ($1::TEXT IS NULL OR actor = $1)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find latest deletion: {error}")))?;

        row.map(DeletionRecord::try_from).transpose()
    }

    async fn create_deletion(&self, input: NewDeletionRecord) -> AppResult<DeletionRecord> {
        let row = sqlx::query_as::<_, DeletionRow>(&format!(
            r#"
            INSERT INTO evidence_deletions (
                id,
                range_start,
                range_end,
                attempted_count,
                succeeded_count,
                failed_count,
                bytes_freed,
                actor,
                backup_id,
                note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {DELETION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.date_range.start())
        .bind(input.date_range.end())
        .bind(to_bigint(input.attempted_count))
        .bind(to_bigint(input.succeeded_count))
        .bind(to_bigint(input.failed_count))
        .bind(to_bigint(input.bytes_freed))
        .bind(input.actor)
        .bind(input.backup_id)
        .bind(input.note)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create deletion record: {error}"))
        })?;

        DeletionRecord::try_from(row)
    }

    async fn list_recent_deletions(&self, limit: usize) -> AppResult<Vec<DeletionRecord>> {
        let rows = sqlx::query_as::<_, DeletionRow>(&format!(
            r#"
            SELECT {DELETION_COLUMNS}
            FROM evidence_deletions
            ORDER BY created_at DESC
            LIMIT $1
            "#
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list deletions: {error}")))?;

        rows.into_iter().map(DeletionRecord::try_from).collect()
    }
}
