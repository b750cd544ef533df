use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use evidex_application::{AuditLogEntry, AuditRepository};
use evidex_core::{AppError, AppResult};

/// PostgreSQL-backed append-only, hash-chained audit repository.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    sequence_number: i64,
    actor: String,
    action: String,
    target_table: String,
    target_key: Option<String>,
    payload: Value,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
    previous_hash: Option<String>,
    record_hash: String,
}

impl From<AuditRow> for AuditLogEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            sequence_number: row.sequence_number,
            actor: row.actor,
            action: row.action,
            target_table: row.target_table,
            target_key: row.target_key,
            payload: row.payload,
            ip_address: row.ip_address,
            created_at: row.created_at,
            previous_hash: row.previous_hash,
            record_hash: row.record_hash,
        }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn latest_entry(&self) -> AppResult<Option<AuditLogEntry>> {
        let row = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT
                sequence_number,
                actor,
                action,
                target_table,
                target_key,
                payload,
                ip_address,
                created_at,
                previous_hash,
                record_hash
            FROM evidence_audit_log
            ORDER BY sequence_number DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read audit chain tip: {error}")))?;

        Ok(row.map(AuditLogEntry::from))
    }

    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence_audit_log (
                sequence_number,
                actor,
                action,
                target_table,
                target_key,
                payload,
                ip_address,
                created_at,
                previous_hash,
                record_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.sequence_number)
        .bind(entry.actor)
        .bind(entry.action)
        .bind(entry.target_table)
        .bind(entry.target_key)
        .bind(entry.payload)
        .bind(entry.ip_address)
        .bind(entry.created_at)
        .bind(entry.previous_hash)
        .bind(entry.record_hash)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            let conflict = error
                .as_database_error()
                .is_some_and(|database_error| database_error.is_unique_violation());
            if conflict {
                AppError::Internal(format!(
                    "audit chain advanced concurrently at sequence {}",
                    entry.sequence_number
                ))
            } else {
                AppError::Internal(format!("failed to append audit entry: {error}"))
            }
        })?;

        Ok(())
    }

    async fn list_entries_after(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> AppResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT
                sequence_number,
                actor,
                action,
                target_table,
                target_key,
                payload,
                ip_address,
                created_at,
                previous_hash,
                record_hash
            FROM evidence_audit_log
            WHERE sequence_number > $1
            ORDER BY sequence_number ASC
            LIMIT $2
            "#,
        )
        .bind(after_sequence)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit entries: {error}")))?;

        Ok(rows.into_iter().map(AuditLogEntry::from).collect())
    }
}
