use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use evidex_core::AppResult;
use evidex_domain::AuditAction;

/// Audit event emitted by application services before chaining.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Subject that performed the action.
    pub actor: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Table the action targeted.
    pub target_table: String,
    /// Row key, absent for bulk operations.
    pub target_key: Option<String>,
    /// Structured detail payload.
    pub payload: Value,
    /// Caller IP address when known.
    pub ip_address: Option<String>,
}

/// Persisted, hash-chained audit log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogEntry {
    /// Position in the chain, starting at 1.
    pub sequence_number: i64,
    /// Subject that performed the action.
    pub actor: String,
    /// Stable action identifier.
    pub action: String,
    /// Table the action targeted.
    pub target_table: String,
    /// Row key, absent for bulk operations.
    pub target_key: Option<String>,
    /// Structured detail payload.
    pub payload: Value,
    /// Caller IP address when known.
    pub ip_address: Option<String>,
    /// Event timestamp, microsecond precision.
    pub created_at: DateTime<Utc>,
    /// Hash of the preceding entry.
    pub previous_hash: Option<String>,
    /// SHA-256 of this entry's canonical form.
    pub record_hash: String,
}

/// Port for persisting append-only audit entries.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Returns the newest entry of the chain.
    async fn latest_entry(&self) -> AppResult<Option<AuditLogEntry>>;

    /// Persists one chained entry.
    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()>;

    /// Lists entries with a sequence number greater than `after_sequence`,
    /// ascending.
    async fn list_entries_after(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> AppResult<Vec<AuditLogEntry>>;
}
