//! Tamper-evident audit trail.
//!
//! Every entry stores the SHA-256 of its canonical form together with the
//! hash of the entry before it, so editing or removing a persisted row breaks
//! the chain at that position.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use evidex_core::{AppResult, UserIdentity};

use crate::access::require_privileged;
use crate::evidence_ports::{AuditEvent, AuditLogEntry, AuditRepository};

const VERIFY_PAGE_SIZE: usize = 500;

/// Result of re-computing the audit hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditChainVerification {
    /// Whether every entry links to its predecessor and matches its hash.
    pub valid: bool,
    /// Entries inspected before stopping.
    pub records_checked: u64,
    /// Sequence number of the first inconsistent entry.
    pub first_broken_at: Option<i64>,
}

/// Append-only audit service that chains entries by hash.
#[derive(Clone)]
pub struct AuditTrail {
    repository: Arc<dyn AuditRepository>,
    append_lock: Arc<Mutex<()>>,
}

impl AuditTrail {
    /// Creates a new audit trail over the provided repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self {
            repository,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Chains and persists one event.
    pub async fn record(&self, event: AuditEvent) -> AppResult<AuditLogEntry> {
        // Tip lookup and append must not interleave within this process.
        let _guard = self.append_lock.lock().await;

        let (sequence_number, previous_hash) = match self.repository.latest_entry().await? {
            Some(tip) => (tip.sequence_number.saturating_add(1), Some(tip.record_hash)),
            None => (1, None),
        };

        let now = Utc::now();
        let created_at =
            DateTime::<Utc>::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);

        let mut entry = AuditLogEntry {
            sequence_number,
            actor: event.actor,
            action: event.action.as_str().to_owned(),
            target_table: event.target_table,
            target_key: event.target_key,
            payload: event.payload,
            ip_address: event.ip_address,
            created_at,
            previous_hash,
            record_hash: String::new(),
        };
        entry.record_hash = compute_record_hash(&entry);

        self.repository.append_entry(entry.clone()).await?;
        Ok(entry)
    }

    /// Re-computes the whole chain for administrative users.
    pub async fn verify_chain(&self, actor: &UserIdentity) -> AppResult<AuditChainVerification> {
        require_privileged(actor)?;

        let mut records_checked = 0_u64;
        let mut expected_sequence = 1_i64;
        let mut previous_hash: Option<String> = None;

        loop {
            let page = self
                .repository
                .list_entries_after(expected_sequence - 1, VERIFY_PAGE_SIZE)
                .await?;
            let page_len = page.len();

            for entry in page {
                records_checked += 1;

                let linked = entry.sequence_number == expected_sequence
                    && entry.previous_hash == previous_hash;
                if !linked || compute_record_hash(&entry) != entry.record_hash {
                    return Ok(AuditChainVerification {
                        valid: false,
                        records_checked,
                        first_broken_at: Some(entry.sequence_number),
                    });
                }

                expected_sequence += 1;
                previous_hash = Some(entry.record_hash);
            }

            if page_len < VERIFY_PAGE_SIZE {
                break;
            }
        }

        Ok(AuditChainVerification {
            valid: true,
            records_checked,
            first_broken_at: None,
        })
    }
}

/// Computes the SHA-256 hex digest of an entry's canonical JSON form.
#[must_use]
pub fn compute_record_hash(entry: &AuditLogEntry) -> String {
    let canonical = serde_json::json!({
        "sequence_number": entry.sequence_number,
        "actor": entry.actor,
        "action": entry.action,
        "target_table": entry.target_table,
        "target_key": entry.target_key,
        "payload": entry.payload,
        "ip_address": entry.ip_address,
        "created_at": entry.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        "previous_hash": entry.previous_hash,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
