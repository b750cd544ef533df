use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;
use uuid::Uuid;

use evidex_domain::{EvidenceSubmission, StorageKey};

use crate::evidence_ports::EvidenceStorage;

/// One size lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeLookup {
    /// Submission identifier.
    pub submission_id: Uuid,
    /// Stored evidence reference.
    pub evidence_reference: String,
    /// Size already known from the database.
    pub cached_size: Option<u64>,
}

impl From<&EvidenceSubmission> for SizeLookup {
    fn from(value: &EvidenceSubmission) -> Self {
        Self {
            submission_id: value.submission_id,
            evidence_reference: value.evidence_reference.clone(),
            cached_size: value.size_bytes,
        }
    }
}

/// Best-effort sizes for a batch of evidence files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSizes {
    sizes: HashMap<Uuid, u64>,
    total_bytes: u64,
    missing_count: usize,
}

impl ResolvedSizes {
    /// Returns the size of one submission, if it could be resolved.
    #[must_use]
    pub fn size_of(&self, submission_id: Uuid) -> Option<u64> {
        self.sizes.get(&submission_id).copied()
    }

    /// Returns the sum of all resolved sizes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Returns how many lookups produced no size.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.missing_count
    }
}

/// Resolves evidence sizes from cached values or storage metadata probes.
#[derive(Clone)]
pub struct SizeResolver {
    storage: Arc<dyn EvidenceStorage>,
    probe_concurrency: usize,
}

impl SizeResolver {
    /// Creates a resolver probing at most `probe_concurrency` objects at once.
    #[must_use]
    pub fn new(storage: Arc<dyn EvidenceStorage>, probe_concurrency: usize) -> Self {
        Self {
            storage,
            probe_concurrency: probe_concurrency.max(1),
        }
    }

    /// Returns whether the storage backend is configured.
    #[must_use]
    pub fn storage_reachable(&self) -> bool {
        self.storage.is_configured()
    }

    /// Resolves sizes for `lookups`. Missing sizes are tolerated and counted.
    pub async fn resolve(&self, lookups: &[SizeLookup]) -> ResolvedSizes {
        let storage_reachable = self.storage_reachable();

        let probes: Vec<_> = lookups
            .iter()
            .map(|lookup| self.resolve_one(lookup, storage_reachable))
            .collect();
        let resolved: Vec<(Uuid, Option<u64>)> = futures::stream::iter(probes)
            .buffer_unordered(self.probe_concurrency)
            .collect()
            .await;

        let mut result = ResolvedSizes::default();
        for (submission_id, size) in resolved {
            match size {
                Some(size) => {
                    result.total_bytes = result.total_bytes.saturating_add(size);
                    result.sizes.insert(submission_id, size);
                }
                None => result.missing_count += 1,
            }
        }

        result
    }

    /// Resolves one lookup from its cached size or a storage probe.
    async fn resolve_one(
        &self,
        lookup: &SizeLookup,
        storage_reachable: bool,
    ) -> (Uuid, Option<u64>) {
        if let Some(size) = lookup.cached_size {
            return (lookup.submission_id, Some(size));
        }
        if !storage_reachable {
            return (lookup.submission_id, None);
        }

        let Ok(key) = StorageKey::from_reference(&lookup.evidence_reference) else {
            return (lookup.submission_id, None);
        };

        match self.storage.object_size(&key).await {
            Ok(size) => (lookup.submission_id, size),
            Err(error) => {
                debug!(submission_id = %lookup.submission_id, error = %error, "size probe failed");
                (lookup.submission_id, None)
            }
        }
    }
}
