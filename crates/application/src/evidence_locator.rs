use std::sync::Arc;

use evidex_core::AppResult;
use evidex_domain::{DeletionCandidate, EvidenceDateRange, EvidenceSubmission};

use crate::evidence_ports::EvidenceRepository;

/// Finds evidence files inside a date window.
///
/// Empty results are returned as empty lists; callers decide whether that is
/// a `NotFound`.
#[derive(Clone)]
pub struct EvidenceLocator {
    repository: Arc<dyn EvidenceRepository>,
}

impl EvidenceLocator {
    /// Creates a locator over the submission repository.
    #[must_use]
    pub fn new(repository: Arc<dyn EvidenceRepository>) -> Self {
        Self { repository }
    }

    /// Returns approved submissions with evidence inside `range`.
    pub async fn locate_for_backup(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<EvidenceSubmission>> {
        self.repository.list_archivable(range).await
    }

    /// Returns approved submissions inside `range` that are covered by a
    /// `Backed Up` detail row.
    pub async fn locate_for_deletion(
        &self,
        range: EvidenceDateRange,
    ) -> AppResult<Vec<DeletionCandidate>> {
        self.repository.list_deletion_candidates(range).await
    }
}
