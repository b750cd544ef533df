use std::sync::Arc;

use evidex_application::{AuditTrail, EvidenceBackupService, EvidenceDeletionService, EvidenceStorage};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub backup_service: EvidenceBackupService,
    pub deletion_service: EvidenceDeletionService,
    pub audit_trail: AuditTrail,
    pub evidence_storage: Arc<dyn EvidenceStorage>,
    pub postgres_pool: PgPool,
    pub frontend_url: String,
}
