use std::sync::Arc;

use evidex_application::{
    ArchiveWriter, AuditTrail, EvidenceBackupService, EvidenceDeletionService, EvidenceLocator,
    EvidenceStorage,
};
use evidex_core::AppError;
use evidex_infrastructure::{
    ObjectStoreEvidenceStorage, PostgresAuditRepository, PostgresBackupRepository,
    PostgresDeletionRepository, PostgresEvidenceRepository, ZipArchiveWriter,
};
use sqlx::PgPool;
use tracing::warn;

use crate::api_config::ApiConfig;
use crate::state::AppState;

pub fn build_app_state(pool: PgPool, config: &ApiConfig) -> Result<AppState, AppError> {
    let evidence_storage: Arc<dyn EvidenceStorage> = match &config.storage {
        Some(settings) => Arc::new(ObjectStoreEvidenceStorage::from_s3_settings(settings)?),
        None => {
            warn!("EVIDENCE_STORAGE_BUCKET is not set; evidence archival and deletion are disabled");
            Arc::new(ObjectStoreEvidenceStorage::unconfigured())
        }
    };

    let evidence_repository = Arc::new(PostgresEvidenceRepository::new(pool.clone()));
    let backup_repository = Arc::new(PostgresBackupRepository::new(pool.clone()));
    let deletion_repository = Arc::new(PostgresDeletionRepository::new(pool.clone()));
    let audit_trail = AuditTrail::new(Arc::new(PostgresAuditRepository::new(pool.clone())));
    let archive_writer: Arc<dyn ArchiveWriter> = Arc::new(ZipArchiveWriter::default());
    let locator = EvidenceLocator::new(evidence_repository.clone());

    let backup_service = EvidenceBackupService::new(
        locator.clone(),
        evidence_storage.clone(),
        backup_repository.clone(),
        archive_writer,
        audit_trail.clone(),
        config.backup_policy.clone(),
    );
    let deletion_service = EvidenceDeletionService::new(
        locator,
        evidence_storage.clone(),
        evidence_repository,
        backup_repository,
        deletion_repository,
        audit_trail.clone(),
        config.deletion_policy.clone(),
    );

    Ok(AppState {
        backup_service,
        deletion_service,
        audit_trail,
        evidence_storage,
        postgres_pool: pool,
        frontend_url: config.frontend_url.clone(),
    })
}
