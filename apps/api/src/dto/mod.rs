mod backup;
mod common;

pub use backup::{
    AuditChainVerificationResponse, BackupEvidenceRequest, BackupHistoryResponse,
    BackupRecordResponse, DeleteArchivedRequest, DeleteArchivedResponse, DeletionFailureResponse,
    DeletionRecordResponse,
};
pub use common::{HealthDependencyStatus, HealthResponse};
