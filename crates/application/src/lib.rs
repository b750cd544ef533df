//! Application services and ports for evidence archival and purge.

#![forbid(unsafe_code)]

mod access;
mod audit_trail;
mod evidence_backup_service;
mod evidence_deletion_service;
mod evidence_locator;
mod evidence_ports;
#[cfg(test)]
mod evidence_test_support;
mod size_resolver;

pub use audit_trail::{AuditChainVerification, AuditTrail, compute_record_hash};
pub use evidence_backup_service::{
    ArchiveRunReport, BackupPolicy, EvidenceBackupDownload, EvidenceBackupRequest,
    EvidenceBackupService, archive_file_name,
};
pub use evidence_deletion_service::{
    AuthorizedDeletion, CooldownScope, DeletionExecutor, DeletionFailure, DeletionGuard,
    DeletionOutcome, DeletionPolicy, EvidenceDeletionRequest, EvidenceDeletionService,
    ExecutionSummary,
};
pub use evidence_locator::EvidenceLocator;
pub use evidence_ports::{
    ArchiveByteStream, ArchiveSink, ArchiveWriter, AuditEvent, AuditLogEntry, AuditRepository,
    BackupRepository, DeletionRepository, EvidenceByteStream, EvidenceRepository, EvidenceStorage,
    NewBackupRecord, NewDeletionRecord, OpenedArchive,
};
pub use size_resolver::{ResolvedSizes, SizeLookup, SizeResolver};
