mod archive;
mod audit;
mod repository;
mod storage;

pub use archive::{ArchiveByteStream, ArchiveSink, ArchiveWriter, OpenedArchive};
pub use audit::{AuditEvent, AuditLogEntry, AuditRepository};
pub use repository::{
    BackupRepository, DeletionRepository, EvidenceRepository, NewBackupRecord, NewDeletionRecord,
};
pub use storage::{EvidenceByteStream, EvidenceStorage};
