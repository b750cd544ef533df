//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod object_store_evidence_storage;
mod postgres_audit_repository;
mod postgres_backup_repository;
mod postgres_deletion_repository;
mod postgres_evidence_repository;
mod postgres_values;
mod zip_archive_writer;

pub use object_store_evidence_storage::{ObjectStoreEvidenceStorage, S3StorageSettings};
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_backup_repository::PostgresBackupRepository;
pub use postgres_deletion_repository::PostgresDeletionRepository;
pub use postgres_evidence_repository::PostgresEvidenceRepository;
pub use zip_archive_writer::ZipArchiveWriter;
