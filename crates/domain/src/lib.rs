//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod archive_path;
mod audit;
mod backup;
mod date_range;
mod deletion;
mod evidence;
mod manifest;

pub use archive_path::{MANIFEST_FILE_NAME, archive_entry_path, plan_archive_paths};
pub use audit::AuditAction;
pub use backup::{BackupFileDetail, BackupFileStatus, BackupRecord, BackupStatus, SkipReason};
pub use date_range::EvidenceDateRange;
pub use deletion::{DeletionCandidate, DeletionRecord};
pub use evidence::{ApprovalStatus, EvidenceSubmission, StorageKey};
pub use manifest::{BackupManifest, ManifestDateRange, ManifestFileEntry, ManifestSkippedEntry};
