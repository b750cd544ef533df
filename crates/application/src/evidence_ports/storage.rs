use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use evidex_core::AppResult;
use evidex_domain::StorageKey;

/// Byte chunks of one stored evidence object.
pub type EvidenceByteStream = BoxStream<'static, AppResult<Bytes>>;

/// Port over the object-storage backend holding evidence files.
///
/// Constructed once per process and shared by reference.
#[async_trait]
pub trait EvidenceStorage: Send + Sync {
    /// Returns whether a backend is configured at all.
    fn is_configured(&self) -> bool;

    /// Opens a byte stream for the object stored under `key`.
    async fn open_stream(&self, key: &StorageKey) -> AppResult<EvidenceByteStream>;

    /// Deletes the object stored under `key`.
    ///
    /// Returns `false` when the backend reports that nothing was deleted.
    async fn delete(&self, key: &StorageKey) -> AppResult<bool>;

    /// Returns the object size from a metadata probe, if the object exists.
    async fn object_size(&self, key: &StorageKey) -> AppResult<Option<u64>>;
}
