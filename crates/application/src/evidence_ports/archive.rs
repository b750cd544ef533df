use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use evidex_core::AppResult;

/// Archive output consumed by the transport: chunks terminated by end-of-stream
/// on success or by an error item on failure.
pub type ArchiveByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Writable side of one streamed archive.
///
/// Entries may be appended from concurrent workers; the implementation
/// serialises them.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Writes one complete entry under `path`.
    async fn append_entry(&self, path: String, contents: Bytes) -> AppResult<()>;

    /// Finalises the archive and ends the byte stream successfully.
    async fn finish(&self) -> AppResult<()>;

    /// Terminates the byte stream with an error.
    async fn abort(&self, reason: String);
}

/// An opened archive: the sink to write to and the stream to hand to the caller.
pub struct OpenedArchive {
    /// Writable side.
    pub sink: Arc<dyn ArchiveSink>,
    /// Readable side.
    pub body: ArchiveByteStream,
}

/// Port for creating streamed archives.
pub trait ArchiveWriter: Send + Sync {
    /// Opens a new empty archive.
    fn open(&self) -> AppResult<OpenedArchive>;
}
