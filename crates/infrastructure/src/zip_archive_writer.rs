use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

use evidex_application::{ArchiveSink, ArchiveWriter, OpenedArchive};
use evidex_core::{AppError, AppResult};

const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Streams ZIP archives through a dedicated blocking writer thread.
///
/// Entries are serialised through a bounded command channel; the encoded
/// bytes flow through a second bounded channel to the consumer, so a slow
/// reader slows the writer down.
#[derive(Debug, Clone)]
pub struct ZipArchiveWriter {
    command_capacity: usize,
    chunk_capacity: usize,
}

impl ZipArchiveWriter {
    /// Creates a writer with the given channel capacities.
    #[must_use]
    pub fn new(command_capacity: usize, chunk_capacity: usize) -> Self {
        Self {
            command_capacity: command_capacity.max(1),
            chunk_capacity: chunk_capacity.max(1),
        }
    }
}

impl Default for ZipArchiveWriter {
    fn default() -> Self {
        Self::new(8, 32)
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn open(&self) -> AppResult<OpenedArchive> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            AppError::Internal(format!("archive writer requires a tokio runtime: {error}"))
        })?;

        let (command_sender, command_receiver) = mpsc::channel(self.command_capacity);
        let (chunk_sender, chunk_receiver) = mpsc::channel(self.chunk_capacity);

        runtime.spawn_blocking(move || run_writer(command_receiver, chunk_sender));

        Ok(OpenedArchive {
            sink: Arc::new(ZipArchiveSink {
                commands: command_sender,
            }),
            body: Box::pin(ReceiverStream::new(chunk_receiver)),
        })
    }
}

enum ArchiveCommand {
    Append {
        path: String,
        contents: Bytes,
        ack: oneshot::Sender<AppResult<()>>,
    },
    Finish {
        ack: oneshot::Sender<AppResult<()>>,
    },
    Abort {
        reason: String,
    },
}

struct ZipArchiveSink {
    commands: mpsc::Sender<ArchiveCommand>,
}

impl ZipArchiveSink {
    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<AppResult<()>>) -> ArchiveCommand,
    ) -> AppResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(command(ack))
            .await
            .map_err(|_| AppError::Internal("archive writer stopped".to_owned()))?;

        done.await
            .map_err(|_| AppError::Internal("archive writer stopped".to_owned()))?
    }
}

#[async_trait]
impl ArchiveSink for ZipArchiveSink {
    async fn append_entry(&self, path: String, contents: Bytes) -> AppResult<()> {
        self.request(|ack| ArchiveCommand::Append {
            path,
            contents,
            ack,
        })
        .await
    }

    async fn finish(&self) -> AppResult<()> {
        self.request(|ack| ArchiveCommand::Finish { ack }).await
    }

    async fn abort(&self, reason: String) {
        if self
            .commands
            .send(ArchiveCommand::Abort { reason })
            .await
            .is_err()
        {
            debug!("archive writer already stopped before abort");
        }
    }
}

/// `Write` adapter that batches encoded bytes into channel chunks.
///
/// Once `discarding` is set every write is accepted and dropped, so the
/// finalising `Drop` of an abandoned `ZipWriter` succeeds without emitting
/// anything to the consumer.
struct ChunkForwarder {
    sender: mpsc::Sender<io::Result<Bytes>>,
    buffer: Vec<u8>,
    discarding: Arc<AtomicBool>,
}

impl ChunkForwarder {
    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let chunk = Bytes::from(std::mem::take(&mut self.buffer));
        self.sender.blocking_send(Ok(chunk)).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer disconnected")
        })
    }
}

impl Write for ChunkForwarder {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.discarding.load(Ordering::Acquire) {
            self.buffer.clear();
            return Ok(data.len());
        }

        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.send_buffer()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.discarding.load(Ordering::Acquire) {
            self.buffer.clear();
            return Ok(());
        }
        self.send_buffer()
    }
}

fn run_writer(
    mut commands: mpsc::Receiver<ArchiveCommand>,
    chunks: mpsc::Sender<io::Result<Bytes>>,
) {
    let discarding = Arc::new(AtomicBool::new(false));
    let mut zip = Some(ZipWriter::new_stream(ChunkForwarder {
        sender: chunks.clone(),
        buffer: Vec::with_capacity(FLUSH_THRESHOLD),
        discarding: discarding.clone(),
    }));

    while let Some(command) = commands.blocking_recv() {
        match command {
            ArchiveCommand::Append {
                path,
                contents,
                ack,
            } => {
                let result = match zip.as_mut() {
                    Some(writer) => append_entry(writer, &path, &contents),
                    None => Err(AppError::Internal("archive is already closed".to_owned())),
                };
                let _ = ack.send(result);
            }
            ArchiveCommand::Finish { ack } => {
                let result = match zip.take() {
                    Some(writer) => finish_archive(writer),
                    None => Err(AppError::Internal("archive is already closed".to_owned())),
                };
                let _ = ack.send(result);
                return;
            }
            ArchiveCommand::Abort { reason } => {
                warn!(reason = %reason, "aborting evidence archive stream");
                discarding.store(true, Ordering::Release);
                drop(zip.take());
                let _ = chunks.blocking_send(Err(io::Error::other(reason)));
                return;
            }
        }
    }

    // Every sink handle is gone without a terminal command.
    discarding.store(true, Ordering::Release);
    drop(zip.take());
    let _ = chunks.blocking_send(Err(io::Error::other("archive was abandoned")));
}

fn append_entry(
    writer: &mut ZipWriter<StreamWriter<ChunkForwarder>>,
    path: &str,
    contents: &[u8],
) -> AppResult<()> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(contents.len() >= u32::MAX as usize);

    writer
        .start_file(path, options)
        .map_err(|error| AppError::Internal(format!("failed to start archive entry '{path}': {error}")))?;
    writer
        .write_all(contents)
        .map_err(|error| AppError::Internal(format!("failed to write archive entry '{path}': {error}")))
}

fn finish_archive(writer: ZipWriter<StreamWriter<ChunkForwarder>>) -> AppResult<()> {
    let mut inner = writer
        .finish()
        .map_err(|error| AppError::Internal(format!("failed to finalise archive: {error}")))?;
    inner
        .flush()
        .map_err(|error| AppError::Internal(format!("failed to flush archive: {error}")))
}
