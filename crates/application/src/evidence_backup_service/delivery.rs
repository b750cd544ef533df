use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;

use crate::evidence_ports::ArchiveByteStream;

/// Wraps the archive body and reports once the consumer has read it to the end.
///
/// The signal fires only when the stream ends without having yielded an
/// error. Dropping the body early drops the sender, which the run observes
/// as an undelivered archive.
pub(super) struct DeliveryWatch {
    inner: ArchiveByteStream,
    delivered: Option<oneshot::Sender<()>>,
}

impl DeliveryWatch {
    pub(super) fn wrap(inner: ArchiveByteStream) -> (ArchiveByteStream, oneshot::Receiver<()>) {
        let (delivered, receiver) = oneshot::channel();
        let watch = Self {
            inner,
            delivered: Some(delivered),
        };
        (Box::pin(watch), receiver)
    }
}

impl Stream for DeliveryWatch {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(None) => {
                if let Some(delivered) = this.delivered.take() {
                    let _ = delivered.send(());
                }
            }
            Poll::Ready(Some(Err(_))) => {
                this.delivered = None;
            }
            _ => {}
        }
        polled
    }
}
