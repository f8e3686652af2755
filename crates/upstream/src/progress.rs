//! Byte-counting body stream.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use uprelay_core::ProgressSink;

/// Wraps an upload body and reports the cumulative byte count each time the
/// HTTP client pulls a chunk.
///
/// The client only pulls the next chunk once the connection can take it, so
/// the count follows what is handed to the socket rather than how far the
/// source has been read.
pub struct ProgressStream<S> {
    inner: S,
    bytes_transferred: u64,
    sink: Arc<dyn ProgressSink>,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            sink,
        }
    }

    /// Bytes yielded so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes_transferred += chunk.len() as u64;
                self.sink.report(self.bytes_transferred);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
