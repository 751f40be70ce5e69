//! Pass-through stream stages.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use super::ReaderRef;
use crate::error::ZipError;

/// Fails the stream unless it produces exactly `expected` bytes.
///
/// Surplus bytes are never handed to the consumer: the read that crosses the
/// limit is rolled back and turned into [`ZipError::TooManyBytes`]. An early
/// end of stream becomes [`ZipError::NotEnoughBytes`].
pub struct AssertByteCount<R> {
    inner: R,
    expected: u64,
    actual: u64,
}

impl<R> AssertByteCount<R> {
    pub fn new(inner: R, expected: u64) -> Self {
        Self {
            inner,
            expected,
            actual: 0,
        }
    }

    pub fn bytes_seen(&self) -> u64 {
        self.actual
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AssertByteCount<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let n = (buf.filled().len() - before) as u64;

        if n == 0 && buf.remaining() > 0 {
            if this.actual < this.expected {
                return Poll::Ready(Err(ZipError::NotEnoughBytes {
                    expected: this.expected,
                    actual: this.actual,
                }
                .into()));
            }
            return Poll::Ready(Ok(()));
        }

        this.actual += n;
        if this.actual > this.expected {
            buf.set_filled(before);
            return Poll::Ready(Err(ZipError::TooManyBytes {
                expected: this.expected,
                actual: this.actual,
            }
            .into()));
        }
        Poll::Ready(Ok(()))
    }
}

/// Holds a reader reference for as long as the wrapped stream is live.
///
/// The reference is released on end of stream, on the first error, or when
/// the stage is dropped, whichever comes first.
pub(crate) struct RefCounted<R> {
    inner: R,
    guard: Option<ReaderRef>,
}

impl<R> RefCounted<R> {
    pub(crate) fn new(inner: R, guard: ReaderRef) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for RefCounted<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = ready!(Pin::new(&mut this.inner).poll_read(cx, buf));
        let at_end = result.is_ok() && buf.filled().len() == before && buf.remaining() > 0;
        if result.is_err() || at_end {
            this.guard.take();
        }
        Poll::Ready(result)
    }
}

/// Adapts a channel of chunks, filled by a background task, into a byte
/// stream. An `Err` item fails the stream; a closed channel ends it.
pub(crate) struct ChunkStream {
    chunks: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
}

impl ChunkStream {
    pub(crate) fn new(chunks: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            chunks,
            pending: Bytes::new(),
        }
    }
}

impl AsyncRead for ChunkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.pending.is_empty() {
            match ready!(this.chunks.poll_recv(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(err)) => return Poll::Ready(Err(err)),
                None => return Poll::Ready(Ok(())),
            }
        }
        let n = this.pending.len().min(buf.remaining());
        buf.put_slice(&this.pending.split_to(n));
        Poll::Ready(Ok(()))
    }
}
