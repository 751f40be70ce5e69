//! Entry read streams.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::trace;

use super::decompress::Decompressor;
use crate::io::{AssertByteCount, RangeStream, ReaderRef};

/// Stored data of one entry, decompressed and size-checked as requested.
///
/// The stream holds a reference on the backing reader until it ends, fails,
/// is destroyed or dropped. Errors from any stage surface as read errors;
/// convert them with [`ZipError::from`](crate::ZipError) to get the variant.
pub struct ReadStream {
    pipeline: Option<RangeStream>,
}

impl ReadStream {
    pub(crate) fn new(pipeline: RangeStream) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }

    /// Abort the stream.
    ///
    /// The pipeline is torn down immediately, releasing its reader
    /// reference. Later reads report end of stream, never data or errors.
    pub fn destroy(&mut self) {
        if self.pipeline.take().is_some() {
            trace!("read stream destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.pipeline.is_none()
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(pipeline) = this.pipeline.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let before = buf.filled().len();
        match ready!(pipeline.as_mut().poll_read(cx, buf)) {
            Ok(()) => {
                if buf.filled().len() == before && buf.remaining() > 0 {
                    this.pipeline = None;
                }
                Poll::Ready(Ok(()))
            }
            Err(err) => {
                this.pipeline = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// What to read and how to decode it, once the local header is known.
pub(crate) struct StreamPlan<'a> {
    pub file_data_start: u64,
    pub relative_start: u64,
    pub relative_end: u64,
    /// Set to inflate; `None` reads the stored bytes.
    pub decompressor: Option<&'a dyn Decompressor>,
    /// Expected decompressed length, checked when inflating.
    pub uncompressed_size: Option<u64>,
}

impl StreamPlan<'_> {
    pub(crate) async fn open(self, reader: &ReaderRef) -> io::Result<ReadStream> {
        let start = self.file_data_start + self.relative_start;
        let end = self.file_data_start + self.relative_end;
        trace!(start, end, inflate = self.decompressor.is_some(), "building read stream");

        let mut stream = reader.create_read_stream(start, end).await?;
        if let Some(decompressor) = self.decompressor {
            stream = decompressor.decompress(stream);
            if let Some(expected) = self.uncompressed_size {
                stream = Box::pin(AssertByteCount::new(stream, expected));
            }
        }
        Ok(ReadStream::new(stream))
    }
}
