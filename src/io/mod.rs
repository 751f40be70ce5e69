//! Random-access byte sources backing an archive.
//!
//! Any medium that can hand out a byte stream for an arbitrary `[start, end)`
//! range can back a [`ZipFile`](crate::ZipFile): implement
//! [`RandomAccessReader`] and hand it to
//! [`ZipFile::from_reader`](crate::ZipFile::from_reader). The crate ships
//! readers for local files, in-memory buffers and HTTP servers that honour
//! `Range` requests; [`EntryReader`](crate::zip::EntryReader) turns an entry
//! of one archive into the backing resource of another.
//!
//! Readers are shared through [`ReaderRef`], a counted reference. The reader
//! is closed exactly once, when the last reference goes away.

mod buffer;
pub(crate) mod filters;
mod http;
mod local;
mod resource;

pub use buffer::BufferReader;
pub use filters::AssertByteCount;
pub use http::HttpRangeReader;
pub use local::FileReader;
pub use resource::{CloseStatus, CloseWatcher, ReaderRef};

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A boxed byte stream produced by a reader or a decoding stage.
pub type RangeStream = Pin<Box<dyn AsyncRead + Send>>;

/// Trait for random access reading from a data source.
#[async_trait]
pub trait RandomAccessReader: Send + Sync {
    /// Open a stream yielding the bytes in `[start, end)`.
    ///
    /// The range is never empty; zero-length requests are answered by
    /// [`ReaderRef::create_read_stream`] without calling into the reader.
    /// The stream is expected to produce exactly `end - start` bytes.
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream>;

    /// Read data at the specified offset into the buffer.
    ///
    /// May return fewer bytes than requested; callers continue from the
    /// advanced position. The default implementation drains a range stream.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = range_end(offset, buf.len() as u64)?;
        let mut stream = self.read_stream_for_range(offset, end).await?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Release the underlying resource. Called exactly once.
    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// End of the range `[start, start + len)`, or `InvalidInput` if it does not
/// fit in a `u64`.
pub(crate) fn range_end(start: u64, len: u64) -> io::Result<u64> {
    start.checked_add(len).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("range starting at {start} with length {len} overflows"),
        )
    })
}
