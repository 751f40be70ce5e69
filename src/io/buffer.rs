use std::io;

use async_trait::async_trait;
use bytes::Bytes;

use super::{RandomAccessReader, RangeStream};

/// In-memory reader over a byte buffer.
///
/// Range streams are zero-copy slices of the shared buffer. Ranges reaching
/// past the end are cut short; the byte-count check on the stream reports
/// the shortfall.
#[derive(Debug, Clone)]
pub struct BufferReader {
    data: Bytes,
}

impl BufferReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn slice(&self, start: u64, end: u64) -> Bytes {
        let len = self.data.len();
        let start = usize::try_from(start).unwrap_or(len).min(len);
        let end = usize::try_from(end).unwrap_or(len).clamp(start, len);
        self.data.slice(start..end)
    }
}

#[async_trait]
impl RandomAccessReader for BufferReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        Ok(Box::pin(io::Cursor::new(self.slice(start, end))))
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.slice(offset, offset.saturating_add(buf.len() as u64));
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}
