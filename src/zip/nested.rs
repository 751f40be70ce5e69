//! Archives stored inside other archives.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::trace;

use super::archive::ZipFile;
use super::decompress::Decompressor;
use super::entry::Entry;
use crate::error::{Result, ZipError};
use crate::io::{RandomAccessReader, RangeStream, ReaderRef, range_end};

/// An entry of an open archive exposed as a [`RandomAccessReader`].
///
/// Stored entries are read in place. Deflate entries are decompressed from
/// the start for every range, skipping up to the requested offset, so random
/// access into them costs a linear scan. The outer reader stays open until
/// this reader is closed.
///
/// ```no_run
/// use seekzip::zip::EntryReader;
/// use seekzip::{OpenOptions, ZipFile};
///
/// # async fn run(outer: &ZipFile, entry: &seekzip::Entry) -> seekzip::Result<()> {
/// let nested = EntryReader::new(outer, entry).await?;
/// let size = nested.size();
/// let inner = ZipFile::from_reader(nested, size, OpenOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct EntryReader {
    source: Mutex<Option<ReaderRef>>,
    file_data_start: u64,
    uncompressed_size: u64,
    compressed_size: u64,
    decompressor: Option<Arc<dyn Decompressor>>,
}

impl EntryReader {
    pub async fn new(zip: &ZipFile, entry: &Entry) -> Result<Self> {
        if entry.is_encrypted() {
            return Err(ZipError::Encrypted);
        }
        let decompressor = match entry.compression_method {
            0 => None,
            8 => Some(Arc::clone(&zip.options().decompressor)),
            method => return Err(ZipError::UnsupportedCompression(method)),
        };
        let source = zip.reader()?;
        let file_data_start = zip.local_file_data_start(entry).await?;
        trace!(name = %entry.file_name, file_data_start, "opened nested archive reader");
        Ok(Self {
            source: Mutex::new(Some(source)),
            file_data_start,
            uncompressed_size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
            decompressor,
        })
    }

    /// Size of the entry's content, the total size of the nested archive.
    pub fn size(&self) -> u64 {
        self.uncompressed_size
    }

    fn source(&self) -> io::Result<ReaderRef> {
        self.source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ReaderRef::acquire)
            .ok_or_else(|| ZipError::Closed.into())
    }
}

#[async_trait]
impl RandomAccessReader for EntryReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        if start > end || end > self.uncompressed_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range [{start}, {end}) outside entry of {} bytes", self.uncompressed_size),
            ));
        }
        let source = self.source()?;
        let Some(decompressor) = &self.decompressor else {
            return source
                .create_read_stream(
                    range_end(self.file_data_start, start)?,
                    range_end(self.file_data_start, end)?,
                )
                .await;
        };

        let compressed = source
            .create_read_stream(
                self.file_data_start,
                range_end(self.file_data_start, self.compressed_size)?,
            )
            .await?;
        let mut plain = decompressor.decompress(compressed);
        let skipped = tokio::io::copy(&mut (&mut plain).take(start), &mut tokio::io::sink()).await?;
        if skipped < start {
            return Err(ZipError::NotEnoughBytes {
                expected: start,
                actual: skipped,
            }
            .into());
        }
        Ok(Box::pin(plain.take(end - start)))
    }

    fn close(&self) -> io::Result<()> {
        self.source.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
