use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::archive::ZipFile;
use super::entry::Entry;
use crate::error::Result;
use crate::options::ReadStreamOptions;

/// ZIP file extractor
///
/// Convenience layer over [`ZipFile`] for the common "list, then pull whole
/// entries out" workflow. The archive is opened in lazy mode by the caller.
pub struct ZipExtractor<'a> {
    zip: &'a ZipFile,
}

impl<'a> ZipExtractor<'a> {
    pub fn new(zip: &'a ZipFile) -> Self {
        Self { zip }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<Entry>> {
        self.zip.read_all_entries().await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
        self.extract_to_writer(entry, &mut buf).await?;
        Ok(buf)
    }

    /// Stream an entry into any writer, returning the bytes written.
    pub async fn extract_to_writer<W>(&self, entry: &Entry, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = self.zip.open_read_stream(entry, ReadStreamOptions::new()).await?;
        let written = tokio::io::copy(&mut stream, writer).await?;
        writer.flush().await?;
        Ok(written)
    }

    /// Extract file to disk
    pub async fn extract_to_file(&self, entry: &Entry, output_path: &Path) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        self.extract_to_writer(entry, &mut file).await?;
        Ok(())
    }

    /// Extract file to stdout
    pub async fn extract_to_stdout(&self, entry: &Entry) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        self.extract_to_writer(entry, &mut stdout).await?;
        Ok(())
    }
}
