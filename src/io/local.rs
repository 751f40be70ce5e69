use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use super::filters::ChunkStream;
use super::{RandomAccessReader, RangeStream};

/// Local file reader with random access support.
///
/// Reads are positional (`pread` on unix, `seek_read` on windows), so any
/// number of range streams can share one descriptor. They run on tokio's
/// blocking pool; range streams are fed in 64 KiB chunks. The descriptor
/// itself is released when the reader is closed.
pub struct FileReader {
    file: Mutex<Option<Arc<std::fs::File>>>,
    size: u64,
}

impl FileReader {
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: std::fs::File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(Some(Arc::new(file))),
            size,
        })
    }

    /// Size of the file when it was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn handle(&self) -> io::Result<Arc<std::fs::File>> {
        self.file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| io::Error::other("file reader is closed"))
    }
}

fn read_at(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// Chunk size for range streams served from the blocking pool.
const CHUNK_SIZE: usize = 64 * 1024;

/// Positional read run on the blocking pool.
async fn read_blocking(file: Arc<std::fs::File>, offset: u64, len: usize) -> io::Result<Bytes> {
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; len];
        let n = read_at(&file, offset, &mut buf)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    })
    .await
    .map_err(io::Error::other)?
}

#[async_trait]
impl RandomAccessReader for FileReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        let file = self.handle()?;
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            let mut position = start;
            while position < end {
                let len = (end - position).min(CHUNK_SIZE as u64) as usize;
                let chunk = read_blocking(Arc::clone(&file), position, len).await;
                let done = match &chunk {
                    Ok(bytes) => bytes.is_empty(),
                    Err(_) => true,
                };
                if let Ok(bytes) = &chunk {
                    position += bytes.len() as u64;
                }
                // receiver gone: the stream was aborted
                if tx.send(chunk).await.is_err() || done {
                    break;
                }
            }
        });
        Ok(Box::pin(ChunkStream::new(rx)))
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.handle()?;
        let chunk = read_blocking(file, offset, buf.len()).await?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn close(&self) -> io::Result<()> {
        trace!("closing file descriptor");
        self.file.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
