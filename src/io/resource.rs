use std::io;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::filters::{AssertByteCount, RefCounted};
use super::{RandomAccessReader, RangeStream};
use crate::error::{Result, ZipError};

/// Lifecycle of a shared reader as seen by a [`CloseWatcher`].
#[derive(Debug, Clone)]
pub enum CloseStatus {
    Open,
    Closed,
    /// `close()` was called and reported an error.
    Failed(Arc<io::Error>),
}

impl CloseStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, CloseStatus::Open)
    }
}

struct SharedReader {
    reader: Box<dyn RandomAccessReader>,
    ref_count: Mutex<usize>,
    status: watch::Sender<CloseStatus>,
}

impl SharedReader {
    fn acquire(&self) {
        let mut count = self.ref_count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
    }

    fn release(&self) {
        let remaining = {
            let mut count = self.ref_count.lock().unwrap_or_else(|e| e.into_inner());
            if *count == 0 {
                panic!("invalid unref: reader reference count is already zero");
            }
            *count -= 1;
            *count
        };
        if remaining > 0 {
            return;
        }

        debug!("last reader reference released, closing");
        let status = match self.reader.close() {
            Ok(()) => CloseStatus::Closed,
            Err(err) => {
                warn!(error = %err, "failed to close reader");
                CloseStatus::Failed(Arc::new(err))
            }
        };
        self.status.send_replace(status);
    }

    fn count(&self) -> usize {
        *self.ref_count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A counted reference to a shared [`RandomAccessReader`].
///
/// Cloning acquires another reference; dropping releases it. The reader is
/// closed when the count reaches zero.
pub struct ReaderRef {
    shared: Arc<SharedReader>,
}

impl ReaderRef {
    pub fn new(reader: impl RandomAccessReader + 'static) -> Self {
        Self::from_boxed(Box::new(reader))
    }

    pub fn from_boxed(reader: Box<dyn RandomAccessReader>) -> Self {
        let (status, _) = watch::channel(CloseStatus::Open);
        Self {
            shared: Arc::new(SharedReader {
                reader,
                ref_count: Mutex::new(1),
                status,
            }),
        }
    }

    /// Take another reference to the same reader.
    pub fn acquire(&self) -> ReaderRef {
        self.shared.acquire();
        ReaderRef {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live references, this one included.
    pub fn ref_count(&self) -> usize {
        self.shared.count()
    }

    /// Observe the reader's close without keeping it alive.
    pub fn close_watcher(&self) -> CloseWatcher {
        CloseWatcher {
            shared: Arc::downgrade(&self.shared),
            status: self.shared.status.subscribe(),
        }
    }

    pub fn reader(&self) -> &dyn RandomAccessReader {
        self.shared.reader.as_ref()
    }

    /// Fill `buf` from `position`, continuing after short reads.
    ///
    /// Hitting the end of the resource before `buf` is full is an
    /// [`ZipError::UnexpectedEof`].
    pub async fn read_exact_at(&self, buf: &mut [u8], position: u64) -> Result<()> {
        if position.checked_add(buf.len() as u64).is_none() {
            return Err(ZipError::UnexpectedEof {
                expected: buf.len() as u64,
                actual: 0,
            });
        }
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .shared
                .reader
                .read_at(position + filled as u64, &mut buf[filled..])
                .await
                .map_err(ZipError::from)?;
            if n == 0 {
                return Err(ZipError::UnexpectedEof {
                    expected: buf.len() as u64,
                    actual: filled as u64,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Open a stream over `[start, end)` of the reader.
    ///
    /// The returned stream holds its own reference until it reaches the end,
    /// fails, or is dropped, and fails unless exactly `end - start` bytes are
    /// produced. An empty range never touches the reader.
    pub async fn create_read_stream(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        if start == end {
            return Ok(Box::pin(tokio::io::empty()));
        }
        if start > end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid range: start {start} is past end {end}"),
            ));
        }
        trace!(start, end, "opening range stream");
        let guard = self.acquire();
        let raw = self.shared.reader.read_stream_for_range(start, end).await?;
        let counted = RefCounted::new(raw, guard);
        Ok(Box::pin(AssertByteCount::new(counted, end - start)))
    }
}

impl Clone for ReaderRef {
    fn clone(&self) -> Self {
        self.acquire()
    }
}

impl Drop for ReaderRef {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl std::fmt::Debug for ReaderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRef")
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Watches a shared reader without holding a reference to it.
#[derive(Clone)]
pub struct CloseWatcher {
    shared: Weak<SharedReader>,
    status: watch::Receiver<CloseStatus>,
}

impl CloseWatcher {
    pub fn status(&self) -> CloseStatus {
        self.status.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.status.borrow().is_closed()
    }

    /// Live references; zero once the reader has been closed.
    pub fn ref_count(&self) -> usize {
        self.shared.upgrade().map_or(0, |shared| shared.count())
    }

    /// Wait until the reader is closed.
    pub async fn closed(&mut self) -> CloseStatus {
        if let Ok(status) = self.status.wait_for(CloseStatus::is_closed).await {
            return status.clone();
        }
        // sender gone: the reader was dropped, which only happens after close
        self.status.borrow().clone()
    }
}
