//! The archive handle.
//!
//! A [`ZipFile`] is created once the end of central directory record has
//! been resolved. Entries are then read one central directory record at a
//! time, either on demand ([`ZipFile::read_entry`], lazy mode) or by a
//! background task that delivers [`ZipEvent`]s (eager mode, the default).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::entry::Entry;
use super::names::decode_text;
use super::parser::ZipParser;
use super::stream::{ReadStream, StreamPlan};
use super::structures::{CDFH_MIN_SIZE, LocalFileHeader, ZipText};
use crate::error::{Result, ZipError};
use crate::io::{BufferReader, CloseWatcher, FileReader, RandomAccessReader, ReaderRef};
use crate::options::{OpenOptions, ReadStreamOptions};

/// Something that happened while enumerating entries in eager mode.
#[derive(Debug)]
pub enum ZipEvent {
    Entry(Entry),
    /// All entries have been delivered.
    End,
    /// Enumeration failed; nothing follows.
    Error(ZipError),
}

/// Receiver for eager-mode events, see [`ZipFile::events`].
///
/// With `auto_close`, the handle is closed when `End` or `Error` is
/// received, so streams for every delivered entry can still be opened.
pub struct EntryEvents {
    rx: mpsc::Receiver<ZipEvent>,
    inner: Arc<ZipFileInner>,
}

impl EntryEvents {
    /// Next event, or `None` after `End` or `Error` has been delivered.
    pub async fn next(&mut self) -> Option<ZipEvent> {
        let event = self.rx.recv().await?;
        if !matches!(event, ZipEvent::Entry(_)) && self.inner.options.auto_close {
            self.inner.close();
        }
        Some(event)
    }
}

impl std::fmt::Debug for EntryEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryEvents").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumerationState {
    Open,
    Ended,
    Errored,
}

#[derive(Debug)]
struct Cursor {
    read_entry_cursor: u64,
    entries_read: u64,
    state: EnumerationState,
}

struct ZipFileInner {
    reader: Mutex<Option<ReaderRef>>,
    close_watcher: CloseWatcher,
    file_size: u64,
    central_directory_offset: u64,
    entry_count: u64,
    comment: ZipText,
    is_zip64: bool,
    options: OpenOptions,
    cursor: Mutex<Cursor>,
    reading: AtomicBool,
}

/// An open ZIP archive.
///
/// ```no_run
/// use seekzip::{OpenOptions, ReadStreamOptions, ZipFile};
/// use tokio::io::AsyncReadExt;
///
/// # async fn run() -> seekzip::Result<()> {
/// let zip = ZipFile::open("archive.zip", OpenOptions::default().lazy_entries(true)).await?;
/// while let Some(entry) = zip.read_entry().await? {
///     if entry.is_directory() {
///         continue;
///     }
///     let mut stream = zip.open_read_stream(&entry, ReadStreamOptions::new()).await?;
///     let mut data = Vec::new();
///     stream.read_to_end(&mut data).await?;
///     println!("{}: {} bytes", entry.file_name, data.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ZipFile {
    inner: Arc<ZipFileInner>,
    events: Mutex<Option<mpsc::Receiver<ZipEvent>>>,
}

impl ZipFile {
    /// Open an archive on the local filesystem.
    pub async fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let reader = FileReader::new(path.as_ref())?;
        let size = reader.size();
        Self::from_reader(reader, size, options).await
    }

    /// Open an archive held in memory.
    pub async fn from_buffer(data: impl Into<Bytes>, options: OpenOptions) -> Result<Self> {
        let reader = BufferReader::new(data);
        let size = reader.len();
        Self::from_reader(reader, size, options).await
    }

    /// Open an archive over any random-access reader of `total_size` bytes.
    ///
    /// If opening fails the reader is closed before the error is returned.
    pub async fn from_reader(
        reader: impl RandomAccessReader + 'static,
        total_size: u64,
        options: OpenOptions,
    ) -> Result<Self> {
        Self::from_reader_ref(ReaderRef::new(reader), total_size, options).await
    }

    /// Open an archive over an already shared reader, taking over `reader`.
    pub async fn from_reader_ref(reader: ReaderRef, total_size: u64, options: OpenOptions) -> Result<Self> {
        let location = ZipParser::new(&reader, total_size)
            .locate_central_directory()
            .await?;

        let comment = if options.decode_strings {
            // the archive comment is never flagged as UTF-8
            ZipText::Decoded(decode_text(&location.comment, false, options.text_decoder.as_ref()))
        } else {
            ZipText::Raw(location.comment)
        };
        debug!(
            entries = location.entry_count,
            zip64 = location.is_zip64,
            size = total_size,
            "opened archive"
        );

        let inner = Arc::new(ZipFileInner {
            close_watcher: reader.close_watcher(),
            reader: Mutex::new(Some(reader)),
            file_size: total_size,
            central_directory_offset: location.central_directory_offset,
            entry_count: location.entry_count,
            comment,
            is_zip64: location.is_zip64,
            cursor: Mutex::new(Cursor {
                read_entry_cursor: location.central_directory_offset,
                entries_read: 0,
                state: EnumerationState::Open,
            }),
            reading: AtomicBool::new(false),
            options,
        });

        let events = if inner.options.lazy_entries {
            None
        } else {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(emit_entries(Arc::clone(&inner), tx));
            Some(rx)
        };

        Ok(Self {
            inner,
            events: Mutex::new(events),
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count
    }

    /// Entries delivered so far.
    pub fn entries_read(&self) -> u64 {
        self.inner.lock_cursor().entries_read
    }

    pub fn comment(&self) -> &ZipText {
        &self.inner.comment
    }

    pub fn file_size(&self) -> u64 {
        self.inner.file_size
    }

    pub fn central_directory_offset(&self) -> u64 {
        self.inner.central_directory_offset
    }

    pub fn is_zip64(&self) -> bool {
        self.inner.is_zip64
    }

    pub fn options(&self) -> &OpenOptions {
        &self.inner.options
    }

    /// Whether this handle still holds its reader reference.
    pub fn is_open(&self) -> bool {
        self.inner.lock_reader().is_some()
    }

    /// Read the next central directory record (lazy mode only).
    ///
    /// Returns `Ok(None)` once every entry has been read. Only one read may
    /// be in flight at a time; after an error every further call fails with
    /// [`ZipError::EnumerationFailed`].
    pub async fn read_entry(&self) -> Result<Option<Entry>> {
        if !self.inner.options.lazy_entries {
            return Err(ZipError::NotLazy);
        }
        if self.inner.reading.swap(true, Ordering::AcqRel) {
            return Err(ZipError::EntryReadInProgress);
        }
        let _reading = ReadingGuard(&self.inner.reading);
        self.inner.next_entry(self.inner.options.auto_close).await
    }

    /// Take the eager-mode event receiver.
    ///
    /// Available once per handle, and never in lazy mode.
    pub fn events(&self) -> Result<EntryEvents> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|rx| EntryEvents {
                rx,
                inner: Arc::clone(&self.inner),
            })
            .ok_or(ZipError::EventsUnavailable)
    }

    /// Collect every remaining entry, in either mode.
    pub async fn read_all_entries(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        if self.inner.options.lazy_entries {
            while let Some(entry) = self.read_entry().await? {
                entries.push(entry);
            }
            return Ok(entries);
        }

        let mut events = self.events()?;
        while let Some(event) = events.next().await {
            match event {
                ZipEvent::Entry(entry) => entries.push(entry),
                ZipEvent::End => break,
                ZipEvent::Error(err) => return Err(err),
            }
        }
        Ok(entries)
    }

    /// Open a stream over an entry's data.
    ///
    /// Options are checked before any I/O. The stream decompresses deflate
    /// entries unless `decompress(false)` is given and, with
    /// `validate_entry_sizes`, fails unless the output length matches the
    /// entry's uncompressed size.
    pub async fn open_read_stream(&self, entry: &Entry, options: ReadStreamOptions) -> Result<ReadStream> {
        let (relative_start, relative_end) = options.validate(entry)?;
        let reader = self.inner.acquire_reader()?;

        if entry.is_encrypted() && options.decrypt != Some(false) {
            return Err(ZipError::Encrypted);
        }
        let decompress = match entry.compression_method {
            0 => false,
            8 => options.decompress != Some(false),
            method => return Err(ZipError::UnsupportedCompression(method)),
        };

        let file_data_start = self.inner.local_file_data_start(&reader, entry).await?;
        trace!(
            name = %entry.file_name,
            file_data_start,
            relative_start,
            relative_end,
            decompress,
            "opening entry stream"
        );
        self.open_read_stream_low_level(
            file_data_start,
            relative_start,
            relative_end,
            decompress,
            entry.uncompressed_size,
        )
        .await
    }

    /// Build a read stream from already validated parameters.
    ///
    /// `[file_data_start + relative_start, file_data_start + relative_end)`
    /// is read and, with `decompress`, inflated and checked against
    /// `uncompressed_size` when size validation is on.
    pub async fn open_read_stream_low_level(
        &self,
        file_data_start: u64,
        relative_start: u64,
        relative_end: u64,
        decompress: bool,
        uncompressed_size: u64,
    ) -> Result<ReadStream> {
        let reader = self.inner.acquire_reader()?;
        let options = &self.inner.options;
        let plan = StreamPlan {
            file_data_start,
            relative_start,
            relative_end,
            decompressor: decompress.then(|| options.decompressor.as_ref()),
            uncompressed_size: options.validate_entry_sizes.then_some(uncompressed_size),
        };
        Ok(plan.open(&reader).await?)
    }

    /// Read an entry's full local file header, name and extra field included.
    pub async fn read_local_file_header(&self, entry: &Entry) -> Result<LocalFileHeader> {
        let reader = self.inner.acquire_reader()?;
        ZipParser::new(&reader, self.inner.file_size)
            .read_local_file_header(entry, true)
            .await
    }

    /// Absolute offset of an entry's stored data.
    pub async fn local_file_data_start(&self, entry: &Entry) -> Result<u64> {
        let reader = self.inner.acquire_reader()?;
        self.inner.local_file_data_start(&reader, entry).await
    }

    /// Another reference to the backing reader.
    pub fn reader(&self) -> Result<ReaderRef> {
        self.inner.acquire_reader()
    }

    /// Observe when the backing reader is finally closed.
    ///
    /// That happens once this handle is closed and every stream opened from
    /// it has finished.
    pub fn close_watcher(&self) -> CloseWatcher {
        self.inner.close_watcher.clone()
    }

    /// Release this handle's reader reference.
    ///
    /// Streams already opened keep working. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for ZipFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipFile")
            .field("file_size", &self.inner.file_size)
            .field("entry_count", &self.inner.entry_count)
            .field("entries_read", &self.entries_read())
            .field("is_open", &self.is_open())
            .finish()
    }
}

struct ReadingGuard<'a>(&'a AtomicBool);

impl Drop for ReadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn emit_entries(inner: Arc<ZipFileInner>, tx: mpsc::Sender<ZipEvent>) {
    loop {
        match inner.next_entry(false).await {
            Ok(Some(entry)) => {
                if tx.send(ZipEvent::Entry(entry)).await.is_err() {
                    trace!("event receiver dropped, stopping enumeration");
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(ZipEvent::End).await;
                return;
            }
            Err(err) => {
                let _ = tx.send(ZipEvent::Error(err)).await;
                return;
            }
        }
    }
}

impl ZipFileInner {
    fn lock_reader(&self) -> std::sync::MutexGuard<'_, Option<ReaderRef>> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn acquire_reader(&self) -> Result<ReaderRef> {
        self.lock_reader().as_ref().map(ReaderRef::acquire).ok_or(ZipError::Closed)
    }

    fn close(&self) {
        let released = self.lock_reader().take();
        if released.is_some() {
            debug!("archive handle closed");
        }
    }

    /// Advance the enumeration by one record, closing on end or error when
    /// `close_when_done` is set.
    async fn next_entry(&self, close_when_done: bool) -> Result<Option<Entry>> {
        let (offset, index) = {
            let cursor = self.lock_cursor();
            match cursor.state {
                EnumerationState::Errored => return Err(ZipError::EnumerationFailed),
                EnumerationState::Ended => return Ok(None),
                EnumerationState::Open => {}
            }
            (cursor.read_entry_cursor, cursor.entries_read)
        };

        if index == self.entry_count {
            self.lock_cursor().state = EnumerationState::Ended;
            debug!(entries = index, "reached end of central directory");
            if close_when_done {
                self.close();
            }
            return Ok(None);
        }

        let parsed = match self.acquire_reader() {
            Ok(reader) => self.parse_entry(&reader, offset).await,
            Err(err) => Err(err),
        };
        match parsed {
            Ok(entry) => {
                let mut cursor = self.lock_cursor();
                cursor.read_entry_cursor = cursor.read_entry_cursor.saturating_add(entry.record_len());
                cursor.entries_read += 1;
                Ok(Some(entry))
            }
            Err(err) => {
                self.lock_cursor().state = EnumerationState::Errored;
                debug!(error = %err, entry = index, "entry enumeration failed");
                if close_when_done {
                    self.close();
                }
                Err(err)
            }
        }
    }

    async fn parse_entry(&self, reader: &ReaderRef, offset: u64) -> Result<Entry> {
        let mut fixed = [0u8; CDFH_MIN_SIZE];
        reader.read_exact_at(&mut fixed, offset).await?;
        let mut entry = Entry::from_fixed_bytes(&fixed)?;

        let mut variable = vec![0u8; entry.variable_len()];
        reader
            .read_exact_at(&mut variable, offset.saturating_add(CDFH_MIN_SIZE as u64))
            .await?;
        entry.read_variable_fields(&variable, &self.options)?;
        trace!(
            name = %entry.file_name,
            method = entry.compression_method,
            compressed = entry.compressed_size,
            uncompressed = entry.uncompressed_size,
            "read central directory record"
        );
        Ok(entry)
    }

    async fn local_file_data_start(&self, reader: &ReaderRef, entry: &Entry) -> Result<u64> {
        let header = ZipParser::new(reader, self.file_size)
            .read_local_file_header(entry, false)
            .await?;
        Ok(header.file_data_start)
    }
}
