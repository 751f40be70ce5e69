//! Open-time and per-stream options.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ZipError};
use crate::zip::{Cp437, Decompressor, Entry, RawDeflate, TextDecoder};

/// Options controlling how an archive is opened and enumerated.
///
/// ```
/// use seekzip::OpenOptions;
///
/// let options = OpenOptions::default().lazy_entries(true).auto_close(false);
/// ```
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) auto_close: bool,
    pub(crate) lazy_entries: bool,
    pub(crate) decode_strings: bool,
    pub(crate) validate_entry_sizes: bool,
    pub(crate) strict_file_names: bool,
    pub(crate) text_decoder: Arc<dyn TextDecoder>,
    pub(crate) decompressor: Arc<dyn Decompressor>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            auto_close: true,
            lazy_entries: false,
            decode_strings: true,
            validate_entry_sizes: true,
            strict_file_names: false,
            text_decoder: Arc::new(Cp437),
            decompressor: Arc::new(RawDeflate),
        }
    }
}

impl OpenOptions {
    /// Release the handle's reference once the last entry has been read or
    /// enumeration fails. Default `true`.
    pub fn auto_close(mut self, value: bool) -> Self {
        self.auto_close = value;
        self
    }

    /// Read entries on demand with [`ZipFile::read_entry`](crate::ZipFile::read_entry)
    /// instead of receiving them as events. Default `false`.
    pub fn lazy_entries(mut self, value: bool) -> Self {
        self.lazy_entries = value;
        self
    }

    /// Decode names and comments to text and validate file names.
    /// With `false` they are kept as raw bytes. Default `true`.
    pub fn decode_strings(mut self, value: bool) -> Self {
        self.decode_strings = value;
        self
    }

    /// Check stored entry sizes at parse time and every stream's output
    /// length against the declared uncompressed size. Default `true`.
    pub fn validate_entry_sizes(mut self, value: bool) -> Self {
        self.validate_entry_sizes = value;
        self
    }

    /// Keep backslashes in file names (and reject them in validation).
    /// Default `false`.
    pub fn strict_file_names(mut self, value: bool) -> Self {
        self.strict_file_names = value;
        self
    }

    /// Decoder for names and comments without the UTF-8 flag.
    pub fn text_decoder(mut self, decoder: impl TextDecoder + 'static) -> Self {
        self.text_decoder = Arc::new(decoder);
        self
    }

    /// Stage used to inflate deflate-compressed entries.
    pub fn decompressor(mut self, decompressor: impl Decompressor + 'static) -> Self {
        self.decompressor = Arc::new(decompressor);
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_entries
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("auto_close", &self.auto_close)
            .field("lazy_entries", &self.lazy_entries)
            .field("decode_strings", &self.decode_strings)
            .field("validate_entry_sizes", &self.validate_entry_sizes)
            .field("strict_file_names", &self.strict_file_names)
            .finish_non_exhaustive()
    }
}

/// Options for a single entry read stream.
///
/// `start` and `end` select a byte range of the entry's stored data and
/// require `decompress(false)` for compressed entries and `decrypt(false)`
/// for encrypted ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStreamOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub decrypt: Option<bool>,
    pub decompress: Option<bool>,
}

impl ReadStreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn range(self, start: u64, end: u64) -> Self {
        self.start(start).end(end)
    }

    /// Only `false` is accepted: the entry's encrypted bytes are returned as is.
    pub fn decrypt(mut self, value: bool) -> Self {
        self.decrypt = Some(value);
        self
    }

    pub fn decompress(mut self, value: bool) -> Self {
        self.decompress = Some(value);
        self
    }

    /// Check the options against `entry` and resolve the relative range
    /// `[start, end)` within its stored data.
    ///
    /// Runs before any I/O.
    pub fn validate(&self, entry: &Entry) -> Result<(u64, u64)> {
        if let Some(decrypt) = self.decrypt {
            if !entry.is_encrypted() {
                return Err(ZipError::InvalidOption(
                    "options.decrypt can only be specified for encrypted entries",
                ));
            }
            if decrypt {
                return Err(ZipError::InvalidOption("invalid options.decrypt value: true"));
            }
            if entry.is_compressed() && self.decompress != Some(false) {
                return Err(ZipError::InvalidOption(
                    "entry is encrypted and compressed, and options.decompress !== false",
                ));
            }
        }
        if self.decompress.is_some() && !entry.is_compressed() {
            return Err(ZipError::InvalidOption(
                "options.decompress can only be specified for compressed entries",
            ));
        }
        if self.start.is_some() || self.end.is_some() {
            if entry.is_compressed() && self.decompress != Some(false) {
                return Err(ZipError::InvalidOption(
                    "start/end range not allowed for compressed entry without options.decompress === false",
                ));
            }
            if entry.is_encrypted() && self.decrypt != Some(false) {
                return Err(ZipError::InvalidOption(
                    "start/end range not allowed for encrypted entry without options.decrypt === false",
                ));
            }
        }

        let start = self.start.unwrap_or(0);
        let end = self.end.unwrap_or(entry.compressed_size);
        if start > entry.compressed_size {
            return Err(ZipError::InvalidOption("options.start > entry.compressedSize"));
        }
        if end > entry.compressed_size {
            return Err(ZipError::InvalidOption("options.end > entry.compressedSize"));
        }
        if end < start {
            return Err(ZipError::InvalidOption("options.end < options.start"));
        }
        Ok((start, end))
    }
}
