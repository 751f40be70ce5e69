//! Error types for archive parsing and entry streaming.
//!
//! Every failure the crate can produce is a [`ZipError`]. Errors raised while
//! a read stream is being consumed travel through [`std::io::Error`] (the
//! currency of `AsyncRead`); converting such an error back into a
//! [`ZipError`] recovers the original variant.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;

/// Broad classification of a [`ZipError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive structure is malformed or uses an unsupported feature.
    Format,
    /// File data would extend past the end of the archive.
    Bounds,
    /// A stream produced a different number of bytes than declared.
    SizeMismatch,
    /// The caller used the API incorrectly.
    Usage,
    /// The backing resource failed.
    Io,
}

#[derive(Debug, Error)]
pub enum ZipError {
    #[error(
        "end of central directory record signature not found. Either not a zip file, or file is truncated."
    )]
    NotAZipFile,

    #[error("invalid {record} signature: 0x{signature:x}")]
    InvalidSignature {
        record: &'static str,
        signature: u32,
    },

    #[error("multi-disk zip files are not supported: found disk number: {0}")]
    MultiDisk(u32),

    #[error("strong encryption is not supported")]
    StrongEncryption,

    #[error("extra field length exceeds extra field buffer size")]
    ExtraFieldOverflow,

    #[error("expected zip64 extended information extra field")]
    MissingZip64ExtraField,

    #[error("zip64 extended information extra field does not include {0}")]
    Zip64FieldMissing(&'static str),

    #[error("invalid characters in fileName: {0}")]
    InvalidFileNameCharacters(String),

    #[error("absolute path: {0}")]
    AbsolutePath(String),

    #[error("invalid relative path: {0}")]
    InvalidRelativePath(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error(
        "file data overflows file bounds: {file_data_start} + {compressed_size} > {file_size}"
    )]
    FileDataOverflow {
        file_data_start: u64,
        compressed_size: u64,
        file_size: u64,
    },

    #[error("{record} offset out of bounds: {offset} (file size {file_size})")]
    OffsetOutOfBounds {
        record: &'static str,
        offset: u64,
        file_size: u64,
    },

    #[error("compressed/uncompressed size mismatch for stored file: {compressed} != {uncompressed}")]
    StoredSizeMismatch { compressed: u64, uncompressed: u64 },

    #[error("too many bytes in the stream. expected {expected}. got at least {actual}")]
    TooManyBytes { expected: u64, actual: u64 },

    #[error("not enough bytes in the stream. expected {expected}. got only {actual}")]
    NotEnoughBytes { expected: u64, actual: u64 },

    #[error("cannot read the next entry while a previous read is still in flight")]
    EntryReadInProgress,

    #[error("read_entry() requires lazy_entries; use events() in eager mode")]
    NotLazy,

    #[error("entry events are only available once, and only in eager mode")]
    EventsUnavailable,

    #[error("entry enumeration already failed")]
    EnumerationFailed,

    #[error("{0}")]
    InvalidOption(&'static str),

    #[error("entry is encrypted, and options.decrypt !== false")]
    Encrypted,

    #[error("closed")]
    Closed,

    #[error("unexpected EOF: wanted {expected} bytes, got {actual}")]
    UnexpectedEof { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(io::Error),
}

impl ZipError {
    pub fn kind(&self) -> ErrorKind {
        use ZipError::*;
        match self {
            NotAZipFile
            | InvalidSignature { .. }
            | MultiDisk(_)
            | StrongEncryption
            | ExtraFieldOverflow
            | MissingZip64ExtraField
            | Zip64FieldMissing(_)
            | InvalidFileNameCharacters(_)
            | AbsolutePath(_)
            | InvalidRelativePath(_)
            | UnsupportedCompression(_) => ErrorKind::Format,
            FileDataOverflow { .. } | OffsetOutOfBounds { .. } => ErrorKind::Bounds,
            StoredSizeMismatch { .. } | TooManyBytes { .. } | NotEnoughBytes { .. } => {
                ErrorKind::SizeMismatch
            }
            EntryReadInProgress
            | NotLazy
            | EventsUnavailable
            | EnumerationFailed
            | InvalidOption(_)
            | Encrypted
            | Closed => ErrorKind::Usage,
            UnexpectedEof { .. } | Io(_) => ErrorKind::Io,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            ZipError::Io(err) => err.kind(),
            ZipError::UnexpectedEof { .. } => io::ErrorKind::UnexpectedEof,
            _ => match self.kind() {
                ErrorKind::Usage => io::ErrorKind::InvalidInput,
                _ => io::ErrorKind::InvalidData,
            },
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            return ZipError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<ZipError>()) {
            Some(Ok(zip)) => *zip,
            Some(Err(other)) => ZipError::Io(io::Error::new(kind, other)),
            None => ZipError::Io(kind.into()),
        }
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(err) => err,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}
