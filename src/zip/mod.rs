//! ZIP archive parsing and entry streaming.
//!
//! ## Architecture
//!
//! - [`structures`]: record layouts, signatures and flag constants
//! - [`parser`]: end of central directory location and local header checks
//! - `entry`: central directory records and their ZIP64 overrides
//! - `archive`: the [`ZipFile`] handle driving enumeration and streams
//! - `decompress`, `stream`: the read stream pipeline
//! - `nested`: archives stored inside archives
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first, then central directory records one at a time,
//! so listing an archive never reads file data. Entry data is only touched
//! when a read stream is opened.
//!
//! ## Limitations
//!
//! - No decryption; encrypted entries can only be read raw
//! - No multi-disk archive support
//! - STORED and DEFLATE only
//! - No CRC-32 verification of entry data

mod archive;
mod decompress;
mod entry;
mod extractor;
mod names;
mod nested;
pub mod parser;
mod stream;
pub mod structures;
mod time;

pub use archive::{EntryEvents, ZipEvent, ZipFile};
pub use decompress::{Decompressor, Inflate, RawDeflate};
pub use entry::{Entry, parse_extra_fields};
pub use extractor::ZipExtractor;
pub use names::{Cp437, TextDecoder, decode_file_name, decode_text, validate_file_name};
pub use nested::EntryReader;
pub use parser::ZipParser;
pub use stream::ReadStream;
pub use structures::{CompressionMethod, ExtraField, LocalFileHeader, ZipText};
pub use time::{dos_date_time_to_naive, extended_mtime};
