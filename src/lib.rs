//! # seekzip
//!
//! Random-access ZIP reading over async byte sources.
//!
//! An archive is opened from its end: the end of central directory record
//! locates the central directory, whose records are read one at a time as
//! [`Entry`] values. Entry data is streamed on request through a
//! [`ReadStream`], inflated and length-checked on the way. Nothing is
//! buffered whole, so the same code serves local files, memory buffers,
//! HTTP servers answering `Range` requests, and archives nested in other
//! archives.
//!
//! ## Features
//!
//! - ZIP64 archives and entries
//! - STORED and DEFLATE entries, or raw access to any entry's stored bytes
//! - Byte ranges of stored data
//! - Lazy (pull) or eager (event) enumeration
//! - CP437 / UTF-8 / Info-ZIP Unicode Path name decoding and path validation
//!
//! ## Example
//!
//! ```no_run
//! use seekzip::{OpenOptions, ZipEvent, ZipFile};
//!
//! #[tokio::main]
//! async fn main() -> seekzip::Result<()> {
//!     let zip = ZipFile::open("archive.zip", OpenOptions::default()).await?;
//!     let mut events = zip.events()?;
//!     while let Some(event) = events.next().await {
//!         match event {
//!             ZipEvent::Entry(entry) => println!("{}", entry.file_name),
//!             ZipEvent::End => break,
//!             ZipEvent::Error(err) => return Err(err),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod options;
pub mod zip;

pub use cli::Cli;
pub use error::{ErrorKind, Result, ZipError};
pub use io::{BufferReader, FileReader, HttpRangeReader, RandomAccessReader, ReaderRef};
pub use options::{OpenOptions, ReadStreamOptions};
pub use zip::{Entry, EntryEvents, ReadStream, ZipEvent, ZipExtractor, ZipFile};
