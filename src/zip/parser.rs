//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source behind a [`ReaderRef`].
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If a ZIP64 locator precedes it, read the ZIP64 EOCD for 64-bit values
//! 3. Read Central Directory records one at a time (see [`ZipFile`](crate::ZipFile))
//! 4. For extraction, read each file's Local File Header to find its data

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use super::entry::Entry;
use super::structures::*;
use crate::error::{Result, ZipError};
use crate::io::ReaderRef;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 0xffff;

/// Where the central directory lives, as declared by the EOCD records.
#[derive(Debug, Clone)]
pub struct CentralDirectoryLocation {
    pub central_directory_offset: u64,
    pub entry_count: u64,
    /// Raw archive comment bytes.
    pub comment: Vec<u8>,
    pub is_zip64: bool,
    /// Absolute offset of the (legacy) EOCD record.
    pub eocd_offset: u64,
}

/// Search `buf` backwards for an EOCD record that ends exactly at the end
/// of the buffer.
///
/// A signature whose comment length does not account for the remaining bytes
/// is a false positive and the search continues. The match closest to the
/// end wins, even if the comment itself contains a well-formed record.
pub fn find_eocd(buf: &[u8]) -> Option<usize> {
    if buf.len() < EndOfCentralDirectory::SIZE {
        return None;
    }
    (0..=buf.len() - EndOfCentralDirectory::SIZE).rev().find(|&i| {
        LittleEndian::read_u32(&buf[i..]) == END_OF_CENTRAL_DIRECTORY_SIGNATURE
            && LittleEndian::read_u16(&buf[i + 20..]) as usize
                == buf.len() - i - EndOfCentralDirectory::SIZE
    })
}

/// Low-level ZIP file parser.
///
/// Reads archive-level structures through a shared reader reference; it is
/// cheap to construct and holds no state beyond the archive size.
pub struct ZipParser<'a> {
    /// The underlying data source
    reader: &'a ReaderRef,
    /// Total size of the archive in bytes
    size: u64,
}

impl<'a> ZipParser<'a> {
    pub fn new(reader: &'a ReaderRef, size: u64) -> Self {
        Self { reader, size }
    }

    /// Find the EOCD record and resolve ZIP64 overrides.
    ///
    /// # Errors
    ///
    /// [`ZipError::NotAZipFile`] if no record is found in the last
    /// `22 + 20 + 65535` bytes; [`ZipError::MultiDisk`] for split archives;
    /// [`ZipError::OffsetOutOfBounds`] if a declared offset lies past the end.
    pub async fn locate_central_directory(&self) -> Result<CentralDirectoryLocation> {
        let search_size = (EndOfCentralDirectory::SIZE as u64 + Zip64EOCDLocator::SIZE as u64 + MAX_COMMENT_SIZE)
            .min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(&mut buf, search_start).await?;

        let i = find_eocd(&buf).ok_or(ZipError::NotAZipFile)?;
        let eocd_offset = search_start + i as u64;
        debug!(eocd_offset, "found end of central directory record");

        let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
        let comment = buf[i + EndOfCentralDirectory::SIZE..].to_vec();

        if i >= Zip64EOCDLocator::SIZE && Zip64EOCDLocator::is_present(&buf[i - Zip64EOCDLocator::SIZE..i]) {
            let locator = Zip64EOCDLocator::from_bytes(&buf[i - Zip64EOCDLocator::SIZE..i])?;
            self.check_bounds(
                "zip64 end of central directory",
                locator.eocd64_offset,
                Zip64EOCD::MIN_SIZE as u64,
            )?;
            let eocd64 = self.read_zip64_eocd(locator.eocd64_offset).await?;
            // the legacy disk number may be a placeholder, so only the zip64 one counts
            if eocd64.disk_number != 0 {
                return Err(ZipError::MultiDisk(eocd64.disk_number));
            }
            self.check_bounds("central directory", eocd64.cd_offset, 0)?;
            debug!(
                entries = eocd64.total_entries,
                cd_offset = eocd64.cd_offset,
                "using zip64 end of central directory record"
            );
            return Ok(CentralDirectoryLocation {
                central_directory_offset: eocd64.cd_offset,
                entry_count: eocd64.total_entries,
                comment,
                is_zip64: true,
                eocd_offset,
            });
        }

        if eocd.disk_number != 0 {
            return Err(ZipError::MultiDisk(eocd.disk_number as u32));
        }
        self.check_bounds("central directory", eocd.cd_offset as u64, 0)?;
        debug!(entries = eocd.total_entries, cd_offset = eocd.cd_offset, "central directory located");
        Ok(CentralDirectoryLocation {
            central_directory_offset: eocd.cd_offset as u64,
            entry_count: eocd.total_entries as u64,
            comment,
            is_zip64: false,
            eocd_offset,
        })
    }

    /// Fail unless `len` bytes at `offset` lie inside the archive.
    fn check_bounds(&self, record: &'static str, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ZipError::OffsetOutOfBounds {
                record,
                offset,
                file_size: self.size,
            }),
        }
    }

    /// Read the ZIP64 End of Central Directory record at `offset`.
    pub async fn read_zip64_eocd(&self, offset: u64) -> Result<Zip64EOCD> {
        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.reader.read_exact_at(&mut eocd64_buf, offset).await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Read and check the local header in front of `entry`'s data.
    ///
    /// With `full` unset only `file_data_start` is meaningful in the result;
    /// the variable-length name and extra field are not read.
    ///
    /// # Errors
    ///
    /// [`ZipError::InvalidSignature`] for a bad header and
    /// [`ZipError::FileDataOverflow`] if the data would run past the archive.
    pub async fn read_local_file_header(&self, entry: &Entry, full: bool) -> Result<LocalFileHeader> {
        let mut lfh_buf = [0u8; LFH_SIZE];
        self.reader
            .read_exact_at(&mut lfh_buf, entry.relative_offset_of_local_header)
            .await?;

        let mut header = LocalFileHeader::from_fixed_bytes(&lfh_buf)?;
        let file_data_start = entry.relative_offset_of_local_header + header.header_len();
        let overflow = ZipError::FileDataOverflow {
            file_data_start,
            compressed_size: entry.compressed_size,
            file_size: self.size,
        };
        match file_data_start.checked_add(entry.compressed_size) {
            Some(end) if end <= self.size => {}
            _ => return Err(overflow),
        }
        header.file_data_start = file_data_start;

        if full {
            let name_len = header.file_name_length as usize;
            let mut variable = vec![0u8; name_len + header.extra_field_length as usize];
            self.reader
                .read_exact_at(&mut variable, entry.relative_offset_of_local_header + LFH_SIZE as u64)
                .await?;
            header.extra_field = variable.split_off(name_len);
            header.file_name = variable;
        }
        Ok(header)
    }
}
