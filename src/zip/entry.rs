//! Central directory records.
//!
//! A record is read in two steps: the fixed 46-byte header, then one buffer
//! holding the file name, extra field and comment. See
//! [`ZipFile::read_entry`](crate::ZipFile::read_entry) for the I/O side.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io::Cursor;

use super::names::{decode_file_name, decode_text, validate_file_name};
use super::structures::*;
use super::time::{dos_date_time_to_naive, extended_mtime};
use crate::error::{Result, ZipError};
use crate::options::OpenOptions;

const U32_PLACEHOLDER: u64 = 0xffff_ffff;
const U16_PLACEHOLDER: u32 = 0xffff;

/// Parsed ZIP file entry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u32,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub relative_offset_of_local_header: u64,
    pub file_name: ZipText,
    pub file_name_raw: Vec<u8>,
    pub extra_fields: Vec<ExtraField>,
    pub file_comment: ZipText,
}

impl Entry {
    /// Parse the fixed part of a central directory record.
    ///
    /// Variable-length fields are empty until
    /// [`read_variable_fields`](Self::read_variable_fields) runs.
    pub fn from_fixed_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < CDFH_MIN_SIZE {
            return Err(ZipError::UnexpectedEof {
                expected: CDFH_MIN_SIZE as u64,
                actual: data.len() as u64,
            });
        }
        let signature = LittleEndian::read_u32(&data[0..4]);
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ZipError::InvalidSignature {
                record: "central directory file header",
                signature,
            });
        }

        let mut cursor = Cursor::new(&data[4..CDFH_MIN_SIZE]);
        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed_to_extract = cursor.read_u16::<LittleEndian>()?;
        let general_purpose_bit_flag = cursor.read_u16::<LittleEndian>()?;
        if general_purpose_bit_flag & flags::STRONG_ENCRYPTION != 0 {
            return Err(ZipError::StrongEncryption);
        }

        Ok(Self {
            version_made_by,
            version_needed_to_extract,
            general_purpose_bit_flag,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_mod_file_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_file_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()? as u64,
            uncompressed_size: cursor.read_u32::<LittleEndian>()? as u64,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()? as u32,
            internal_file_attributes: cursor.read_u16::<LittleEndian>()?,
            external_file_attributes: cursor.read_u32::<LittleEndian>()?,
            relative_offset_of_local_header: cursor.read_u32::<LittleEndian>()? as u64,
            file_name: ZipText::Raw(Vec::new()),
            file_name_raw: Vec::new(),
            extra_fields: Vec::new(),
            file_comment: ZipText::Raw(Vec::new()),
        })
    }

    /// Bytes of name, extra field and comment following the fixed header.
    pub fn variable_len(&self) -> usize {
        self.file_name_length as usize + self.extra_field_length as usize + self.file_comment_length as usize
    }

    /// Total length of this record in the central directory.
    pub fn record_len(&self) -> u64 {
        (CDFH_MIN_SIZE + self.variable_len()) as u64
    }

    /// Complete the entry from the bytes following the fixed header.
    pub fn read_variable_fields(&mut self, buf: &[u8], options: &OpenOptions) -> Result<()> {
        if buf.len() < self.variable_len() {
            return Err(ZipError::UnexpectedEof {
                expected: self.variable_len() as u64,
                actual: buf.len() as u64,
            });
        }
        let name_end = self.file_name_length as usize;
        let extra_end = name_end + self.extra_field_length as usize;
        let comment_end = extra_end + self.file_comment_length as usize;

        self.file_name_raw = buf[..name_end].to_vec();
        self.extra_fields = parse_extra_fields(&buf[name_end..extra_end])?;
        self.apply_zip64_extra_field()?;

        let comment = &buf[extra_end..comment_end];
        if options.decode_strings {
            let decoder = options.text_decoder.as_ref();
            self.file_comment = ZipText::Decoded(decode_text(comment, self.is_utf8(), decoder));
            let name = decode_file_name(
                self.general_purpose_bit_flag,
                &self.file_name_raw,
                &self.extra_fields,
                options.strict_file_names,
                decoder,
            );
            validate_file_name(&name)?;
            self.file_name = ZipText::Decoded(name);
        } else {
            self.file_comment = ZipText::Raw(comment.to_vec());
            self.file_name = ZipText::Raw(self.file_name_raw.clone());
        }

        if options.validate_entry_sizes && self.compression_method == 0 {
            let mut expected = self.uncompressed_size;
            if self.is_encrypted() {
                // traditional encryption prefixes the data with a 12-byte header
                expected += 12;
            }
            if self.compressed_size != expected {
                return Err(ZipError::StoredSizeMismatch {
                    compressed: self.compressed_size,
                    uncompressed: self.uncompressed_size,
                });
            }
        }
        Ok(())
    }

    /// Replace placeholder sizes and offsets with their ZIP64 values.
    ///
    /// Only fields holding a placeholder are present in the extra field, in
    /// the order uncompressed size, compressed size, local header offset,
    /// disk start number.
    fn apply_zip64_extra_field(&mut self) -> Result<()> {
        let needs_zip64 = self.uncompressed_size == U32_PLACEHOLDER
            || self.compressed_size == U32_PLACEHOLDER
            || self.relative_offset_of_local_header == U32_PLACEHOLDER
            || self.disk_number_start == U16_PLACEHOLDER;
        if !needs_zip64 {
            return Ok(());
        }

        let data = self
            .extra_fields
            .iter()
            .find(|field| field.id == extra_id::ZIP64)
            .map(|field| field.data.as_slice())
            .ok_or(ZipError::MissingZip64ExtraField)?;

        let mut index = 0;

        if self.uncompressed_size == U32_PLACEHOLDER {
            self.uncompressed_size = LittleEndian::read_u64(zip64_field(data, &mut index, 8, "uncompressed size")?);
        }
        if self.compressed_size == U32_PLACEHOLDER {
            self.compressed_size = LittleEndian::read_u64(zip64_field(data, &mut index, 8, "compressed size")?);
        }
        if self.relative_offset_of_local_header == U32_PLACEHOLDER {
            self.relative_offset_of_local_header =
                LittleEndian::read_u64(zip64_field(data, &mut index, 8, "relative header offset")?);
        }
        if self.disk_number_start == U16_PLACEHOLDER {
            self.disk_number_start = LittleEndian::read_u32(zip64_field(data, &mut index, 4, "disk start number")?);
        }
        Ok(())
    }

    pub fn compression(&self) -> CompressionMethod {
        CompressionMethod::from_u16(self.compression_method)
    }

    pub fn is_encrypted(&self) -> bool {
        self.general_purpose_bit_flag & flags::ENCRYPTED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_method == 8
    }

    /// Sizes and CRC follow the data in a data descriptor.
    pub fn uses_data_descriptor(&self) -> bool {
        self.general_purpose_bit_flag & flags::DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8(&self) -> bool {
        self.general_purpose_bit_flag & flags::UTF8 != 0
    }

    /// Directory entries end with '/'
    pub fn is_directory(&self) -> bool {
        self.file_name.as_bytes().ends_with(b"/")
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_file_date & 0x1F) as u8;
        let month = ((self.last_mod_file_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_file_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_file_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_file_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_file_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// DOS date and time as a calendar value, in the writer's local time.
    pub fn dos_date_time(&self) -> Option<NaiveDateTime> {
        dos_date_time_to_naive(self.last_mod_file_date, self.last_mod_file_time)
    }

    /// Last modification time.
    ///
    /// Prefers the first usable extended timestamp extra field and falls
    /// back to the DOS fields interpreted as UTC.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        extended_mtime(&self.extra_fields).or_else(|| self.dos_date_time().map(|dt| dt.and_utc()))
    }
}

fn zip64_field<'a>(data: &'a [u8], index: &mut usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    if *index + len > data.len() {
        return Err(ZipError::Zip64FieldMissing(what));
    }
    let field = &data[*index..*index + len];
    *index += len;
    Ok(field)
}

/// Split an extra field block into `{id, data}` records.
///
/// Trailing bytes too short to hold a record header are ignored; a record
/// whose declared size runs past the block is an error.
pub fn parse_extra_fields(buf: &[u8]) -> Result<Vec<ExtraField>> {
    let mut fields = Vec::new();
    let mut i = 0;
    while i + 4 <= buf.len() {
        let id = LittleEndian::read_u16(&buf[i..]);
        let size = LittleEndian::read_u16(&buf[i + 2..]) as usize;
        let data_start = i + 4;
        let data_end = data_start + size;
        if data_end > buf.len() {
            return Err(ZipError::ExtraFieldOverflow);
        }
        fields.push(ExtraField {
            id,
            data: buf[data_start..data_end].to_vec(),
        });
        i = data_end;
    }
    Ok(fields)
}
