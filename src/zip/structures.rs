use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::error::{Result, ZipError};

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x07064b50;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIZE: usize = 30;

/// Extra field header ids understood by the reader.
pub mod extra_id {
    pub const ZIP64: u16 = 0x0001;
    pub const NTFS: u16 = 0x000a;
    pub const EXTENDED_TIMESTAMP: u16 = 0x5455;
    pub const UNICODE_PATH: u16 = 0x7075;
}

/// General purpose bit flags.
pub mod flags {
    pub const ENCRYPTED: u16 = 0x0001;
    pub const DATA_DESCRIPTOR: u16 = 0x0008;
    pub const STRONG_ENCRYPTION: u16 = 0x0040;
    pub const UTF8: u16 = 0x0800;
}

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

fn check_signature(data: &[u8], expected: u32, record: &'static str) -> Result<()> {
    let signature = LittleEndian::read_u32(&data[0..4]);
    if signature != expected {
        return Err(ZipError::InvalidSignature { record, signature });
    }
    Ok(())
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIZE: usize = 22;

    /// Parse the fixed part of the record; `data` must hold at least 22 bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::NotAZipFile);
        }
        check_signature(data, END_OF_CENTRAL_DIRECTORY_SIGNATURE, "end of central directory record")?;

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::NotAZipFile);
        }
        check_signature(data, ZIP64_LOCATOR_SIGNATURE, "zip64 end of central directory locator")?;

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Whether `data` starts with the locator signature.
    pub fn is_present(data: &[u8]) -> bool {
        data.len() >= Self::SIZE && LittleEndian::read_u32(&data[0..4]) == ZIP64_LOCATOR_SIGNATURE
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(ZipError::UnexpectedEof {
                expected: Self::MIN_SIZE as u64,
                actual: data.len() as u64,
            });
        }
        check_signature(data, ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE, "zip64 end of central directory record")?;

        let mut cursor = Cursor::new(&data[4..Self::MIN_SIZE]);
        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// One `{id, data}` record from an extra field block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub id: u16,
    pub data: Vec<u8>,
}

/// Text that is either decoded or kept as the raw bytes from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipText {
    Decoded(String),
    Raw(Vec<u8>),
}

impl ZipText {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ZipText::Decoded(s) => Some(s),
            ZipText::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ZipText::Decoded(s) => s.as_bytes(),
            ZipText::Raw(b) => b,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for ZipText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipText::Decoded(s) => f.write_str(s),
            ZipText::Raw(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// Local File Header as stored in front of each entry's data.
///
/// Sizes here are the raw 32-bit values; the central directory is
/// authoritative for sizes and may differ (data descriptors, ZIP64).
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    /// Absolute offset of the first byte of file data.
    pub file_data_start: u64,
    pub version_needed_to_extract: u16,
    pub general_purpose_bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_file_time: u16,
    pub last_mod_file_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    /// Parse the fixed 30-byte part. `file_data_start`, `file_name` and
    /// `extra_field` are left for the caller to fill in.
    pub fn from_fixed_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LFH_SIZE {
            return Err(ZipError::UnexpectedEof {
                expected: LFH_SIZE as u64,
                actual: data.len() as u64,
            });
        }
        check_signature(data, LOCAL_FILE_HEADER_SIGNATURE, "local file header")?;

        let mut cursor = Cursor::new(&data[4..LFH_SIZE]);
        Ok(Self {
            file_data_start: 0,
            version_needed_to_extract: cursor.read_u16::<LittleEndian>()?,
            general_purpose_bit_flag: cursor.read_u16::<LittleEndian>()?,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_mod_file_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_file_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_name: Vec::new(),
            extra_field: Vec::new(),
        })
    }

    /// Length of the header including its variable-length fields.
    pub fn header_len(&self) -> u64 {
        LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64
    }
}
