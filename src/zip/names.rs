//! Decoding and validation of entry names and comments.
//!
//! Names are UTF-8 when general purpose bit 11 is set and IBM code page 437
//! otherwise, unless an Info-ZIP Unicode Path extra field (`0x7075`) carries
//! a UTF-8 name whose CRC-32 matches the stored name bytes.

use byteorder::{ByteOrder, LittleEndian};

use super::structures::{ExtraField, extra_id};
use crate::error::{Result, ZipError};

/// Decoder for names and comments stored in the legacy 8-bit code page.
pub trait TextDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> String;
}

impl<F> TextDecoder for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> String {
        self(bytes)
    }
}

/// IBM PC code page 437, the ZIP format's default encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cp437;

impl TextDecoder for Cp437 {
    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| cp437_char(b)).collect()
    }
}

const CP437_LOW: [char; 32] = [
    '\0', '☺', '☻', '♥', '♦', '♣', '♠', '•', '◘', '○', '◙', '♂', '♀', '♪', '♫', '☼', //
    '►', '◄', '↕', '‼', '¶', '§', '▬', '↨', '↑', '↓', '→', '←', '∟', '↔', '▲', '▼',
];

// 0x7f through 0xff
const CP437_HIGH: [char; 129] = [
    '⌂', //
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

fn cp437_char(b: u8) -> char {
    match b {
        0x00..=0x1f => CP437_LOW[b as usize],
        0x20..=0x7e => b as char,
        _ => CP437_HIGH[(b - 0x7f) as usize],
    }
}

/// Decode bytes as UTF-8 (lossy) or with the legacy decoder.
pub fn decode_text(bytes: &[u8], is_utf8: bool, legacy: &dyn TextDecoder) -> String {
    if is_utf8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        legacy.decode(bytes)
    }
}

/// UTF-8 name from a well-formed Info-ZIP Unicode Path field matching `raw_name`.
fn unicode_path_name(raw_name: &[u8], extra_fields: &[ExtraField]) -> Option<String> {
    let expected_crc = crc32fast::hash(raw_name);
    extra_fields
        .iter()
        .filter(|field| field.id == extra_id::UNICODE_PATH)
        .find(|field| {
            let data = &field.data;
            // version 1 byte, name crc 4 bytes, then the name
            data.len() >= 6 && data[0] == 1 && LittleEndian::read_u32(&data[1..5]) == expected_crc
        })
        .map(|field| String::from_utf8_lossy(&field.data[5..]).into_owned())
}

/// Resolve an entry's file name.
///
/// Backslashes become forward slashes unless `strict_file_names` is set.
pub fn decode_file_name(
    general_purpose_bit_flag: u16,
    raw_name: &[u8],
    extra_fields: &[ExtraField],
    strict_file_names: bool,
    legacy: &dyn TextDecoder,
) -> String {
    let name = unicode_path_name(raw_name, extra_fields).unwrap_or_else(|| {
        let is_utf8 = general_purpose_bit_flag & super::structures::flags::UTF8 != 0;
        decode_text(raw_name, is_utf8, legacy)
    });
    if strict_file_names {
        name
    } else {
        name.replace('\\', "/")
    }
}

/// Reject names that could escape an extraction directory.
pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.contains('\\') {
        return Err(ZipError::InvalidFileNameCharacters(file_name.to_string()));
    }
    let bytes = file_name.as_bytes();
    let drive_letter = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if drive_letter || file_name.starts_with('/') {
        return Err(ZipError::AbsolutePath(file_name.to_string()));
    }
    if file_name.split('/').any(|segment| segment == "..") {
        return Err(ZipError::InvalidRelativePath(file_name.to_string()));
    }
    Ok(())
}
