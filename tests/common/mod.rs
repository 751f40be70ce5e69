//! Helpers shared by the integration tests: an archive writer and a
//! reader that records how it is used.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use seekzip::io::RangeStream;
use seekzip::{BufferReader, RandomAccessReader};

/// 2017-04-21 17:35:20
pub const DOS_DATE: u16 = ((2017 - 1980) << 9) | (4 << 5) | 21;
pub const DOS_TIME: u16 = (17 << 11) | (35 << 5) | 10;

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One entry to be written by [`ZipBuilder`].
#[derive(Clone)]
pub struct EntrySpec {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub method: u16,
    pub flags: u16,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    /// Stored bytes, when they should differ from what `method` produces.
    pub payload: Option<Vec<u8>>,
    pub declared_compressed: Option<u32>,
    pub declared_uncompressed: Option<u32>,
    /// Put both sizes in a ZIP64 extra field behind placeholders.
    pub zip64_sizes: bool,
}

impl EntrySpec {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            method: 0,
            flags: 0,
            extra: Vec::new(),
            comment: Vec::new(),
            payload: None,
            declared_compressed: None,
            declared_uncompressed: None,
            zip64_sizes: false,
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            method: 8,
            ..Self::stored(name, data)
        }
    }

    pub fn raw_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn method(mut self, method: u16) -> Self {
        self.method = method;
        self
    }

    pub fn extra(mut self, id: u16, data: &[u8]) -> Self {
        self.extra.extend_from_slice(&id.to_le_bytes());
        self.extra.extend_from_slice(&(data.len() as u16).to_le_bytes());
        self.extra.extend_from_slice(data);
        self
    }

    pub fn raw_extra(mut self, bytes: &[u8]) -> Self {
        self.extra.extend_from_slice(bytes);
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = Some(payload.to_vec());
        self
    }

    pub fn declared_sizes(mut self, compressed: u32, uncompressed: u32) -> Self {
        self.declared_compressed = Some(compressed);
        self.declared_uncompressed = Some(uncompressed);
        self
    }

    pub fn zip64_sizes(mut self) -> Self {
        self.zip64_sizes = true;
        self
    }

    fn stored_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Some(payload) => payload.clone(),
            None if self.method == 8 => deflate(&self.data),
            None => self.data.clone(),
        }
    }
}

/// Writes small archives in memory.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<EntrySpec>,
    comment: Vec<u8>,
    zip64_eocd: bool,
    prefix: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: EntrySpec) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::stored(name, data))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::deflated(name, data))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// End the archive with ZIP64 end of central directory records.
    pub fn zip64_eocd(mut self) -> Self {
        self.zip64_eocd = true;
        self
    }

    /// Bytes written before the first local header.
    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.prefix.clone();
        let mut central = Vec::new();

        for item in &self.entries {
            let offset = out.len() as u32;
            let payload = item.stored_bytes();
            let crc = crc32fast::hash(&item.data);
            let (compressed, uncompressed, extra) = if item.zip64_sizes {
                let mut zip64 = Vec::new();
                zip64.extend_from_slice(&(item.data.len() as u64).to_le_bytes());
                zip64.extend_from_slice(&(payload.len() as u64).to_le_bytes());
                let mut extra = 0x0001u16.to_le_bytes().to_vec();
                extra.extend_from_slice(&(zip64.len() as u16).to_le_bytes());
                extra.extend_from_slice(&zip64);
                extra.extend_from_slice(&item.extra);
                (0xffff_ffff, 0xffff_ffff, extra)
            } else {
                (
                    item.declared_compressed.unwrap_or(payload.len() as u32),
                    item.declared_uncompressed.unwrap_or(item.data.len() as u32),
                    item.extra.clone(),
                )
            };

            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&item.flags.to_le_bytes());
            out.extend_from_slice(&item.method.to_le_bytes());
            out.extend_from_slice(&DOS_TIME.to_le_bytes());
            out.extend_from_slice(&DOS_DATE.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&compressed.to_le_bytes());
            out.extend_from_slice(&uncompressed.to_le_bytes());
            out.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
            out.extend_from_slice(&item.name);
            out.extend_from_slice(&extra);
            out.extend_from_slice(&payload);

            central.extend_from_slice(&0x02014b50u32.to_le_bytes());
            central.extend_from_slice(&0x031eu16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&item.flags.to_le_bytes());
            central.extend_from_slice(&item.method.to_le_bytes());
            central.extend_from_slice(&DOS_TIME.to_le_bytes());
            central.extend_from_slice(&DOS_DATE.to_le_bytes());
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&compressed.to_le_bytes());
            central.extend_from_slice(&uncompressed.to_le_bytes());
            central.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&(extra.len() as u16).to_le_bytes());
            central.extend_from_slice(&(item.comment.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&(0o100644u32 << 16).to_le_bytes());
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(&item.name);
            central.extend_from_slice(&extra);
            central.extend_from_slice(&item.comment);
        }

        let cd_offset = out.len() as u64;
        let cd_size = central.len() as u64;
        let count = self.entries.len() as u64;
        out.extend_from_slice(&central);

        if self.zip64_eocd {
            let eocd64_offset = out.len() as u64;
            out.extend_from_slice(&0x06064b50u32.to_le_bytes());
            out.extend_from_slice(&44u64.to_le_bytes());
            out.extend_from_slice(&0x031eu16.to_le_bytes());
            out.extend_from_slice(&45u16.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&cd_size.to_le_bytes());
            out.extend_from_slice(&cd_offset.to_le_bytes());

            out.extend_from_slice(&0x07064b50u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&eocd64_offset.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());

            eocd(&mut out, 0xffff, 0xffff_ffff, 0xffff_ffff, &self.comment);
        } else {
            eocd(&mut out, count as u16, cd_size as u32, cd_offset as u32, &self.comment);
        }
        out
    }
}

fn eocd(out: &mut Vec<u8>, count: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) {
    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
}

/// Buffer-backed reader that counts range streams and closes.
#[derive(Clone)]
pub struct TrackingReader {
    inner: Arc<BufferReader>,
    pub streams: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(BufferReader::new(data)),
            streams: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RandomAccessReader for TrackingReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        self.inner.read_stream_for_range(start, end).await
    }

    fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
