mod common;

use std::io;

use async_trait::async_trait;
use common::{EntrySpec, TrackingReader, ZipBuilder};
use seekzip::io::RangeStream;
use seekzip::zip::ZipText;
use seekzip::{ErrorKind, OpenOptions, RandomAccessReader, ReadStreamOptions, ZipError, ZipEvent, ZipFile};
use tokio::io::AsyncReadExt;

fn lazy() -> OpenOptions {
    OpenOptions::default().lazy_entries(true)
}

async fn read_to_vec(zip: &ZipFile, entry: &seekzip::Entry) -> Vec<u8> {
    let mut stream = zip.open_read_stream(entry, ReadStreamOptions::new()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

/// Yields once before every range stream so reads stay in flight.
struct YieldingReader(TrackingReader);

#[async_trait]
impl RandomAccessReader for YieldingReader {
    async fn read_stream_for_range(&self, start: u64, end: u64) -> io::Result<RangeStream> {
        tokio::task::yield_now().await;
        self.0.read_stream_for_range(start, end).await
    }
}

#[tokio::test]
async fn single_stored_entry_then_end() {
    let data = ZipBuilder::new().stored("a.txt", b"hello").build();
    let zip = ZipFile::from_buffer(data, OpenOptions::default()).await.unwrap();
    assert_eq!(zip.entry_count(), 1);
    let mut watcher = zip.close_watcher();

    let mut events = zip.events().unwrap();
    let entry = match events.next().await {
        Some(ZipEvent::Entry(entry)) => entry,
        other => panic!("expected an entry, got {other:?}"),
    };
    assert_eq!(entry.file_name, ZipText::Decoded("a.txt".into()));
    assert_eq!(entry.compressed_size, 5);
    assert_eq!(entry.uncompressed_size, 5);
    assert_eq!(read_to_vec(&zip, &entry).await, b"hello");

    assert!(matches!(events.next().await, Some(ZipEvent::End)));
    assert!(events.next().await.is_none());
    assert!(!zip.is_open());
    assert!(watcher.closed().await.is_closed());
}

#[tokio::test]
async fn delivers_every_entry_in_order() {
    let data = ZipBuilder::new()
        .stored("one.txt", b"1")
        .deflated("two.txt", b"22222222222222222222")
        .stored("dir/", b"")
        .build();
    let zip = ZipFile::from_buffer(data, OpenOptions::default()).await.unwrap();
    let entries = zip.read_all_entries().await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.file_name.to_string()).collect();
    assert_eq!(names, ["one.txt", "two.txt", "dir/"]);
    assert_eq!(entries.len() as u64, zip.entry_count());
    assert!(entries[2].is_directory());
    assert!(entries[1].is_compressed());
}

#[tokio::test]
async fn empty_archive() {
    let data = ZipBuilder::new().build();
    assert_eq!(data.len(), 22);

    let eager = ZipFile::from_buffer(data.clone(), OpenOptions::default()).await.unwrap();
    let mut events = eager.events().unwrap();
    assert!(matches!(events.next().await, Some(ZipEvent::End)));

    let lazy_zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    assert_eq!(lazy_zip.read_entry().await.unwrap(), None);
    assert_eq!(lazy_zip.read_entry().await.unwrap(), None);
}

#[tokio::test]
async fn trailing_garbage_is_not_a_zip() {
    let mut data = ZipBuilder::new().stored("a.txt", b"hello").comment(b"hi").build();
    data.push(b'!');
    let err = ZipFile::from_buffer(data, OpenOptions::default()).await.unwrap_err();
    assert!(matches!(err, ZipError::NotAZipFile));
    assert_eq!(err.kind(), ErrorKind::Format);

    let err = ZipFile::from_buffer(vec![0u8; 10], OpenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ZipError::NotAZipFile));
}

#[tokio::test]
async fn failed_open_closes_reader() {
    let reader = TrackingReader::new(b"definitely not a zip file".to_vec());
    let size = reader.len();
    assert!(ZipFile::from_reader(reader.clone(), size, lazy()).await.is_err());
    assert_eq!(reader.closes(), 1);
}

#[tokio::test]
async fn archive_comment_is_decoded() {
    let data = ZipBuilder::new().stored("a.txt", b"x").comment(b"caf\x82").build();
    let zip = ZipFile::from_buffer(data.clone(), lazy()).await.unwrap();
    assert_eq!(zip.comment().as_str(), Some("café"));

    let raw = ZipFile::from_buffer(data, lazy().decode_strings(false)).await.unwrap();
    assert_eq!(raw.comment(), &ZipText::Raw(b"caf\x82".to_vec()));
}

#[tokio::test]
async fn lazy_reads_are_not_reentrant() {
    let data = ZipBuilder::new().stored("a.txt", b"a").stored("b.txt", b"b").build();
    let reader = YieldingReader(TrackingReader::new(data));
    let size = reader.0.len();
    let zip = ZipFile::from_reader(reader, size, lazy()).await.unwrap();

    let (first, second) = tokio::join!(zip.read_entry(), zip.read_entry());
    assert_eq!(first.unwrap().unwrap().file_name.to_string(), "a.txt");
    assert!(matches!(second, Err(ZipError::EntryReadInProgress)));

    // the rejected call did not advance the cursor
    assert_eq!(zip.read_entry().await.unwrap().unwrap().file_name.to_string(), "b.txt");
    assert_eq!(zip.read_entry().await.unwrap(), None);
}

#[tokio::test]
async fn mode_mismatches_are_usage_errors() {
    let data = ZipBuilder::new().stored("a.txt", b"a").build();

    let eager = ZipFile::from_buffer(data.clone(), OpenOptions::default()).await.unwrap();
    assert!(matches!(eager.read_entry().await, Err(ZipError::NotLazy)));
    let _events = eager.events().unwrap();
    let err = eager.events().unwrap_err();
    assert!(matches!(err, ZipError::EventsUnavailable));
    assert_eq!(err.kind(), ErrorKind::Usage);

    let lazy_zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    assert!(matches!(lazy_zip.events(), Err(ZipError::EventsUnavailable)));
}

#[tokio::test]
async fn auto_close_after_last_entry() {
    let data = ZipBuilder::new().stored("a.txt", b"a").build();
    let reader = TrackingReader::new(data);
    let size = reader.len();
    let zip = ZipFile::from_reader(reader.clone(), size, lazy()).await.unwrap();

    assert!(zip.read_entry().await.unwrap().is_some());
    assert_eq!(reader.closes(), 0);
    assert_eq!(zip.read_entry().await.unwrap(), None);
    assert_eq!(reader.closes(), 1);
    assert!(!zip.is_open());
}

#[tokio::test]
async fn manual_close_is_idempotent() {
    let data = ZipBuilder::new().stored("a.txt", b"a").build();
    let reader = TrackingReader::new(data);
    let size = reader.len();
    let zip = ZipFile::from_reader(reader.clone(), size, lazy().auto_close(false))
        .await
        .unwrap();

    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(zip.read_entry().await.unwrap(), None);
    assert_eq!(reader.closes(), 0);

    zip.close();
    zip.close();
    assert_eq!(reader.closes(), 1);
    assert!(matches!(
        zip.open_read_stream(&entry, ReadStreamOptions::new()).await,
        Err(ZipError::Closed)
    ));
}

#[tokio::test]
async fn eager_error_ends_enumeration() {
    let data = ZipBuilder::new()
        .stored("ok.txt", b"ok")
        .stored("../evil.txt", b"evil")
        .build();
    let zip = ZipFile::from_buffer(data, OpenOptions::default()).await.unwrap();
    let mut events = zip.events().unwrap();

    assert!(matches!(events.next().await, Some(ZipEvent::Entry(_))));
    match events.next().await {
        Some(ZipEvent::Error(ZipError::InvalidRelativePath(name))) => assert_eq!(name, "../evil.txt"),
        other => panic!("expected a relative path error, got {other:?}"),
    }
    assert!(events.next().await.is_none());
    assert!(!zip.is_open());
}

#[tokio::test]
async fn lazy_error_is_reported_once() {
    let data = ZipBuilder::new().stored("/etc/passwd", b"root").build();
    let reader = TrackingReader::new(data);
    let size = reader.len();
    let zip = ZipFile::from_reader(reader.clone(), size, lazy()).await.unwrap();

    assert!(matches!(zip.read_entry().await, Err(ZipError::AbsolutePath(_))));
    assert_eq!(reader.closes(), 1);
    assert!(matches!(zip.read_entry().await, Err(ZipError::EnumerationFailed)));
}

#[tokio::test]
async fn backslashes_follow_strict_mode() {
    let data = ZipBuilder::new().stored("dir\\file.txt", b"x").build();

    let zip = ZipFile::from_buffer(data.clone(), lazy()).await.unwrap();
    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(entry.file_name.to_string(), "dir/file.txt");

    let strict = ZipFile::from_buffer(data, lazy().strict_file_names(true)).await.unwrap();
    assert!(matches!(
        strict.read_entry().await,
        Err(ZipError::InvalidFileNameCharacters(_))
    ));
}

#[tokio::test]
async fn raw_strings_skip_validation() {
    let data = ZipBuilder::new().stored("../up.txt", b"x").build();
    let zip = ZipFile::from_buffer(data, lazy().decode_strings(false)).await.unwrap();
    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(entry.file_name, ZipText::Raw(b"../up.txt".to_vec()));
    assert_eq!(entry.file_name_raw, b"../up.txt");
}

#[tokio::test]
async fn unicode_path_extra_field_wins() {
    let raw = b"caf\x82.txt";
    let mut field = vec![1u8];
    field.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
    field.extend_from_slice("café.txt".as_bytes());
    let data = ZipBuilder::new()
        .entry(EntrySpec::stored("", b"x").raw_name(raw).extra(0x7075, &field))
        .build();

    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(entry.file_name.to_string(), "café.txt");
    assert_eq!(entry.extra_fields.len(), 1);
}

#[tokio::test]
async fn stored_size_mismatch() {
    let data = ZipBuilder::new()
        .entry(EntrySpec::stored("a.txt", b"hello").declared_sizes(5, 6))
        .build();

    let zip = ZipFile::from_buffer(data.clone(), lazy()).await.unwrap();
    let err = zip.read_entry().await.unwrap_err();
    assert!(matches!(
        err,
        ZipError::StoredSizeMismatch {
            compressed: 5,
            uncompressed: 6
        }
    ));
    assert_eq!(err.kind(), ErrorKind::SizeMismatch);

    let lenient = ZipFile::from_buffer(data, lazy().validate_entry_sizes(false)).await.unwrap();
    assert_eq!(lenient.read_entry().await.unwrap().unwrap().uncompressed_size, 6);
}

#[tokio::test]
async fn strong_encryption_is_rejected() {
    let data = ZipBuilder::new()
        .entry(EntrySpec::stored("secret", b"x").flags(0x0041))
        .build();
    let zip = ZipFile::from_buffer(data, lazy().validate_entry_sizes(false)).await.unwrap();
    assert!(matches!(zip.read_entry().await, Err(ZipError::StrongEncryption)));
}

#[tokio::test]
async fn zip64_end_of_central_directory() {
    let data = ZipBuilder::new()
        .stored("a.txt", b"alpha")
        .deflated("b.txt", b"bravo bravo bravo")
        .zip64_eocd()
        .comment(b"64")
        .build();
    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    assert!(zip.is_zip64());
    assert_eq!(zip.entry_count(), 2);
    assert_eq!(zip.comment().as_str(), Some("64"));

    let a = zip.read_entry().await.unwrap().unwrap();
    let b = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(read_to_vec(&zip, &a).await, b"alpha");
    assert_eq!(read_to_vec(&zip, &b).await, b"bravo bravo bravo");
}

#[tokio::test]
async fn zip64_entry_sizes() {
    let payload = vec![b'z'; 300];
    let data = ZipBuilder::new()
        .entry(EntrySpec::stored("big.bin", &payload).zip64_sizes())
        .build();
    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(entry.compressed_size, 300);
    assert_eq!(entry.uncompressed_size, 300);
    assert_eq!(read_to_vec(&zip, &entry).await, payload);
}

#[tokio::test]
async fn zip64_placeholders_need_the_extra_field() {
    let missing = ZipBuilder::new()
        .entry(EntrySpec::stored("a", b"abc").declared_sizes(0xffff_ffff, 3))
        .build();
    let zip = ZipFile::from_buffer(missing, lazy()).await.unwrap();
    assert!(matches!(zip.read_entry().await, Err(ZipError::MissingZip64ExtraField)));

    let short = ZipBuilder::new()
        .entry(
            EntrySpec::stored("a", b"abc")
                .declared_sizes(0xffff_ffff, 3)
                .extra(0x0001, &[1, 2, 3]),
        )
        .build();
    let zip = ZipFile::from_buffer(short, lazy()).await.unwrap();
    assert!(matches!(
        zip.read_entry().await,
        Err(ZipError::Zip64FieldMissing("compressed size"))
    ));
}

fn legacy_eocd(entries: u16, cd_offset: u32) -> Vec<u8> {
    let mut out = 0x06054b50u32.to_le_bytes().to_vec();
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

#[tokio::test]
async fn zip64_locator_pointing_past_u64_max() {
    let mut data = 0x07064b50u32.to_le_bytes().to_vec();
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(u64::MAX - 10).to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend(legacy_eocd(0xffff, 0xffff_ffff));
    assert_eq!(data.len(), 42);

    let reader = TrackingReader::new(data);
    let size = reader.len();
    let err = ZipFile::from_reader(reader.clone(), size, lazy()).await.unwrap_err();
    assert!(matches!(
        err,
        ZipError::OffsetOutOfBounds { offset, file_size: 42, .. } if offset == u64::MAX - 10
    ));
    assert_eq!(err.kind(), ErrorKind::Bounds);
    assert_eq!(reader.closes(), 1);
}

#[tokio::test]
async fn central_directory_past_end_of_file() {
    let reader = TrackingReader::new(legacy_eocd(1, 0xffff_fff0));
    let size = reader.len();
    let err = ZipFile::from_reader(reader, size, lazy()).await.unwrap_err();
    assert!(matches!(err, ZipError::OffsetOutOfBounds { offset: 0xffff_fff0, .. }));
}

#[tokio::test]
async fn extra_field_overflow() {
    let data = ZipBuilder::new()
        .entry(EntrySpec::stored("a", b"abc").raw_extra(&[0x55, 0x54, 0x20, 0x00, 1, 2]))
        .build();
    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    assert!(matches!(zip.read_entry().await, Err(ZipError::ExtraFieldOverflow)));
}

#[tokio::test]
async fn prefixed_archive() {
    let data = ZipBuilder::new()
        .prefix(b"#!/bin/sh\nexit 0\n")
        .stored("a.txt", b"payload")
        .build();
    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();
    let entry = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(entry.relative_offset_of_local_header, 17);
    assert_eq!(read_to_vec(&zip, &entry).await, b"payload");
}

#[tokio::test]
async fn metadata_is_stable_across_opens() {
    let data = ZipBuilder::new()
        .stored("a.txt", b"a")
        .deflated("b.txt", b"bbbbbbbbbbbbbbbbbbbbbbbbbbbb")
        .entry(EntrySpec::stored("c.txt", b"c").comment(b"note"))
        .build();
    let first = ZipFile::from_buffer(data.clone(), OpenOptions::default())
        .await
        .unwrap()
        .read_all_entries()
        .await
        .unwrap();
    let second = ZipFile::from_buffer(data, lazy())
        .await
        .unwrap()
        .read_all_entries()
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first[2].file_comment.as_str(), Some("note"));
}

#[tokio::test]
async fn opens_archive_on_disk() {
    let data = ZipBuilder::new()
        .stored("a.txt", b"from disk")
        .deflated("b.txt", &b"compressible ".repeat(50))
        .build();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &data).unwrap();

    let zip = ZipFile::open(file.path(), lazy().auto_close(false)).await.unwrap();
    assert_eq!(zip.file_size(), data.len() as u64);
    let entries = zip.read_all_entries().await.unwrap();
    assert_eq!(read_to_vec(&zip, &entries[0]).await, b"from disk");
    assert_eq!(read_to_vec(&zip, &entries[1]).await, b"compressible ".repeat(50));
    zip.close();
}

#[tokio::test]
async fn modification_time() {
    let mut ut = vec![0x01];
    ut.extend_from_slice(&1_492_796_120i32.to_le_bytes());
    let data = ZipBuilder::new()
        .stored("plain.txt", b"p")
        .entry(EntrySpec::stored("ut.txt", b"u").extra(0x5455, &ut))
        .build();
    let zip = ZipFile::from_buffer(data, lazy()).await.unwrap();

    let plain = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(plain.mod_date(), (2017, 4, 21));
    assert_eq!(plain.mod_time(), (17, 35, 20));
    assert_eq!(
        plain.last_modified().unwrap().timestamp(),
        plain.dos_date_time().unwrap().and_utc().timestamp()
    );

    let extended = zip.read_entry().await.unwrap().unwrap();
    assert_eq!(extended.last_modified().unwrap().timestamp(), 1_492_796_120);
}
