use super::helpers::{doc_of_size, open_engine};
use crate::{Result, StorageError, SLOT_HEADER_SIZE};
use serde_json::json;
use std::sync::atomic::Ordering;
use tempfile::tempdir;

#[test]
fn read_returns_the_stored_document() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());

    let doc = json!({"name": "Alice", "tags": ["a", "b"], "nested": {"x": 1}});
    let loc = engine.write("user_1", &doc)?;

    assert_eq!(engine.read_document(&loc)?, doc);
    Ok(())
}

#[test]
fn reads_are_counted_for_instrumentation() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let loc = engine.write("a", &json!({"v": 1}))?;

    let before = engine.stats().slot_reads;
    engine.read_document(&loc)?;
    engine.read_document(&loc)?;
    assert_eq!(engine.stats().slot_reads, before + 2);
    Ok(())
}

// --------------------- corruption detection ---------------------

/// Flips one byte of the data file at `offset` on disk.
fn flip_byte(path: &std::path::Path, offset: u64) {
    use std::io::{Read, Seek, SeekFrom, Write};
    let mut f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    f.seek(SeekFrom::Start(offset)).unwrap();
    let mut byte = [0u8; 1];
    f.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&byte).unwrap();
}

#[test]
fn payload_byte_flip_fails_the_checksum() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let loc = engine.write("a", &doc_of_size(100))?;

    // Flip a byte in the middle of the payload.
    flip_byte(
        engine.data_path(),
        loc.offset + u64::from(SLOT_HEADER_SIZE) + 50,
    );

    let err = engine.read_document(&loc).unwrap_err();
    match err {
        StorageError::ChecksumMismatch {
            offset,
            expected,
            actual,
        } => {
            assert_eq!(offset, loc.offset);
            assert_ne!(expected, actual);
        }
        other => panic!("expected ChecksumMismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn every_header_byte_flip_is_detected() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let loc = engine.write("a", &json!({"v": 1}))?;
    let pristine = std::fs::read(engine.data_path())?;

    // Any single corrupted byte in the slot header must fail the read with
    // CorruptedData or ChecksumMismatch.
    for i in 0..u64::from(SLOT_HEADER_SIZE) {
        flip_byte(engine.data_path(), loc.offset + i);
        let err = engine.read_document(&loc).unwrap_err();
        assert!(
            matches!(
                err,
                StorageError::CorruptedData { .. } | StorageError::ChecksumMismatch { .. }
            ),
            "header byte {} slipped through: {err:?}",
            i
        );
        std::fs::write(engine.data_path(), &pristine)?;
    }
    Ok(())
}

#[test]
fn read_past_end_of_file_is_corrupted_data() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let mut loc = engine.write("a", &json!({"v": 1}))?;

    // Point the location far past the end of the file.
    loc.offset = 1_000_000;
    let err = engine.read_document(&loc).unwrap_err();
    assert!(matches!(err, StorageError::CorruptedData { .. }));

    // Read-path failures never mutate counters.
    assert_eq!(engine.stats().document_count, 1);
    Ok(())
}

#[test]
fn length_mismatch_against_the_index_is_corrupted_data() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let mut loc = engine.write("a", &doc_of_size(100))?;

    loc.length -= 1;
    let err = engine.read_document(&loc).unwrap_err();
    assert!(matches!(err, StorageError::CorruptedData { .. }));
    Ok(())
}

// --------------------- open-time validation ---------------------

#[test]
fn open_rejects_a_foreign_file() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("test.data"), b"definitely not a smoldb file, padded to header size......................").unwrap();

    let err = crate::StorageEngine::open(
        &dir.path().join("test.data"),
        &dir.path().join("blobs").join("test"),
        std::sync::Arc::new(crate::SharedState::new()),
        &config::SmolConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StorageError::InvalidFileFormat { .. }));
}

#[test]
fn open_rejects_a_truncated_header() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("test.data"), b"SMOL").unwrap();

    let err = crate::StorageEngine::open(
        &dir.path().join("test.data"),
        &dir.path().join("blobs").join("test"),
        std::sync::Arc::new(crate::SharedState::new()),
        &config::SmolConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StorageError::InvalidFileFormat { .. }));
}

#[test]
fn trailing_bytes_beyond_next_slot_offset_are_ignored() -> Result<()> {
    let dir = tempdir()?;
    let loc = {
        let mut engine = open_engine(dir.path());
        engine.write("a", &json!({"v": 1}))?
    };

    // Simulate a torn write that extended the physical file.
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("test.data"))?;
        f.write_all(&[0xAB; 512])?;
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.stats().document_count, 1);
    assert_eq!(engine.read_document(&loc)?, json!({"v": 1}));
    Ok(())
}

#[test]
fn concurrent_readers_share_the_engine() -> Result<()> {
    let dir = tempdir()?;
    let mut engine = open_engine(dir.path());
    let loc = engine.write("a", &doc_of_size(100))?;

    // Reads go through &self; hammer them from several threads.
    let engine = std::sync::Arc::new(engine);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = std::sync::Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                let doc = engine.read_document(&loc).unwrap();
                assert_eq!(doc, doc_of_size(100));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(
        engine.slot_reads.load(Ordering::Relaxed),
        engine.stats().slot_reads
    );
    Ok(())
}
