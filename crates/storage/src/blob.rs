//! Blob files: oversized documents stored outside the data file.
//!
//! A document whose JSON encoding exceeds `blob_threshold` is written to
//! `<base>/blobs/<collection>/<id>.blob` as raw UTF-8 JSON; a small
//! [`BlobRef`] is stored in a normal data-file slot with the BLOB flag set.
//! The slot CRC protects the reference; the `crc32` field inside the
//! reference protects the blob body. Updates overwrite the same filename;
//! downgrading to inline deletes the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

use crate::error::{Result, StorageError};
use crate::StorageEngine;

/// JSON payload of a BLOB-flagged slot, pointing at the blob file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Filename relative to the collection's blob directory.
    pub path: String,
    /// Size of the blob body in bytes (the document's live-data accounting
    /// uses this, not the reference length).
    pub size: u64,
    /// CRC-32 of the blob body.
    pub crc32: u32,
}

impl StorageEngine {
    /// Writes (or overwrites) the blob file for `id` and returns its
    /// reference.
    pub(crate) fn write_blob_file(&self, id: &str, bytes: &[u8]) -> Result<BlobRef> {
        fs::create_dir_all(&self.blob_dir)?;
        let filename = format!("{}.blob", id);
        fs::write(self.blob_dir.join(&filename), bytes)?;
        Ok(BlobRef {
            path: filename,
            size: bytes.len() as u64,
            crc32: codec::crc32(bytes),
        })
    }

    /// Reads a blob body and verifies its CRC against the reference.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ChecksumMismatch`] if the body does not hash
    /// to `blob_ref.crc32`.
    pub(crate) fn read_blob_file(&self, blob_ref: &BlobRef) -> Result<Vec<u8>> {
        let bytes = fs::read(self.blob_dir.join(&blob_ref.path))?;
        let actual = codec::crc32(&bytes);
        if actual != blob_ref.crc32 {
            return Err(StorageError::ChecksumMismatch {
                offset: 0,
                expected: blob_ref.crc32,
                actual,
            });
        }
        Ok(bytes)
    }

    /// Deletes the blob file for a reference. A missing file is not an
    /// error (delete after a crash between slot free and file unlink).
    pub(crate) fn delete_blob_file(&self, blob_ref: &BlobRef) -> Result<()> {
        match fs::remove_file(self.blob_dir.join(&blob_ref.path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the collection's entire blob directory (used by reset/clear).
    pub fn remove_blob_dir(&self) -> Result<()> {
        match fs::remove_dir_all(&self.blob_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
