//! Read path: CRC-validated slot reads and blob indirection.
//!
//! Reads are lock-free with respect to the write lock — they take `&self`
//! and only the short file-handle mutex. A read racing an in-progress slot
//! rewrite fails its CRC check; the contract permits (but does not
//! require) the caller to retry.

use serde_json::Value;
use std::sync::atomic::Ordering;

use crate::blob::BlobRef;
use crate::error::{Result, StorageError};
use crate::format::{SlotHeader, SLOT_HEADER_SIZE};
use crate::{DocumentLocation, StorageEngine};

impl StorageEngine {
    /// Reads and decodes the document at `location`.
    ///
    /// Inline slots decode their payload directly; blob slots decode the
    /// reference, read the blob file, and verify the body CRC stored in
    /// the reference.
    ///
    /// # Errors
    ///
    /// [`StorageError::CorruptedData`] for an inactive slot, a header
    /// mismatch against the location, or a short read;
    /// [`StorageError::ChecksumMismatch`] for a payload or blob-body CRC
    /// failure.
    pub fn read_document(&self, location: &DocumentLocation) -> Result<Value> {
        let payload = self.read_slot_payload(location)?;
        if location.is_blob {
            let blob_ref: BlobRef = serde_json::from_slice(&payload)?;
            let body = self.read_blob_file(&blob_ref)?;
            Ok(serde_json::from_slice(&body)?)
        } else {
            Ok(serde_json::from_slice(&payload)?)
        }
    }

    /// Reads and decodes the blob reference stored at `location`.
    ///
    /// The slot is validated like any other (ACTIVE bit, lengths, CRC).
    pub fn read_blob_ref(&self, location: &DocumentLocation) -> Result<BlobRef> {
        let payload = self.read_slot_payload(location)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Reads `16 + length` bytes at the location's offset, validates the
    /// slot header against the location, and returns the payload bytes.
    pub(crate) fn read_slot_payload(&self, location: &DocumentLocation) -> Result<Vec<u8>> {
        self.slot_reads.fetch_add(1, Ordering::Relaxed);

        let total = SLOT_HEADER_SIZE as usize + location.length as usize;
        let mut buf = vec![0u8; total];
        self.read_exact_at(location.offset, &mut buf)
            .map_err(|e| match e {
                StorageError::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    StorageError::CorruptedData {
                        offset: location.offset,
                        reason: "slot extends past end of file".to_string(),
                    }
                }
                other => other,
            })?;

        let slot = SlotHeader::decode(&buf);
        if slot.flags & !(crate::FLAG_ACTIVE | crate::FLAG_BLOB) != 0 {
            return Err(StorageError::CorruptedData {
                offset: location.offset,
                reason: format!("unknown flag bits {:#010x}", slot.flags),
            });
        }
        if !slot.is_active() {
            return Err(StorageError::CorruptedData {
                offset: location.offset,
                reason: "slot is not active".to_string(),
            });
        }
        if slot.is_blob() != location.is_blob {
            return Err(StorageError::CorruptedData {
                offset: location.offset,
                reason: "blob flag does not match index entry".to_string(),
            });
        }
        if slot.data_length != location.length {
            return Err(StorageError::CorruptedData {
                offset: location.offset,
                reason: format!(
                    "data length {} does not match index entry {}",
                    slot.data_length, location.length
                ),
            });
        }
        if slot.slab_size != location.slab_size {
            return Err(StorageError::CorruptedData {
                offset: location.offset,
                reason: format!(
                    "slab size {} does not match index entry {}",
                    slot.slab_size, location.slab_size
                ),
            });
        }

        let payload = buf.split_off(SLOT_HEADER_SIZE as usize);
        let actual = codec::crc32(&payload);
        if actual != slot.checksum {
            return Err(StorageError::ChecksumMismatch {
                offset: location.offset,
                expected: slot.checksum,
                actual,
            });
        }
        Ok(payload)
    }
}
