//! Data-file binary format constants and header/slot codecs.
//!
//! ## File header (64 bytes reserved) — magic `SMOL` (`0x4C4F_4D53`)
//!
//! ```text
//! [magic: u32 LE][version: u32 LE][file_size: u64 LE][live_data_size: u64 LE]
//! [document_count: u64 LE][next_slot_offset: u64 LE][reserved: 24 bytes zero]
//! ```
//!
//! ## Slot (the unit of allocation)
//!
//! ```text
//! [flags: u32 LE][data_length: u32 LE][slab_size: u32 LE][crc32: u32 LE]
//! [payload: data_length bytes][padding up to slab_size]
//! ```
//!
//! `flags` bit 0 = ACTIVE, bit 1 = BLOB. The CRC covers the payload bytes
//! only, never the padding. Slots tile the file from [`DATA_HEADER_SIZE`] to
//! `next_slot_offset`, each advancing by its own `slab_size`.

use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;

use crate::error::{Result, StorageError};

/// Magic number identifying SmolDB data files (ASCII "SMOL").
pub const DATA_MAGIC: u32 = 0x4C4F_4D53;

/// Current data-file format version.
pub const DATA_VERSION: u32 = 1;

/// Reserved size of the data-file header in bytes.
pub const DATA_HEADER_SIZE: u64 = 64;

/// Size of a slot header in bytes.
pub const SLOT_HEADER_SIZE: u32 = 16;

/// Slot flag bit 0: the slot holds a live record.
pub const FLAG_ACTIVE: u32 = 1 << 0;

/// Slot flag bit 1: the payload is a blob reference, not document JSON.
pub const FLAG_BLOB: u32 = 1 << 1;

/// In-memory image of the data-file header.
///
/// The header is authoritative on reopen: trailing bytes beyond
/// `next_slot_offset` (e.g. from a torn write that extended the file) are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileHeader {
    /// Total logical file size; equals `next_slot_offset` at all times.
    pub file_size: u64,
    /// Sum of live payload bytes (blob bodies count their own size).
    pub live_data_size: u64,
    /// Number of live documents.
    pub document_count: u64,
    /// Offset where the next appended slot starts.
    pub next_slot_offset: u64,
}

impl DataFileHeader {
    /// Header for a freshly created, empty data file.
    #[must_use]
    pub fn new_empty() -> Self {
        Self {
            file_size: DATA_HEADER_SIZE,
            live_data_size: 0,
            document_count: 0,
            next_slot_offset: DATA_HEADER_SIZE,
        }
    }

    /// Encodes the header into its fixed 64-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; DATA_HEADER_SIZE as usize] {
        let mut buf = [0u8; DATA_HEADER_SIZE as usize];
        LittleEndian::write_u32(&mut buf[0..4], DATA_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], DATA_VERSION);
        LittleEndian::write_u64(&mut buf[8..16], self.file_size);
        LittleEndian::write_u64(&mut buf[16..24], self.live_data_size);
        LittleEndian::write_u64(&mut buf[24..32], self.document_count);
        LittleEndian::write_u64(&mut buf[32..40], self.next_slot_offset);
        buf
    }

    /// Decodes and validates a 64-byte header image.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidFileFormat`] on a wrong magic number
    /// or an unsupported version; `path` is reported in the error.
    pub fn decode(buf: &[u8], path: &Path) -> Result<Self> {
        if buf.len() < DATA_HEADER_SIZE as usize {
            return Err(StorageError::InvalidFileFormat {
                path: path.to_path_buf(),
                reason: format!("header truncated at {} bytes", buf.len()),
            });
        }
        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != DATA_MAGIC {
            return Err(StorageError::InvalidFileFormat {
                path: path.to_path_buf(),
                reason: format!("bad magic {:#010x} (expected {:#010x})", magic, DATA_MAGIC),
            });
        }
        let version = LittleEndian::read_u32(&buf[4..8]);
        if version != DATA_VERSION {
            return Err(StorageError::InvalidFileFormat {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", version),
            });
        }
        Ok(Self {
            file_size: LittleEndian::read_u64(&buf[8..16]),
            live_data_size: LittleEndian::read_u64(&buf[16..24]),
            document_count: LittleEndian::read_u64(&buf[24..32]),
            next_slot_offset: LittleEndian::read_u64(&buf[32..40]),
        })
    }
}

/// Decoded 16-byte slot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub flags: u32,
    pub data_length: u32,
    pub slab_size: u32,
    pub checksum: u32,
}

impl SlotHeader {
    /// Decodes a slot header from the first 16 bytes of `buf`.
    ///
    /// Callers must supply at least [`SLOT_HEADER_SIZE`] bytes.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            flags: LittleEndian::read_u32(&buf[0..4]),
            data_length: LittleEndian::read_u32(&buf[4..8]),
            slab_size: LittleEndian::read_u32(&buf[8..12]),
            checksum: LittleEndian::read_u32(&buf[12..16]),
        }
    }

    /// Returns `true` if the ACTIVE bit is set (live record).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.flags & FLAG_ACTIVE != 0
    }

    /// Returns `true` if the BLOB bit is set (payload is a blob reference).
    #[must_use]
    pub fn is_blob(&self) -> bool {
        self.flags & FLAG_BLOB != 0
    }
}

/// Builds a complete slot image: header, payload, zero padding to
/// `slab_size`. The CRC is computed over the payload bytes.
///
/// Callers guarantee `payload.len() + 16 <= slab_size` (slab discipline).
#[must_use]
pub fn build_slot(payload: &[u8], slab_size: u32, is_blob: bool) -> Vec<u8> {
    debug_assert!(payload.len() + SLOT_HEADER_SIZE as usize <= slab_size as usize);

    let mut flags = FLAG_ACTIVE;
    if is_blob {
        flags |= FLAG_BLOB;
    }

    let mut buf = vec![0u8; slab_size as usize];
    LittleEndian::write_u32(&mut buf[0..4], flags);
    LittleEndian::write_u32(&mut buf[4..8], payload.len() as u32);
    LittleEndian::write_u32(&mut buf[8..12], slab_size);
    LittleEndian::write_u32(&mut buf[12..16], codec::crc32(payload));
    buf[16..16 + payload.len()].copy_from_slice(payload);
    buf
}
