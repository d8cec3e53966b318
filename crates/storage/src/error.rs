//! Error vocabulary for the storage engine and the crates layered on it.
//!
//! One typed enum, shared across `storage`, `index`, and `collection` so a
//! caller can match on failure kinds (`DuplicateId`, `ChecksumMismatch`, …)
//! without string inspection. The database façade wraps these in `anyhow`
//! but keeps the typed source for downcasting.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds surfaced by SmolDB.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `insert` on an id that already exists in the collection.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// `update` on an id with no primary-index entry.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A slot header is invalid: ACTIVE bit unexpectedly clear, length
    /// mismatch against the index, or unexpected EOF inside the slot.
    #[error("corrupted data at offset {offset}: {reason}")]
    CorruptedData { offset: u64, reason: String },

    /// CRC mismatch on a slot payload or a blob body.
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// Wrong magic number or unsupported version.
    #[error("invalid file format in {path}: {reason}")]
    InvalidFileFormat { path: PathBuf, reason: String },

    /// Index file shorter than its header or with malformed entries.
    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    /// A document's JSON encoding exceeds the configured maximum.
    #[error("document too large: {size} bytes (max {max})")]
    DocumentTooLarge { size: usize, max: usize },

    /// Operation issued before the database was initialized.
    #[error("database not initialized")]
    NotInitialized,

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StorageError>;
