//! # Storage — the SmolDB data-file engine
//!
//! Owns one collection's slotted data file, its in-memory header, its free
//! list, and its blob directory. The index and collection crates layer the
//! id → location map and the query surface on top.
//!
//! ## Architecture
//!
//! ```text
//! Collection coordinator
//!   |
//!   v
//! ┌───────────────────────────────────────────────────┐
//! │                 STORAGE ENGINE                    │
//! │                                                   │
//! │ write.rs → slab alloc → slot write → counters     │
//! │              |                                    │
//! │              |  (payload > blob_threshold?)       │
//! │              v            yes                     │
//! │           blob.rs → <id>.blob + reference slot    │
//! │                                                   │
//! │ read.rs → positional read → CRC check → JSON      │
//! │ compact.rs → packed rebuild → tmp + rename        │
//! │ shared.rs → atomic cells for the GC worker        │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                            |
//! |--------------|----------------------------------------------------|
//! | `lib.rs`     | `StorageEngine` struct, open/stats, positional I/O |
//! | [`format`]   | header + slot binary codecs, magic/version checks  |
//! | [`alloc`]    | slab size classes, first-fit free list             |
//! | [`write`]    | insert/update/delete, batch, write_many, reset     |
//! | [`read`]     | CRC-validated slot and blob reads                  |
//! | [`blob`]     | oversized documents as standalone files            |
//! | [`compact`]  | packed rebuild via temp file + atomic rename       |
//! | [`shared`]   | the 64-byte atomic buffer shared with the worker   |
//! | [`error`]    | the typed failure vocabulary                       |
//!
//! ## Locking
//!
//! Mutations take `&mut self` — the per-collection write lock lives one
//! level up (the database wraps each collection in an `RwLock`, and the
//! background worker compacts through the same instance under that lock).
//! Reads take `&self` and only the short-lived file-handle mutex, so they
//! never contend with the write lock; a read racing a slot rewrite fails
//! its CRC check and may simply be retried.

mod alloc;
mod blob;
mod compact;
mod error;
mod format;
mod read;
mod shared;
mod write;

pub use self::alloc::{
    slab_size_for, Allocation, FreeList, FreeSlot, SLAB_ALIGN, SLAB_LARGE, SLAB_SMALL, SLAB_TINY,
};
pub use self::blob::BlobRef;
pub use self::compact::CompactionResult;
pub use self::error::{Result, StorageError};
pub use self::format::{
    build_slot, DataFileHeader, SlotHeader, DATA_HEADER_SIZE, DATA_MAGIC, DATA_VERSION,
    FLAG_ACTIVE, FLAG_BLOB, SLOT_HEADER_SIZE,
};
pub use self::shared::{
    Cell, SharedState, CELL_COUNT, CMD_NONE, CMD_SHUTDOWN, CMD_TRIGGER_GC, GC_COMPLETE, GC_IDLE,
    GC_RUNNING,
};

use config::SmolConfig;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where a document currently lives in the data file.
///
/// Produced by the allocator on every write or relocation, held by the
/// primary index, and invalidated when the slot is freed or after
/// compaction (which returns fresh locations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLocation {
    /// Absolute byte offset of the slot in the data file.
    pub offset: u64,
    /// Payload length in bytes (for blobs: the reference JSON, not the
    /// blob body).
    pub length: u32,
    /// Allocated slab size of the slot; `length + 16 <= slab_size`.
    pub slab_size: u32,
    /// `true` if the slot holds a blob reference.
    pub is_blob: bool,
}

/// Point-in-time storage counters, plus the read-path instrumentation used
/// by index-only-query tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub file_size: u64,
    pub live_data_size: u64,
    pub document_count: u64,
    pub next_slot_offset: u64,
    pub free_slots: usize,
    pub free_bytes: u64,
    /// Total slot reads performed since open (monotonic).
    pub slot_reads: u64,
}

/// The per-collection storage engine.
///
/// Exclusively owns the data-file handle, the header, and the free list
/// (ownership model: nothing else touches these). Holds an
/// `Arc<SharedState>` to publish counters for the background worker after
/// every write-path flush.
pub struct StorageEngine {
    data_path: PathBuf,
    pub(crate) blob_dir: PathBuf,
    /// Persistent file handle. The mutex provides interior mutability for
    /// positional reads through `&self`; critical sections are a single
    /// seek + read/write.
    file: Mutex<File>,
    pub(crate) header: DataFileHeader,
    pub(crate) free: FreeList,
    pub(crate) batch_depth: u32,
    pub(crate) meta_dirty: bool,
    shared: Arc<SharedState>,
    pub(crate) blob_threshold: usize,
    pub(crate) max_document_size: usize,
    pub(crate) slot_reads: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("data_path", &self.data_path)
            .field("file_size", &self.header.file_size)
            .field("live_data_size", &self.header.live_data_size)
            .field("document_count", &self.header.document_count)
            .field("free_slots", &self.free.len())
            .field("blob_threshold", &self.blob_threshold)
            .finish()
    }
}

impl StorageEngine {
    /// Opens (or creates) a collection's data file.
    ///
    /// # Arguments
    ///
    /// * `data_path` — path of the `<collection>.data` file.
    /// * `blob_dir` — directory for this collection's blob files (created
    ///   lazily on first blob write).
    /// * `shared` — the database-wide shared-state buffer.
    /// * `cfg` — blob threshold and document size limit.
    ///
    /// # Open steps
    ///
    /// 1. Create the parent directory if needed and remove a leftover
    ///    `.tmp` file from an interrupted compaction.
    /// 2. A zero-length file gets a fresh header; otherwise the header is
    ///    decoded and validated (magic, version). The header is
    ///    authoritative — trailing bytes beyond `next_slot_offset` are
    ///    ignored.
    /// 3. The free list is rebuilt by striding the slot headers from
    ///    [`DATA_HEADER_SIZE`] to `next_slot_offset` and collecting
    ///    inactive slots, so freed space survives a reopen.
    pub fn open(
        data_path: &Path,
        blob_dir: &Path,
        shared: Arc<SharedState>,
        cfg: &SmolConfig,
    ) -> Result<Self> {
        if let Some(parent) = data_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // A compaction interrupted before its rename leaves a stale temp
        // file; it was never the live file, so it is safe to drop.
        let tmp = compact::tmp_path(data_path);
        if tmp.exists() {
            let _ = std::fs::remove_file(&tmp);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(data_path)?;

        let header = if file.metadata()?.len() == 0 {
            let header = DataFileHeader::new_empty();
            file.write_all(&header.encode())?;
            header
        } else {
            let mut buf = [0u8; DATA_HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    StorageError::InvalidFileFormat {
                        path: data_path.to_path_buf(),
                        reason: "file shorter than header".to_string(),
                    }
                } else {
                    e.into()
                }
            })?;
            DataFileHeader::decode(&buf, data_path)?
        };

        let mut engine = Self {
            data_path: data_path.to_path_buf(),
            blob_dir: blob_dir.to_path_buf(),
            file: Mutex::new(file),
            header,
            free: FreeList::new(),
            batch_depth: 0,
            meta_dirty: false,
            shared,
            blob_threshold: cfg.blob_threshold,
            max_document_size: cfg.max_document_size,
            slot_reads: AtomicU64::new(0),
        };
        engine.rebuild_free_list()?;
        Ok(engine)
    }

    /// Scans slot headers from the start of the slot stream and records
    /// every inactive slot in the free list.
    ///
    /// The tiling invariant makes this a header-stride walk: each slot
    /// advances the cursor by its own `slab_size`.
    fn rebuild_free_list(&mut self) -> Result<()> {
        let mut offset = DATA_HEADER_SIZE;
        let end = self.header.next_slot_offset;
        let mut buf = [0u8; SLOT_HEADER_SIZE as usize];

        while offset < end {
            self.read_exact_at(offset, &mut buf).map_err(|_| {
                StorageError::CorruptedData {
                    offset,
                    reason: "slot header beyond end of file".to_string(),
                }
            })?;
            let slot = SlotHeader::decode(&buf);
            if slot.slab_size < SLOT_HEADER_SIZE {
                return Err(StorageError::CorruptedData {
                    offset,
                    reason: format!("slab size {} below slot header size", slot.slab_size),
                });
            }
            if !slot.is_active() {
                self.free.push(FreeSlot {
                    offset,
                    slab_size: slot.slab_size,
                });
            }
            offset += u64::from(slot.slab_size);
        }
        Ok(())
    }

    /// Returns the path of the data file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Returns the blob directory for this collection.
    #[must_use]
    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    /// Returns the configured blob threshold in bytes.
    #[must_use]
    pub fn blob_threshold(&self) -> usize {
        self.blob_threshold
    }

    /// Current counters and instrumentation.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            file_size: self.header.file_size,
            live_data_size: self.header.live_data_size,
            document_count: self.header.document_count,
            next_slot_offset: self.header.next_slot_offset,
            free_slots: self.free.len(),
            free_bytes: self.free.total_bytes(),
            slot_reads: self.slot_reads.load(Ordering::Relaxed),
        }
    }

    /// Writes the header at offset 0 and publishes the counters to the
    /// shared buffer. Called at every batch boundary (depth 0).
    pub(crate) fn flush_metadata(&mut self) -> Result<()> {
        let encoded = self.header.encode();
        self.write_at(0, &encoded)?;
        self.shared.publish_counters(
            self.header.file_size,
            self.header.live_data_size,
            self.header.document_count,
        );
        self.meta_dirty = false;
        Ok(())
    }

    /// Flushes metadata unless a batch is open (then the outermost batch
    /// exit flushes once for everyone).
    pub(crate) fn maybe_flush(&mut self) -> Result<()> {
        if self.batch_depth == 0 && self.meta_dirty {
            self.flush_metadata()?;
        }
        Ok(())
    }

    fn lock_file(&self) -> Result<MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "data file lock poisoned",
            ))
        })
    }

    /// Positional write: seek + write_all under the file-handle lock.
    pub(crate) fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut f = self.lock_file()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(bytes)?;
        Ok(())
    }

    /// Positional read: seek + read_exact under the file-handle lock.
    pub(crate) fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut f = self.lock_file()?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }

    /// Truncates the file to `len` bytes.
    pub(crate) fn truncate(&self, len: u64) -> Result<()> {
        let f = self.lock_file()?;
        f.set_len(len)?;
        Ok(())
    }

    /// Swaps in a new file handle after compaction renamed over the data
    /// file (the inode changed).
    pub(crate) fn replace_file(&self, file: File) -> Result<()> {
        let mut guard = self.lock_file()?;
        *guard = file;
        Ok(())
    }
}

/// Best-effort metadata flush on drop.
///
/// If the engine is dropped mid-batch or after an unflushed mutation, the
/// header is written so counters survive a clean close. Errors are ignored
/// because `Drop` cannot propagate them.
impl Drop for StorageEngine {
    fn drop(&mut self) {
        if self.meta_dirty {
            let _ = self.flush_metadata();
        }
    }
}

#[cfg(test)]
mod tests;
