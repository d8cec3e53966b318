//! Compaction: rebuilds the data file with only live records, tightly
//! packed at their minimal slab classes.
//!
//! The packed image is built in memory, written to `<data>.tmp`, fsynced,
//! and atomically renamed over the data file — a rename is the only cheap
//! atomicity primitive POSIX offers, at the cost of briefly needing disk
//! equal to the live data. The caller holds the write lock, so no
//! foreground mutation can observe a half-rewritten file; afterwards the
//! file handle is reopened because the inode changed.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::alloc::slab_size_for;
use crate::blob::BlobRef;
use crate::error::Result;
use crate::format::{build_slot, DataFileHeader, DATA_HEADER_SIZE};
use crate::{DocumentLocation, StorageEngine};

/// Temp-file path used during compaction: `<collection>.data.tmp`.
pub(crate) fn tmp_path(data_path: &Path) -> PathBuf {
    let mut os = data_path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// What a compaction run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// `old file size - new file size` (0 when the file was already
    /// packed).
    pub bytes_freed: u64,
    /// Fresh locations for every live document, in the order the caller
    /// supplied them. The index manager swaps these into the primary index.
    pub new_locations: Vec<(String, DocumentLocation)>,
}

impl StorageEngine {
    /// Rewrites the data file to contain exactly the `live` records,
    /// packed back-to-back at their minimal slab classes.
    ///
    /// `live` is the primary index's entries in insertion order; blob
    /// records carry over their reference slot (the blob file itself is
    /// not touched). Each slot gets a freshly computed CRC. On success
    /// the free list is cleared, the in-memory header replaced, and the
    /// new counters published to the shared state.
    ///
    /// Compacting an already-packed file is a no-op byte-wise: the same
    /// image is produced and `bytes_freed` is 0.
    pub fn compact(&mut self, live: &[(String, DocumentLocation)]) -> Result<CompactionResult> {
        let old_file_size = self.header.file_size;

        let mut image = vec![0u8; DATA_HEADER_SIZE as usize];
        let mut new_locations = Vec::with_capacity(live.len());
        let mut live_bytes = 0u64;

        for (id, old) in live {
            let payload = self.read_slot_payload(old)?;

            live_bytes += if old.is_blob {
                serde_json::from_slice::<BlobRef>(&payload)?.size
            } else {
                payload.len() as u64
            };

            // In-place updates can leave a slab oversized for its current
            // payload; re-derive the minimal class.
            let slab_size = slab_size_for(payload.len());
            let offset = image.len() as u64;
            image.extend_from_slice(&build_slot(&payload, slab_size, old.is_blob));
            new_locations.push((
                id.clone(),
                DocumentLocation {
                    offset,
                    length: payload.len() as u32,
                    slab_size,
                    is_blob: old.is_blob,
                },
            ));
        }

        let new_header = DataFileHeader {
            file_size: image.len() as u64,
            live_data_size: live_bytes,
            document_count: live.len() as u64,
            next_slot_offset: image.len() as u64,
        };
        image[..DATA_HEADER_SIZE as usize].copy_from_slice(&new_header.encode());

        let tmp = tmp_path(self.data_path());
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(&image)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, self.data_path())?;

        // Fsync the parent directory so the rename survives a crash on
        // filesystems that do not journal directory metadata.
        if let Some(parent) = self.data_path().parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.data_path())?;
        self.replace_file(file)?;

        self.free.clear();
        self.header = new_header;
        self.meta_dirty = true;
        self.flush_metadata()?;

        let bytes_freed = old_file_size.saturating_sub(self.header.file_size);
        log::debug!(
            "compacted {}: {} live documents, {} bytes freed",
            self.data_path().display(),
            live.len(),
            bytes_freed
        );
        Ok(CompactionResult {
            bytes_freed,
            new_locations,
        })
    }
}
