//! Write path: insert, the update transition matrix, delete, batching,
//! bulk writes, and reset.
//!
//! Every mutation runs under the per-collection write lock (callers hold a
//! write guard; methods take `&mut self`). In-memory counters advance only
//! after the positional write succeeded, so a failed write leaves the
//! header describing the last consistent state. At every batch boundary
//! (depth 0) the header is rewritten at offset 0 and the shared counters
//! are published.

use serde_json::Value;

use crate::alloc::{slab_size_for, FreeSlot};
use crate::error::{Result, StorageError};
use crate::format::{build_slot, DataFileHeader, FLAG_BLOB, SLOT_HEADER_SIZE};
use crate::{DocumentLocation, StorageEngine};

impl StorageEngine {
    /// Inserts a document, returning its location.
    ///
    /// Encodes to JSON; payloads above the blob threshold are routed to the
    /// blob path (standalone file + reference slot), everything else gets
    /// an inline slot from the allocator. Duplicate-id policy is the
    /// caller's concern — the engine works purely in locations.
    pub fn write(&mut self, id: &str, doc: &Value) -> Result<DocumentLocation> {
        let bytes = self.encode_document(doc)?;

        let location = if bytes.len() > self.blob_threshold {
            let blob_ref = self.write_blob_file(id, &bytes)?;
            let ref_payload = serde_json::to_vec(&blob_ref)?;
            self.allocate_and_write(&ref_payload, true)?
        } else {
            self.allocate_and_write(&bytes, false)?
        };

        // Blob or inline, the live size is the document's own bytes.
        self.header.live_data_size += bytes.len() as u64;
        self.header.document_count += 1;
        self.meta_dirty = true;
        self.maybe_flush()?;
        Ok(location)
    }

    /// Replaces the document at `old`, returning the new location.
    ///
    /// The transition matrix:
    ///
    /// | old    | new    | action                                          |
    /// |--------|--------|-------------------------------------------------|
    /// | inline | inline | in-place rewrite if it fits the slab, else relocate |
    /// | inline | blob   | free slot, write blob file, new reference slot  |
    /// | blob   | blob   | overwrite blob file; reference rewritten in place if it fits, else relocated |
    /// | blob   | inline | delete blob file, free reference slot, new inline slot |
    ///
    /// `live_data_size` is adjusted by the payload-byte delta, where a
    /// blob's payload bytes are the blob body's size, not the reference
    /// JSON length.
    pub fn update(
        &mut self,
        id: &str,
        doc: &Value,
        old: &DocumentLocation,
    ) -> Result<DocumentLocation> {
        let bytes = self.encode_document(doc)?;
        let new_is_blob = bytes.len() > self.blob_threshold;

        // The old blob reference must be read before anything overwrites
        // it: it carries the old body size for accounting and, on a
        // downgrade, the filename to unlink.
        let (old_payload_bytes, old_ref) = if old.is_blob {
            let blob_ref = self.read_blob_ref(old)?;
            (blob_ref.size, Some(blob_ref))
        } else {
            (u64::from(old.length), None)
        };

        let new_location = match (old.is_blob, new_is_blob) {
            (false, false) => {
                if bytes.len() + SLOT_HEADER_SIZE as usize <= old.slab_size as usize {
                    self.rewrite_in_place(old, &bytes, false)?
                } else {
                    self.free_slot(old)?;
                    self.allocate_and_write(&bytes, false)?
                }
            }
            (false, true) => {
                self.free_slot(old)?;
                let blob_ref = self.write_blob_file(id, &bytes)?;
                let ref_payload = serde_json::to_vec(&blob_ref)?;
                self.allocate_and_write(&ref_payload, true)?
            }
            (true, true) => {
                let blob_ref = self.write_blob_file(id, &bytes)?;
                let ref_payload = serde_json::to_vec(&blob_ref)?;
                if ref_payload.len() + SLOT_HEADER_SIZE as usize <= old.slab_size as usize {
                    self.rewrite_in_place(old, &ref_payload, true)?
                } else {
                    self.free_slot(old)?;
                    self.allocate_and_write(&ref_payload, true)?
                }
            }
            (true, false) => {
                if let Some(blob_ref) = &old_ref {
                    self.delete_blob_file(blob_ref)?;
                }
                self.free_slot(old)?;
                self.allocate_and_write(&bytes, false)?
            }
        };

        self.header.live_data_size = self
            .header
            .live_data_size
            .saturating_sub(old_payload_bytes)
            + bytes.len() as u64;
        self.meta_dirty = true;
        self.maybe_flush()?;
        Ok(new_location)
    }

    /// Deletes the record at `location`: clears the slot's ACTIVE bit on
    /// disk, adds the slot to the free list, and adjusts the counters. For
    /// blobs the blob file is unlinked as well.
    pub fn delete(&mut self, location: &DocumentLocation) -> Result<()> {
        if location.is_blob {
            let blob_ref = self.read_blob_ref(location)?;
            self.delete_blob_file(&blob_ref)?;
            self.header.live_data_size = self.header.live_data_size.saturating_sub(blob_ref.size);
        } else {
            self.header.live_data_size = self
                .header
                .live_data_size
                .saturating_sub(u64::from(location.length));
        }

        self.free_slot(location)?;
        self.header.document_count = self.header.document_count.saturating_sub(1);
        self.meta_dirty = true;
        self.maybe_flush()?;
        Ok(())
    }

    /// Runs `f` with metadata flushing deferred to the end.
    ///
    /// Increments the batch depth, so every mutation inside skips its
    /// per-op flush; at depth 0 the header is written once and the shared
    /// counters are published once. Nested batches share the outermost
    /// flush.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.meta_dirty {
            self.flush_metadata()?;
        }
        result
    }

    /// Bulk insert fast path for inline-sized documents.
    ///
    /// Allocates a contiguous run starting at the current end of the slot
    /// stream (bypassing the free list), builds every slot image in
    /// memory, issues one positional write for the whole run, and updates
    /// the counters in one shot. If any item would exceed the blob
    /// threshold the call degrades to a regular batched sequence.
    pub fn write_many(&mut self, items: &[(String, Value)]) -> Result<Vec<DocumentLocation>> {
        let mut payloads = Vec::with_capacity(items.len());
        for (_, doc) in items {
            let bytes = self.encode_document(doc)?;
            if bytes.len() > self.blob_threshold {
                return self.batch(|engine| {
                    items.iter().map(|(id, doc)| engine.write(id, doc)).collect()
                });
            }
            payloads.push(bytes);
        }

        let start = self.header.next_slot_offset;
        let mut run = Vec::new();
        let mut locations = Vec::with_capacity(items.len());
        let mut offset = start;
        let mut live = 0u64;

        for payload in &payloads {
            let slab_size = slab_size_for(payload.len());
            run.extend_from_slice(&build_slot(payload, slab_size, false));
            locations.push(DocumentLocation {
                offset,
                length: payload.len() as u32,
                slab_size,
                is_blob: false,
            });
            offset += u64::from(slab_size);
            live += payload.len() as u64;
        }

        self.write_at(start, &run)?;
        self.header.next_slot_offset = offset;
        self.header.file_size = offset;
        self.header.live_data_size += live;
        self.header.document_count += items.len() as u64;
        self.meta_dirty = true;
        self.maybe_flush()?;
        Ok(locations)
    }

    /// Truncates the data file to zero, writes a fresh header, and clears
    /// the free list and counters. Blob files are the caller's to clear
    /// (the coordinator removes the blob directory).
    pub fn reset(&mut self) -> Result<()> {
        self.truncate(0)?;
        self.header = DataFileHeader::new_empty();
        self.free.clear();
        self.meta_dirty = true;
        self.flush_metadata()?;
        Ok(())
    }

    /// Encodes a document to JSON bytes, enforcing the size ceiling.
    pub(crate) fn encode_document(&self, doc: &Value) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(doc)?;
        if bytes.len() > self.max_document_size {
            return Err(StorageError::DocumentTooLarge {
                size: bytes.len(),
                max: self.max_document_size,
            });
        }
        Ok(bytes)
    }

    /// Allocates a slot (free-list first fit, else append) and writes the
    /// slot image. `next_slot_offset` and `file_size` only advance after
    /// the write succeeded, and only for appends.
    fn allocate_and_write(&mut self, payload: &[u8], is_blob: bool) -> Result<DocumentLocation> {
        let slab_size = slab_size_for(payload.len());
        let allocation = self.free.allocate(slab_size, self.header.next_slot_offset);

        // A reused slot keeps its original (possibly larger) slab size.
        let slot = build_slot(payload, allocation.slab_size, is_blob);
        self.write_at(allocation.offset, &slot)?;

        if !allocation.reused {
            self.header.next_slot_offset += u64::from(allocation.slab_size);
            self.header.file_size += u64::from(allocation.slab_size);
        }

        Ok(DocumentLocation {
            offset: allocation.offset,
            length: payload.len() as u32,
            slab_size: allocation.slab_size,
            is_blob,
        })
    }

    /// Rewrites a slot's payload in place, keeping its slab size.
    fn rewrite_in_place(
        &self,
        old: &DocumentLocation,
        payload: &[u8],
        is_blob: bool,
    ) -> Result<DocumentLocation> {
        let slot = build_slot(payload, old.slab_size, is_blob);
        self.write_at(old.offset, &slot)?;
        Ok(DocumentLocation {
            offset: old.offset,
            length: payload.len() as u32,
            slab_size: old.slab_size,
            is_blob,
        })
    }

    /// Clears the slot's ACTIVE bit with a 4-byte positional write and
    /// records the slot in the free list.
    fn free_slot(&mut self, location: &DocumentLocation) -> Result<()> {
        let flags: u32 = if location.is_blob { FLAG_BLOB } else { 0 };
        self.write_at(location.offset, &flags.to_le_bytes())?;
        self.free.push(FreeSlot {
            offset: location.offset,
            slab_size: location.slab_size,
        });
        Ok(())
    }
}
