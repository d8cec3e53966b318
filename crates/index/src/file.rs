//! Binary index-file persistence.
//!
//! ## Layout — magic `SIDX` (`0x5844_4953`), version 1
//!
//! ```text
//! 0  [magic: u32 LE][version: u32 LE]
//! 8  [secondary_index_count: u16 LE]
//! 10 [primary_index_count: u32 LE]
//! 14 [primary_index_offset: u32 LE]
//! 18 [secondary_index_offset: u32 LE]
//! 22 [reserved: zero up to 64]
//!
//! primary entry:    [id_len: u16][id][offset: u64][length: u32]
//!                   [slab_size: u32][flags: u32]          (bit 0 = is_blob)
//! secondary block:  [path_len: u16][path][entry_count: u32] then per entry:
//!                   [value_len: u32][serialized value][id_count: u32]
//!                   then id_count × ([id_len: u16][id])
//! ```
//!
//! Save computes the total size, populates one buffer, and performs a
//! single write (to a temp file, fsynced, then atomically renamed — the
//! same pattern the data-file compactor uses). Load reads the whole file
//! and validates as it parses: a short file or truncated entry is
//! `IndexCorrupted`, a wrong magic or version is `InvalidFileFormat`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Write};
use std::path::Path;

use storage::{DocumentLocation, Result, StorageError};

use crate::{IndexManager, Postings};

/// Magic number identifying SmolDB index files (ASCII "SIDX").
pub const INDEX_MAGIC: u32 = 0x5844_4953;

/// Current index-file format version.
pub const INDEX_VERSION: u32 = 1;

/// Reserved size of the index-file header in bytes.
pub const INDEX_HEADER_SIZE: usize = 64;

/// Flag bit 0 of a primary entry: the location points at a blob reference.
const ENTRY_FLAG_BLOB: u32 = 1 << 0;

/// OOM guard for serialized index values on load.
const MAX_VALUE_BYTES: usize = 256 * 1024 * 1024;

/// Serializes both index kinds into one buffer and writes it atomically.
pub(crate) fn save(
    path: &Path,
    primary: &IndexMap<String, DocumentLocation>,
    secondary: &IndexMap<String, Postings>,
) -> Result<()> {
    if secondary.len() > u16::MAX as usize {
        return Err(StorageError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "too many secondary indexes for u16 count",
        )));
    }

    // Primary section.
    let mut primary_buf = Vec::new();
    for (id, location) in primary {
        codec::write_str_u16(&mut primary_buf, id)?;
        primary_buf.write_u64::<LittleEndian>(location.offset)?;
        primary_buf.write_u32::<LittleEndian>(location.length)?;
        primary_buf.write_u32::<LittleEndian>(location.slab_size)?;
        let flags = if location.is_blob { ENTRY_FLAG_BLOB } else { 0 };
        primary_buf.write_u32::<LittleEndian>(flags)?;
    }

    // Secondary section.
    let mut secondary_buf = Vec::new();
    for (field_path, postings) in secondary {
        codec::write_str_u16(&mut secondary_buf, field_path)?;
        secondary_buf.write_u32::<LittleEndian>(postings.len() as u32)?;
        for (value, ids) in postings {
            codec::write_bytes_u32(&mut secondary_buf, value)?;
            secondary_buf.write_u32::<LittleEndian>(ids.len() as u32)?;
            for id in ids {
                codec::write_str_u16(&mut secondary_buf, id)?;
            }
        }
    }

    let primary_offset = INDEX_HEADER_SIZE;
    let secondary_offset = primary_offset + primary_buf.len();
    if secondary_offset + secondary_buf.len() > u32::MAX as usize {
        return Err(StorageError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "index file exceeds u32 offset range",
        )));
    }

    let mut image = Vec::with_capacity(secondary_offset + secondary_buf.len());
    image.write_u32::<LittleEndian>(INDEX_MAGIC)?;
    image.write_u32::<LittleEndian>(INDEX_VERSION)?;
    image.write_u16::<LittleEndian>(secondary.len() as u16)?;
    image.write_u32::<LittleEndian>(primary.len() as u32)?;
    image.write_u32::<LittleEndian>(primary_offset as u32)?;
    image.write_u32::<LittleEndian>(secondary_offset as u32)?;
    image.resize(INDEX_HEADER_SIZE, 0);
    image.extend_from_slice(&primary_buf);
    image.extend_from_slice(&secondary_buf);

    let tmp = path.with_extension("idx.tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(&image)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Loads and validates an index file.
pub(crate) fn load(path: &Path) -> Result<IndexManager> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < INDEX_HEADER_SIZE {
        return Err(StorageError::IndexCorrupted(format!(
            "{}: file shorter than header ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes.as_slice());
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != INDEX_MAGIC {
        return Err(StorageError::InvalidFileFormat {
            path: path.to_path_buf(),
            reason: format!("bad magic {:#010x} (expected {:#010x})", magic, INDEX_MAGIC),
        });
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != INDEX_VERSION {
        return Err(StorageError::InvalidFileFormat {
            path: path.to_path_buf(),
            reason: format!("unsupported version {}", version),
        });
    }

    let secondary_count = cursor.read_u16::<LittleEndian>()?;
    let primary_count = cursor.read_u32::<LittleEndian>()?;
    let primary_offset = cursor.read_u32::<LittleEndian>()? as u64;
    let secondary_offset = cursor.read_u32::<LittleEndian>()? as u64;
    if primary_offset > bytes.len() as u64 || secondary_offset > bytes.len() as u64 {
        return Err(StorageError::IndexCorrupted(format!(
            "{}: section offsets point past end of file",
            path.display()
        )));
    }

    let corrupt = |e: io::Error| -> StorageError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::IndexCorrupted(format!("{}: truncated entry", path.display()))
        } else {
            StorageError::Io(e)
        }
    };

    // Primary entries.
    let mut primary = IndexMap::with_capacity(primary_count as usize);
    cursor.set_position(primary_offset);
    for _ in 0..primary_count {
        let id = codec::read_str_u16(&mut cursor).map_err(corrupt)?;
        let offset = cursor.read_u64::<LittleEndian>().map_err(corrupt)?;
        let length = cursor.read_u32::<LittleEndian>().map_err(corrupt)?;
        let slab_size = cursor.read_u32::<LittleEndian>().map_err(corrupt)?;
        let flags = cursor.read_u32::<LittleEndian>().map_err(corrupt)?;
        primary.insert(
            id,
            DocumentLocation {
                offset,
                length,
                slab_size,
                is_blob: flags & ENTRY_FLAG_BLOB != 0,
            },
        );
    }

    // Secondary blocks.
    let mut secondary = IndexMap::with_capacity(secondary_count as usize);
    cursor.set_position(secondary_offset);
    for _ in 0..secondary_count {
        let field_path = codec::read_str_u16(&mut cursor).map_err(corrupt)?;
        let entry_count = cursor.read_u32::<LittleEndian>().map_err(corrupt)?;
        let mut postings = Postings::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let value = codec::read_bytes_u32(&mut cursor, MAX_VALUE_BYTES).map_err(corrupt)?;
            let id_count = cursor.read_u32::<LittleEndian>().map_err(corrupt)?;
            let mut ids = std::collections::HashSet::with_capacity(id_count as usize);
            for _ in 0..id_count {
                ids.insert(codec::read_str_u16(&mut cursor).map_err(corrupt)?);
            }
            postings.insert(value, ids);
        }
        secondary.insert(field_path, postings);
    }

    Ok(IndexManager::from_parts(
        path.to_path_buf(),
        primary,
        secondary,
    ))
}
