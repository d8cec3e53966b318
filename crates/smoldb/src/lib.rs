//! # SmolDB — embedded document database
//!
//! The database object: a registry of [`Collection`]s under one base
//! directory, the shared-state buffer connecting them to the background
//! compaction worker, and lifecycle management (`init` … `close`).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      DATABASE                        │
//! │                                                      │
//! │  registry: name -> Arc<RwLock<Collection>>           │
//! │      |                                               │
//! │      |  write guard = the per-collection write lock  │
//! │      v                                               │
//! │  Collection -> StorageEngine + IndexManager + cache  │
//! │                                                      │
//! │  SharedState (8 atomic u32 cells)                    │
//! │      ^                    ^                          │
//! │      | publish            | wait/notify              │
//! │  foreground flushes   GC worker thread (worker.rs)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The worker compacts through the **same** collection instances the
//! foreground uses, under each collection's write lock, so there is no
//! second storage instance racing the first. Worker failures surface as
//! strings on an event channel ([`Database::worker_events`]) and never
//! take the process down.
//!
//! ## Example
//!
//! ```rust,no_run
//! use config::SmolConfig;
//! use serde_json::json;
//! use smoldb::Database;
//!
//! let mut db = Database::new("data", SmolConfig::default());
//! db.init().unwrap();
//!
//! let users = db.collection("users").unwrap();
//! users.write().unwrap().insert("u1", &json!({"name": "Alice"})).unwrap();
//! assert_eq!(
//!     users.read().unwrap().get("u1").unwrap(),
//!     Some(json!({"name": "Alice"})),
//! );
//!
//! db.close().unwrap();
//! ```

mod worker;

use collection::{Collection, CollectionStats};
use config::SmolConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};

use storage::{Cell, Result, SharedState, StorageError, CMD_TRIGGER_GC, GC_RUNNING};
use worker::GcWorker;

/// A collection handle: the `RwLock` write guard is the per-collection
/// write lock, shared by the foreground and the GC worker.
pub type CollectionHandle = Arc<RwLock<Collection>>;

pub(crate) type Registry = Arc<RwLock<HashMap<String, CollectionHandle>>>;

/// Snapshot of the background worker's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStatus {
    /// `true` while a pass is running.
    pub running: bool,
    /// 0–100, percentage of collections processed in the current/last pass.
    pub progress: u32,
    /// Bytes freed by the last completed pass (saturating `u32`).
    pub bytes_freed: u32,
}

/// Aggregate stats across every open collection.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub collections: Vec<CollectionStats>,
    pub gc: GcStatus,
}

/// The embedded document database.
pub struct Database {
    base_dir: PathBuf,
    cfg: SmolConfig,
    collections: Registry,
    shared: Arc<SharedState>,
    worker: Option<GcWorker>,
    events: Mutex<Receiver<String>>,
    events_tx: Sender<String>,
    initialized: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("base_dir", &self.base_dir)
            .field("initialized", &self.initialized)
            .field("gc_enabled", &self.cfg.gc_enabled)
            .finish()
    }
}

impl Database {
    /// Creates a database handle for `base_dir`. No I/O happens until
    /// [`init`](Database::init).
    #[must_use]
    pub fn new<P: AsRef<Path>>(base_dir: P, cfg: SmolConfig) -> Self {
        let (events_tx, events_rx) = std::sync::mpsc::channel();
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            cfg,
            collections: Arc::new(RwLock::new(HashMap::new())),
            shared: Arc::new(SharedState::new()),
            worker: None,
            events: Mutex::new(events_rx),
            events_tx,
            initialized: false,
        }
    }

    /// Initializes the database: creates the base directory, opens every
    /// collection found on disk (by scanning for `*.data` files), and
    /// spawns the background compaction worker when `gc_enabled`.
    pub fn init(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        // Pre-open collections that already exist on disk so they are
        // visible to list_collections and the GC worker right away.
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "data").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    found.push(stem.to_string());
                }
            }
        }
        self.initialized = true;
        for name in found {
            self.collection(&name)?;
        }

        if self.cfg.gc_enabled {
            self.worker = Some(GcWorker::spawn(
                Arc::clone(&self.shared),
                Arc::clone(&self.collections),
                self.cfg.gc_trigger_ratio,
                std::time::Duration::from_secs(5),
                self.events_tx.clone(),
            )?);
        }
        log::debug!(
            "database initialized at {} (gc {})",
            self.base_dir.display(),
            if self.cfg.gc_enabled { "on" } else { "off" }
        );
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    /// Returns the collection `name`, opening (and creating) it if needed.
    pub fn collection(&self, name: &str) -> Result<CollectionHandle> {
        self.ensure_initialized()?;
        validate_name(name)?;

        if let Some(existing) = lock_read(&self.collections).get(name) {
            return Ok(Arc::clone(existing));
        }

        let mut registry = lock_write(&self.collections);
        // Double-check: another caller may have opened it while we waited.
        if let Some(existing) = registry.get(name) {
            return Ok(Arc::clone(existing));
        }
        let col = Collection::open(name, &self.base_dir, Arc::clone(&self.shared), &self.cfg)?;
        let handle = Arc::new(RwLock::new(col));
        registry.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Names of every open collection, sorted.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.ensure_initialized()?;
        let mut names: Vec<String> = lock_read(&self.collections).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Drops a collection: removes it from the registry and deletes its
    /// data file, index file, and blob directory. Returns `false` if no
    /// such collection is open.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        self.ensure_initialized()?;
        let Some(handle) = lock_write(&self.collections).remove(name) else {
            return Ok(false);
        };
        // Take the write lock so no reader holds the dying files.
        drop(handle.write().unwrap_or_else(|e| e.into_inner()));

        let data = self.base_dir.join(format!("{}.data", name));
        let idx = self.base_dir.join(format!("{}.idx", name));
        let blobs = self.base_dir.join("blobs").join(name);
        if data.exists() {
            std::fs::remove_file(&data)?;
        }
        if idx.exists() {
            std::fs::remove_file(&idx)?;
        }
        if blobs.exists() {
            std::fs::remove_dir_all(&blobs)?;
        }
        Ok(true)
    }

    /// Compacts every open collection in the foreground, returning the
    /// total bytes freed.
    pub fn compact(&self) -> Result<u64> {
        self.ensure_initialized()?;
        let snapshot: Vec<CollectionHandle> =
            lock_read(&self.collections).values().cloned().collect();
        let mut freed = 0u64;
        for handle in snapshot {
            freed += handle
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .compact()?;
        }
        Ok(freed)
    }

    /// Asks the background worker to run a pass now (returns immediately).
    pub fn trigger_gc(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.shared.notify_command(CMD_TRIGGER_GC);
        Ok(())
    }

    /// Reads the worker's status cells.
    #[must_use]
    pub fn gc_status(&self) -> GcStatus {
        GcStatus {
            running: self.shared.load(Cell::GcStatus) == GC_RUNNING,
            progress: self.shared.load(Cell::GcProgress),
            bytes_freed: self.shared.load(Cell::GcBytesFreed),
        }
    }

    /// Persists the index file of every open collection.
    pub fn persist_all_indexes(&self) -> Result<()> {
        self.ensure_initialized()?;
        let snapshot: Vec<CollectionHandle> =
            lock_read(&self.collections).values().cloned().collect();
        for handle in snapshot {
            handle
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .persist_index()?;
        }
        Ok(())
    }

    /// Aggregate stats for every open collection plus the worker cells.
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.ensure_initialized()?;
        let snapshot: Vec<CollectionHandle> =
            lock_read(&self.collections).values().cloned().collect();
        let mut collections: Vec<CollectionStats> = snapshot
            .iter()
            .map(|h| h.read().unwrap_or_else(|e| e.into_inner()).stats())
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(DatabaseStats {
            collections,
            gc: self.gc_status(),
        })
    }

    /// Drains any error messages the background worker has reported.
    #[must_use]
    pub fn worker_events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_iter()
            .collect()
    }

    /// Shuts the database down: stops the worker, persists every index,
    /// and releases the collections. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown(&self.shared);
        }

        let snapshot: Vec<CollectionHandle> =
            lock_write(&self.collections).drain().map(|(_, h)| h).collect();
        for handle in snapshot {
            handle
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .close()?;
        }
        self.initialized = false;
        Ok(())
    }
}

/// Best-effort close on drop (worker shutdown + index persistence).
impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn lock_read(registry: &Registry) -> std::sync::RwLockReadGuard<'_, HashMap<String, CollectionHandle>> {
    registry.read().unwrap_or_else(|e| e.into_inner())
}

fn lock_write(
    registry: &Registry,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CollectionHandle>> {
    registry.write().unwrap_or_else(|e| e.into_inner())
}

/// Collection names become file names; keep them path-safe.
fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid collection name: {:?}", name),
        )))
    }
}

#[cfg(test)]
mod tests;
