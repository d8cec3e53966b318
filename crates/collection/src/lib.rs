//! # Collection — the coordinator tying storage to indexes
//!
//! One `Collection` owns one [`StorageEngine`], one [`IndexManager`], and an
//! optional read cache, and threads secondary-index maintenance through
//! every mutation so invariant "id appears in a posting list iff the
//! current document carries that value" holds at all times.
//!
//! ## Data flow
//!
//! ```text
//! insert/update/delete
//!   -> duplicate / existence check against the primary index
//!   -> storage write (slab alloc, slot write, counters)
//!   -> index hooks (primary + every secondary)
//!   -> cache update / invalidation
//!
//! get            -> cache -> primary index -> CRC-checked slot read
//! find / count   -> query plan -> [document reads only if not covered]
//! ```
//!
//! Mutations take `&mut self`; the database wraps each collection in an
//! `RwLock`, whose write guard is the per-collection write lock. Reads
//! (`get`, `find`, …) take `&self` and run under a read guard.

mod cache;

pub use cache::{CacheStats, ReadCache};

use config::SmolConfig;
use serde_json::{Map, Value};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use index::{IndexManager, QueryPlan};
use storage::{Result, SharedState, StorageEngine, StorageError, StorageStats};

/// One mutation inside a [`Collection::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Insert { id: String, doc: Value },
    Update { id: String, doc: Value },
    Delete { id: String },
}

/// Point-in-time view of a collection, embedding the storage counters.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub storage: StorageStats,
    pub indexed_paths: Vec<String>,
    pub cache: Option<CacheStats>,
}

/// A named set of documents: storage engine + indexes + optional cache.
pub struct Collection {
    name: String,
    storage: StorageEngine,
    index: IndexManager,
    /// `None` when `cache_size` is 0. The mutex gives `get` (which takes
    /// `&self` under the database's read guard) interior mutability for
    /// LRU promotion.
    cache: Option<Mutex<ReadCache>>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("documents", &self.index.len())
            .field("indexed_paths", &self.index.indexed_paths())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl Collection {
    /// Opens the collection `name` under `base_dir`: data file
    /// `<base>/<name>.data`, index file `<base>/<name>.idx`, blobs under
    /// `<base>/blobs/<name>/`.
    pub fn open(
        name: &str,
        base_dir: &Path,
        shared: Arc<SharedState>,
        cfg: &SmolConfig,
    ) -> Result<Self> {
        let data_path = base_dir.join(format!("{}.data", name));
        let index_path = base_dir.join(format!("{}.idx", name));
        let blob_dir = base_dir.join("blobs").join(name);

        let storage = StorageEngine::open(&data_path, &blob_dir, shared, cfg)?;
        let index = IndexManager::open(&index_path)?;
        let cache = NonZeroUsize::new(cfg.cache_size).map(|cap| Mutex::new(ReadCache::new(cap)));

        Ok(Self {
            name: name.to_string(),
            storage,
            index,
            cache,
        })
    }

    /// The collection's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // --------------------- mutations ---------------------

    /// Inserts a new document under `id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateId`] if the id already exists.
    pub fn insert(&mut self, id: &str, doc: &Value) -> Result<()> {
        if self.index.contains(id) {
            return Err(StorageError::DuplicateId(id.to_string()));
        }
        let location = self.storage.write(id, doc)?;
        self.index.on_add(id, location, doc);
        self.cache_put(id, doc);
        Ok(())
    }

    /// Replaces the document under `id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::DocumentNotFound`] if the id does not exist.
    pub fn update(&mut self, id: &str, doc: &Value) -> Result<()> {
        let Some(old_location) = self.index.get(id).copied() else {
            return Err(StorageError::DocumentNotFound(id.to_string()));
        };
        // Posting-list maintenance needs the outgoing values; skip the read
        // when nothing is indexed.
        let old_doc = if self.index.indexed_paths().is_empty() {
            Value::Null
        } else {
            self.storage.read_document(&old_location)?
        };
        let location = self.storage.update(id, doc, &old_location)?;
        self.index.on_update(id, location, &old_doc, doc);
        self.cache_put(id, doc);
        Ok(())
    }

    /// Inserts or replaces, depending on whether `id` exists.
    pub fn upsert(&mut self, id: &str, doc: &Value) -> Result<()> {
        if self.index.contains(id) {
            self.update(id, doc)
        } else {
            self.insert(id, doc)
        }
    }

    /// Deletes the document under `id`. Returns `false` (without error) if
    /// the id does not exist.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(location) = self.index.get(id).copied() else {
            return Ok(false);
        };
        let old_doc = if self.index.indexed_paths().is_empty() {
            Value::Null
        } else {
            self.storage.read_document(&location)?
        };
        self.storage.delete(&location)?;
        self.index.on_remove(id, &old_doc);
        self.cache_remove(id);
        Ok(true)
    }

    /// Applies a sequence of mutations under one metadata flush.
    ///
    /// The storage batch defers the header write and shared-state publish
    /// to the end; index hooks still run per operation, so readers under
    /// their own guard never observe a slot/index mismatch.
    pub fn batch(&mut self, ops: Vec<BatchOp>) -> Result<()> {
        let Self {
            storage,
            index,
            cache,
            ..
        } = self;
        storage.batch(|engine| {
            for op in ops {
                match op {
                    BatchOp::Insert { id, doc } => {
                        if index.contains(&id) {
                            return Err(StorageError::DuplicateId(id));
                        }
                        let location = engine.write(&id, &doc)?;
                        index.on_add(&id, location, &doc);
                        cache_put_in(cache, &id, &doc);
                    }
                    BatchOp::Update { id, doc } => {
                        let Some(old_location) = index.get(&id).copied() else {
                            return Err(StorageError::DocumentNotFound(id));
                        };
                        let old_doc = if index.indexed_paths().is_empty() {
                            Value::Null
                        } else {
                            engine.read_document(&old_location)?
                        };
                        let location = engine.update(&id, &doc, &old_location)?;
                        index.on_update(&id, location, &old_doc, &doc);
                        cache_put_in(cache, &id, &doc);
                    }
                    BatchOp::Delete { id } => {
                        let Some(location) = index.get(&id).copied() else {
                            continue;
                        };
                        let old_doc = if index.indexed_paths().is_empty() {
                            Value::Null
                        } else {
                            engine.read_document(&location)?
                        };
                        engine.delete(&location)?;
                        index.on_remove(&id, &old_doc);
                        cache_remove_in(cache, &id);
                    }
                }
            }
            Ok(())
        })
    }

    /// Bulk insert. Uses the storage engine's contiguous-run fast path;
    /// duplicate ids (against the collection or within `items`) are
    /// rejected before anything is written.
    pub fn insert_many(&mut self, items: &[(String, Value)]) -> Result<()> {
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        for (id, _) in items {
            if self.index.contains(id) || !seen.insert(id.as_str()) {
                return Err(StorageError::DuplicateId(id.clone()));
            }
        }

        let locations = self.storage.write_many(items)?;
        for ((id, doc), location) in items.iter().zip(locations) {
            self.index.on_add(id, location, doc);
            self.cache_put(id, doc);
        }
        Ok(())
    }

    // --------------------- reads ---------------------

    /// Looks up a document by id, consulting the cache first.
    pub fn get(&self, id: &str) -> Result<Option<Value>> {
        if let Some(doc) = self.cache_get(id) {
            return Ok(Some(doc));
        }
        let Some(location) = self.index.get(id) else {
            return Ok(None);
        };
        let doc = self.storage.read_document(location)?;
        self.cache_put(id, &doc);
        Ok(Some(doc))
    }

    /// Returns `true` if `id` exists. No document read.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// All ids in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.index.ids().map(str::to_string).collect()
    }

    /// Every `(id, document)` pair in insertion order.
    pub fn get_all(&self) -> Result<Vec<(String, Value)>> {
        self.index
            .entries()
            .into_iter()
            .map(|(id, location)| Ok((id, self.storage.read_document(&location)?)))
            .collect()
    }

    /// Lazily iterates `(id, document)` pairs over a snapshot of the ids.
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, Value)>> + '_ {
        self.index
            .entries()
            .into_iter()
            .map(move |(id, location)| Ok((id, self.storage.read_document(&location)?)))
    }

    /// Counts documents matching `filter` (all documents when `None` or
    /// empty). A fully covered filter is answered from the indexes with
    /// zero document reads.
    pub fn count(&self, filter: Option<&Map<String, Value>>) -> Result<usize> {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(self.index.len());
        };
        match self.index.plan(filter) {
            QueryPlan::Empty => Ok(0),
            QueryPlan::Covered(ids) => Ok(ids.len()),
            QueryPlan::Scan(ids) => {
                let mut n = 0;
                for id in &ids {
                    if let Some(location) = self.index.get(id) {
                        if codec::matches(&self.storage.read_document(location)?, filter) {
                            n += 1;
                        }
                    }
                }
                Ok(n)
            }
        }
    }

    /// Returns the ids matching `filter`. Zero document reads when the
    /// filter is fully covered by secondary indexes.
    pub fn find_ids(&self, filter: &Map<String, Value>) -> Result<Vec<String>> {
        if filter.is_empty() {
            return Ok(self.keys());
        }
        match self.index.plan(filter) {
            QueryPlan::Empty => Ok(Vec::new()),
            QueryPlan::Covered(ids) => Ok(ids),
            QueryPlan::Scan(ids) => {
                let mut out = Vec::new();
                for id in ids {
                    if let Some(location) = self.index.get(&id) {
                        if codec::matches(&self.storage.read_document(location)?, filter) {
                            out.push(id);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Returns the `(id, document)` pairs matching `filter`.
    pub fn find(&self, filter: &Map<String, Value>) -> Result<Vec<(String, Value)>> {
        if filter.is_empty() {
            return self.get_all();
        }
        match self.index.plan(filter) {
            QueryPlan::Empty => Ok(Vec::new()),
            QueryPlan::Covered(ids) => ids
                .into_iter()
                .filter_map(|id| {
                    let location = self.index.get(&id)?;
                    Some(self.storage.read_document(location).map(|doc| (id, doc)))
                })
                .collect(),
            QueryPlan::Scan(ids) => {
                let mut out = Vec::new();
                for id in ids {
                    if let Some(location) = self.index.get(&id) {
                        let doc = self.storage.read_document(location)?;
                        if codec::matches(&doc, filter) {
                            out.push((id, doc));
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Returns the first match for `filter`, if any.
    pub fn find_one(&self, filter: &Map<String, Value>) -> Result<Option<(String, Value)>> {
        Ok(self.find(filter)?.into_iter().next())
    }

    // --------------------- indexes ---------------------

    /// Creates a secondary index on the dotted `field_path`, scanning every
    /// live document. Idempotent; returns whether an index was created.
    pub fn create_index(&mut self, field_path: &str) -> Result<bool> {
        let storage = &self.storage;
        self.index
            .create_index(field_path, |location| storage.read_document(location))
    }

    /// The dotted paths currently carrying a secondary index.
    #[must_use]
    pub fn get_indexes(&self) -> Vec<String> {
        self.index.indexed_paths()
    }

    /// Writes the index file if any mutation is unpersisted.
    pub fn persist_index(&mut self) -> Result<()> {
        self.index.persist()
    }

    // --------------------- maintenance ---------------------

    /// Removes every document but keeps the secondary-index definitions.
    pub fn clear(&mut self) -> Result<()> {
        self.storage.reset()?;
        self.storage.remove_blob_dir()?;
        self.index.clear();
        self.cache_purge();
        Ok(())
    }

    /// Full reset: like [`clear`](Collection::clear) but also drops the
    /// secondary-index definitions and the on-disk index file.
    pub fn reset(&mut self) -> Result<()> {
        self.storage.reset()?;
        self.storage.remove_blob_dir()?;
        let index_path = self.index.path().to_path_buf();
        if index_path.exists() {
            std::fs::remove_file(&index_path)?;
        }
        self.index = IndexManager::open(&index_path)?;
        self.cache_purge();
        Ok(())
    }

    /// Compacts the data file, swaps the fresh locations into the primary
    /// index, and persists the index file. Returns the bytes freed.
    pub fn compact(&mut self) -> Result<u64> {
        let entries = self.index.entries();
        let result = self.storage.compact(&entries)?;
        self.index.replace_locations(&result.new_locations);
        self.index.persist()?;
        Ok(result.bytes_freed)
    }

    /// Current stats snapshot.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            name: self.name.clone(),
            storage: self.storage.stats(),
            indexed_paths: self.index.indexed_paths(),
            cache: self.cache.as_ref().map(|c| lock_cache(c).stats()),
        }
    }

    /// Persists the index and purges the cache ahead of shutdown. The
    /// storage header flushes on drop.
    pub fn close(&mut self) -> Result<()> {
        self.index.persist()?;
        self.cache_purge();
        Ok(())
    }

    // --------------------- cache plumbing ---------------------

    fn cache_get(&self, id: &str) -> Option<Value> {
        self.cache.as_ref().and_then(|c| lock_cache(c).get(id))
    }

    fn cache_put(&self, id: &str, doc: &Value) {
        cache_put_in(&self.cache, id, doc);
    }

    fn cache_remove(&self, id: &str) {
        cache_remove_in(&self.cache, id);
    }

    fn cache_purge(&self) {
        if let Some(c) = &self.cache {
            lock_cache(c).purge();
        }
    }
}

fn lock_cache(cache: &Mutex<ReadCache>) -> std::sync::MutexGuard<'_, ReadCache> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

fn cache_put_in(cache: &Option<Mutex<ReadCache>>, id: &str, doc: &Value) {
    if let Some(c) = cache {
        lock_cache(c).put(id, doc.clone());
    }
}

fn cache_remove_in(cache: &Option<Mutex<ReadCache>>, id: &str) {
    if let Some(c) = cache {
        lock_cache(c).remove(id);
    }
}

#[cfg(test)]
mod tests;
