//! # Index — primary and secondary indexes for one collection
//!
//! The primary index is the authoritative, insertion-stable map
//! `id → DocumentLocation`. Secondary indexes are inverted maps
//! `serialized value → set of ids`, one per dotted field path, supporting
//! equality filters only. Both persist together in a single binary `.idx`
//! file (see [`file`] for the layout) that is loaded and saved as a whole.
//!
//! ## Query planning
//!
//! [`IndexManager::plan`] intersects the posting lists of every indexed
//! filter key and reports whether the filter was *fully covered*. A fully
//! covered plan answers `find_ids` and `count` without a single document
//! read; a partial plan hands the coordinator a candidate set to validate
//! with [`codec::matches`].
//!
//! ## Dirtiness
//!
//! Every mutation sets a `dirty` flag; [`IndexManager::persist`] writes the
//! file and clears it. Nothing persists automatically — callers decide
//! (close, explicit persist, post-compaction).

mod file;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use storage::{DocumentLocation, Result};

/// Posting lists for one indexed field path: serialized value → ids.
pub(crate) type Postings = HashMap<Vec<u8>, HashSet<String>>;

/// The outcome of planning a filter against the secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// An indexed key asked for a value with no posting list: nothing can
    /// match, skip all I/O.
    Empty,
    /// Every filter key was indexed; the candidates are exact and need no
    /// validation.
    Covered(Vec<String>),
    /// The candidates (possibly the whole collection) must still be
    /// validated against the filter with a document read each.
    Scan(Vec<String>),
}

/// Primary + secondary indexes for a single collection.
///
/// Owned exclusively by the collection coordinator; the storage engine
/// knows nothing about ids, and this type knows nothing about slots beyond
/// the opaque [`DocumentLocation`].
#[derive(Debug)]
pub struct IndexManager {
    path: PathBuf,
    primary: IndexMap<String, DocumentLocation>,
    secondary: IndexMap<String, Postings>,
    dirty: bool,
}

impl IndexManager {
    /// Opens the index for `path` (`<collection>.idx`), loading the file if
    /// it exists and starting empty otherwise.
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            file::load(path)
        } else {
            Ok(Self {
                path: path.to_path_buf(),
                primary: IndexMap::new(),
                secondary: IndexMap::new(),
                dirty: false,
            })
        }
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        primary: IndexMap<String, DocumentLocation>,
        secondary: IndexMap<String, Postings>,
    ) -> Self {
        Self {
            path,
            primary,
            secondary,
            dirty: false,
        }
    }

    /// Looks up a document's current location.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DocumentLocation> {
        self.primary.get(id)
    }

    /// Returns `true` if `id` has a primary entry.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.primary.contains_key(id)
    }

    /// Number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Returns `true` if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.primary.keys().map(|k| k.as_str())
    }

    /// Snapshot of `(id, location)` pairs in insertion order — the shape
    /// [`storage::StorageEngine::compact`] consumes.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, DocumentLocation)> {
        self.primary
            .iter()
            .map(|(id, loc)| (id.clone(), *loc))
            .collect()
    }

    /// The dotted paths that currently have a secondary index, in creation
    /// order.
    #[must_use]
    pub fn indexed_paths(&self) -> Vec<String> {
        self.secondary.keys().cloned().collect()
    }

    /// Returns `true` if any mutation has not been persisted yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // --------------------- mutation hooks ---------------------

    /// Records a new document: sets the primary entry and inserts the id
    /// into every secondary index whose path is present in `doc`.
    pub fn on_add(&mut self, id: &str, location: DocumentLocation, doc: &Value) {
        self.primary.insert(id.to_string(), location);
        for (path, postings) in &mut self.secondary {
            if let Some(value) = codec::get_nested(doc, path) {
                postings
                    .entry(codec::serialize_index_value(Some(value)))
                    .or_default()
                    .insert(id.to_string());
            }
        }
        self.dirty = true;
    }

    /// Records a replacement: overwrites the primary entry and moves the id
    /// between posting lists wherever the indexed value changed.
    pub fn on_update(
        &mut self,
        id: &str,
        location: DocumentLocation,
        old_doc: &Value,
        new_doc: &Value,
    ) {
        self.primary.insert(id.to_string(), location);
        for (path, postings) in &mut self.secondary {
            let old_key = codec::get_nested(old_doc, path).map(|v| codec::serialize_index_value(Some(v)));
            let new_key = codec::get_nested(new_doc, path).map(|v| codec::serialize_index_value(Some(v)));
            if old_key == new_key {
                continue;
            }
            if let Some(key) = old_key {
                remove_posting(postings, &key, id);
            }
            if let Some(key) = new_key {
                postings.entry(key).or_default().insert(id.to_string());
            }
        }
        self.dirty = true;
    }

    /// Records a deletion: drops the primary entry and removes the id from
    /// every posting list it appears in.
    pub fn on_remove(&mut self, id: &str, old_doc: &Value) {
        // shift_remove keeps the remaining entries in insertion order.
        self.primary.shift_remove(id);
        for (path, postings) in &mut self.secondary {
            if let Some(value) = codec::get_nested(old_doc, path) {
                let key = codec::serialize_index_value(Some(value));
                remove_posting(postings, &key, id);
            }
        }
        self.dirty = true;
    }

    /// Creates a secondary index on `field_path`, scanning every live
    /// document through `read` to populate the posting lists.
    ///
    /// Idempotent: returns `Ok(false)` without scanning if the path is
    /// already indexed.
    pub fn create_index(
        &mut self,
        field_path: &str,
        mut read: impl FnMut(&DocumentLocation) -> Result<Value>,
    ) -> Result<bool> {
        if self.secondary.contains_key(field_path) {
            return Ok(false);
        }

        let mut postings = Postings::new();
        for (id, location) in &self.primary {
            let doc = read(location)?;
            if let Some(value) = codec::get_nested(&doc, field_path) {
                postings
                    .entry(codec::serialize_index_value(Some(value)))
                    .or_default()
                    .insert(id.clone());
            }
        }
        self.secondary.insert(field_path.to_string(), postings);
        self.dirty = true;
        Ok(true)
    }

    /// Swaps post-compaction locations into the primary index. Posting
    /// lists are untouched — compaction moves slots, not values.
    pub fn replace_locations(&mut self, new_locations: &[(String, DocumentLocation)]) {
        for (id, location) in new_locations {
            if let Some(slot) = self.primary.get_mut(id) {
                *slot = *location;
            }
        }
        self.dirty = true;
    }

    /// Empties the primary index and every posting list, keeping the set
    /// of indexed paths (clear drops documents, not index definitions).
    pub fn clear(&mut self) {
        self.primary.clear();
        for postings in self.secondary.values_mut() {
            postings.clear();
        }
        self.dirty = true;
    }

    // --------------------- query planning ---------------------

    /// Plans `filter` against the secondary indexes.
    ///
    /// For each filter key with a secondary index, the posting list for the
    /// serialized value is intersected into the candidate set; a missing
    /// posting list short-circuits to [`QueryPlan::Empty`]. Keys without an
    /// index mark the plan as not fully covered. If no key was indexed, the
    /// candidates are all primary ids.
    #[must_use]
    pub fn plan(&self, filter: &Map<String, Value>) -> QueryPlan {
        let mut candidates: Option<HashSet<String>> = None;
        let mut fully_covered = true;

        for (key, value) in filter {
            let Some(postings) = self.secondary.get(key) else {
                fully_covered = false;
                continue;
            };
            let serialized = codec::serialize_index_value(Some(value));
            let Some(posting) = postings.get(&serialized) else {
                return QueryPlan::Empty;
            };
            candidates = Some(match candidates {
                None => posting.clone(),
                Some(current) => {
                    // Intersect through the smaller side.
                    if current.len() <= posting.len() {
                        current
                            .into_iter()
                            .filter(|id| posting.contains(id))
                            .collect()
                    } else {
                        posting
                            .iter()
                            .filter(|id| current.contains(*id))
                            .cloned()
                            .collect()
                    }
                }
            });
        }

        match candidates {
            Some(set) if fully_covered => QueryPlan::Covered(set.into_iter().collect()),
            Some(set) => QueryPlan::Scan(set.into_iter().collect()),
            // No indexed key matched: fall back to scanning every document.
            None => QueryPlan::Scan(self.primary.keys().cloned().collect()),
        }
    }

    // --------------------- persistence ---------------------

    /// Writes the binary index file and clears the dirty flag. A clean
    /// index is a no-op.
    pub fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        file::save(&self.path, &self.primary, &self.secondary)?;
        self.dirty = false;
        Ok(())
    }

    /// Path of the `.idx` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn posting(&self, field_path: &str, value: &Value) -> Option<&HashSet<String>> {
        self.secondary
            .get(field_path)?
            .get(&codec::serialize_index_value(Some(value)))
    }

    #[cfg(test)]
    pub(crate) fn posting_count(&self, field_path: &str) -> usize {
        self.secondary.get(field_path).map_or(0, |p| p.len())
    }
}

/// Removes `id` from the posting list under `key`, dropping the list when
/// it becomes empty.
fn remove_posting(postings: &mut Postings, key: &[u8], id: &str) {
    if let Some(set) = postings.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            postings.remove(key);
        }
    }
}
