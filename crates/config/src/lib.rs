//! # Config — SmolDB tuning knobs
//!
//! A plain options struct shared by the storage engine, the collection
//! coordinator, and the database object. Construct with
//! [`SmolConfig::default`] and override fields as needed:
//!
//! ```rust
//! use config::SmolConfig;
//!
//! let cfg = SmolConfig {
//!     cache_size: 256,
//!     ..SmolConfig::default()
//! };
//! assert!(cfg.gc_enabled);
//! ```

/// Default garbage-collection trigger ratio (`file_size / live_data_size`).
pub const DEFAULT_GC_TRIGGER_RATIO: f64 = 2.0;

/// Default blob threshold: documents whose JSON encoding exceeds this many
/// bytes are stored as standalone blob files (1 MiB).
pub const DEFAULT_BLOB_THRESHOLD: usize = 1024 * 1024;

/// Default upper bound on a single document's JSON encoding (256 MiB).
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 256 * 1024 * 1024;

/// Database-wide configuration.
#[derive(Debug, Clone)]
pub struct SmolConfig {
    /// Run the background compaction worker. When `false`, compaction only
    /// happens through explicit `compact` calls.
    pub gc_enabled: bool,
    /// Auto-compaction fires when `file_size / live_data_size` exceeds this
    /// ratio for any collection.
    pub gc_trigger_ratio: f64,
    /// Documents whose JSON encoding exceeds this many bytes are routed to
    /// the blob path (standalone file + reference slot).
    pub blob_threshold: usize,
    /// Per-collection read-cache capacity in documents. `0` disables the
    /// cache entirely.
    pub cache_size: usize,
    /// Hard upper bound on a single document's JSON encoding.
    pub max_document_size: usize,
}

impl Default for SmolConfig {
    fn default() -> Self {
        Self {
            gc_enabled: true,
            gc_trigger_ratio: DEFAULT_GC_TRIGGER_RATIO,
            blob_threshold: DEFAULT_BLOB_THRESHOLD,
            cache_size: 0,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SmolConfig::default();
        assert!(cfg.gc_enabled);
        assert_eq!(cfg.gc_trigger_ratio, 2.0);
        assert_eq!(cfg.blob_threshold, 1024 * 1024);
        assert_eq!(cfg.cache_size, 0);
        assert_eq!(cfg.max_document_size, 256 * 1024 * 1024);
    }
}
