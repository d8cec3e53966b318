use crate::{SharedState, StorageEngine};
use config::SmolConfig;
use std::path::Path;
use std::sync::Arc;

/// Opens an engine for a collection named "test" under `dir`.
pub fn open_engine(dir: &Path) -> StorageEngine {
    open_engine_with(dir, SmolConfig::default())
}

/// Opens an engine with a custom config (e.g. a tiny blob threshold).
pub fn open_engine_with(dir: &Path, cfg: SmolConfig) -> StorageEngine {
    StorageEngine::open(
        &dir.join("test.data"),
        &dir.join("blobs").join("test"),
        Arc::new(SharedState::new()),
        &cfg,
    )
    .expect("open engine")
}

/// A document whose JSON encoding is close to `target` bytes.
pub fn doc_of_size(target: usize) -> serde_json::Value {
    // {"content":"xxx..."} carries 14 bytes of framing.
    let fill = target.saturating_sub(14);
    serde_json::json!({ "content": "x".repeat(fill) })
}
