use crate::Collection;
use config::SmolConfig;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use storage::SharedState;

mod query_tests;
mod scenario_tests;

pub fn open_collection(dir: &Path) -> Collection {
    open_collection_with(dir, SmolConfig::default())
}

pub fn open_collection_with(dir: &Path, cfg: SmolConfig) -> Collection {
    Collection::open("users", dir, Arc::new(SharedState::new()), &cfg).expect("open collection")
}

pub fn filter(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}
