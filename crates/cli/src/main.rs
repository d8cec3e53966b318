//! # CLI — SmolDB interactive shell
//!
//! A REPL-style command-line interface for the SmolDB document store.
//! Reads commands from stdin, executes them against the database, and
//! prints results to stdout. Designed for both interactive use and
//! scripted testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! USE name              Switch the current collection (default: "default")
//! INSERT id {json}      Insert a document
//! UPSERT id {json}      Insert or replace a document
//! UPDATE id {json}      Replace an existing document
//! GET id                Print a document (or "(nil)")
//! DEL id                Delete a document
//! HAS id                Check existence
//! KEYS                  List ids in insertion order
//! FIND {json}           Documents matching an equality filter
//! IDS {json}            Ids matching an equality filter
//! COUNT [{json}]        Count documents (optionally filtered)
//! INDEX path            Create a secondary index on a dotted path
//! INDEXES               List indexed paths
//! COLLECTIONS           List collections
//! DROP name             Drop a collection and its files
//! CLEAR                 Remove every document (keeps index definitions)
//! COMPACT               Compact the current collection
//! GC                    Trigger a background GC pass
//! GCSTATUS              Print the worker cells
//! PERSIST               Persist every index file
//! STATS                 Print database stats
//! EXIT / QUIT           Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! SMOLDB_DATA_DIR        Base directory                   (default: "data")
//! SMOLDB_GC              Background worker on/off         (default: "true")
//! SMOLDB_GC_RATIO        Auto-compaction trigger ratio    (default: "2.0")
//! SMOLDB_BLOB_THRESHOLD  Blob threshold in bytes          (default: 1048576)
//! SMOLDB_CACHE_SIZE      Read-cache capacity, 0 = off     (default: "0")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! SmolDB started (dir=data, gc=true, blob_threshold=1048576, cache=0)
//! > INSERT user_1 {"name":"Alice","role":"admin"}
//! OK
//! > INDEX role
//! OK
//! > IDS {"role":"admin"}
//! user_1
//! (1 ids)
//! > EXIT
//! bye
//! ```
use anyhow::Result;
use config::SmolConfig;
use serde_json::Value;
use smoldb::Database;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses a JSON object argument, complaining unless it is an object.
fn parse_object(raw: &str) -> Result<serde_json::Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let data_dir = env_or("SMOLDB_DATA_DIR", "data");
    let gc_enabled: bool = env_or("SMOLDB_GC", "true").parse().unwrap_or(true);
    let gc_trigger_ratio: f64 = env_or("SMOLDB_GC_RATIO", "2.0").parse().unwrap_or(2.0);
    let blob_threshold: usize = env_or("SMOLDB_BLOB_THRESHOLD", "1048576")
        .parse()
        .unwrap_or(1024 * 1024);
    let cache_size: usize = env_or("SMOLDB_CACHE_SIZE", "0").parse().unwrap_or(0);

    let cfg = SmolConfig {
        gc_enabled,
        gc_trigger_ratio,
        blob_threshold,
        cache_size,
        ..SmolConfig::default()
    };

    let mut db = Database::new(&data_dir, cfg);
    db.init()?;

    let mut current = "default".to_string();

    println!(
        "SmolDB started (dir={}, gc={}, blob_threshold={}, cache={})",
        data_dir, gc_enabled, blob_threshold, cache_size
    );
    println!("Commands: USE name | INSERT id json | GET id | DEL id | FIND json");
    println!("          COUNT [json] | INDEX path | COMPACT | GC | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        let mut parts = trimmed.splitn(3, char::is_whitespace);
        if let Some(cmd) = parts.next().filter(|c| !c.is_empty()) {
            let arg1 = parts.next().unwrap_or("").trim();
            let rest = parts.next().unwrap_or("").trim();

            match cmd.to_uppercase().as_str() {
                "USE" => {
                    if arg1.is_empty() {
                        println!("ERR usage: USE name");
                    } else {
                        match db.collection(arg1) {
                            Ok(_) => {
                                current = arg1.to_string();
                                println!("OK ({})", current);
                            }
                            Err(e) => println!("ERR use failed: {}", e),
                        }
                    }
                }
                verb @ ("INSERT" | "UPSERT" | "UPDATE") => {
                    if arg1.is_empty() || rest.is_empty() {
                        println!("ERR usage: {} id json", verb);
                    } else {
                        match serde_json::from_str::<Value>(rest) {
                            Ok(doc) => {
                                let result = db.collection(&current).and_then(|col| {
                                    let mut col = col.write().unwrap();
                                    match verb {
                                        "INSERT" => col.insert(arg1, &doc),
                                        "UPSERT" => col.upsert(arg1, &doc),
                                        _ => col.update(arg1, &doc),
                                    }
                                });
                                match result {
                                    Ok(()) => println!("OK"),
                                    Err(e) => println!("ERR write failed: {}", e),
                                }
                            }
                            Err(e) => println!("ERR invalid JSON: {}", e),
                        }
                    }
                }
                "GET" => {
                    if arg1.is_empty() {
                        println!("ERR usage: GET id");
                    } else {
                        match db
                            .collection(&current)
                            .and_then(|col| col.read().unwrap().get(arg1))
                        {
                            Ok(Some(doc)) => println!("{}", doc),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    }
                }
                "DEL" => {
                    if arg1.is_empty() {
                        println!("ERR usage: DEL id");
                    } else {
                        match db
                            .collection(&current)
                            .and_then(|col| col.write().unwrap().delete(arg1))
                        {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(nil)"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    }
                }
                "HAS" => {
                    if arg1.is_empty() {
                        println!("ERR usage: HAS id");
                    } else {
                        match db.collection(&current) {
                            Ok(col) => println!("{}", col.read().unwrap().has(arg1)),
                            Err(e) => println!("ERR has failed: {}", e),
                        }
                    }
                }
                "KEYS" => match db.collection(&current) {
                    Ok(col) => {
                        let keys = col.read().unwrap().keys();
                        for key in &keys {
                            println!("{}", key);
                        }
                        println!("({} keys)", keys.len());
                    }
                    Err(e) => println!("ERR keys failed: {}", e),
                },
                verb @ ("FIND" | "IDS") => {
                    let raw = if rest.is_empty() {
                        arg1.to_string()
                    } else {
                        format!("{} {}", arg1, rest)
                    };
                    match parse_object(&raw) {
                        Ok(filter) => match db.collection(&current) {
                            Ok(col) => {
                                let col = col.read().unwrap();
                                if verb == "FIND" {
                                    match col.find(&filter) {
                                        Ok(hits) => {
                                            for (id, doc) in &hits {
                                                println!("{} -> {}", id, doc);
                                            }
                                            println!("({} documents)", hits.len());
                                        }
                                        Err(e) => println!("ERR find failed: {}", e),
                                    }
                                } else {
                                    match col.find_ids(&filter) {
                                        Ok(mut ids) => {
                                            ids.sort();
                                            for id in &ids {
                                                println!("{}", id);
                                            }
                                            println!("({} ids)", ids.len());
                                        }
                                        Err(e) => println!("ERR ids failed: {}", e),
                                    }
                                }
                            }
                            Err(e) => println!("ERR find failed: {}", e),
                        },
                        Err(msg) => println!("ERR {}", msg),
                    }
                }
                "COUNT" => {
                    let raw = if rest.is_empty() {
                        arg1.to_string()
                    } else {
                        format!("{} {}", arg1, rest)
                    };
                    let parsed = if raw.is_empty() {
                        Ok(None)
                    } else {
                        parse_object(&raw).map(Some)
                    };
                    match parsed {
                        Ok(filter) => {
                            match db
                                .collection(&current)
                                .and_then(|col| col.read().unwrap().count(filter.as_ref()))
                            {
                                Ok(n) => println!("{}", n),
                                Err(e) => println!("ERR count failed: {}", e),
                            }
                        }
                        Err(msg) => println!("ERR {}", msg),
                    }
                }
                "INDEX" => {
                    if arg1.is_empty() {
                        println!("ERR usage: INDEX path");
                    } else {
                        match db
                            .collection(&current)
                            .and_then(|col| col.write().unwrap().create_index(arg1))
                        {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("OK (already indexed)"),
                            Err(e) => println!("ERR index failed: {}", e),
                        }
                    }
                }
                "INDEXES" => match db.collection(&current) {
                    Ok(col) => {
                        for path in col.read().unwrap().get_indexes() {
                            println!("{}", path);
                        }
                    }
                    Err(e) => println!("ERR indexes failed: {}", e),
                },
                "COLLECTIONS" => match db.list_collections() {
                    Ok(names) => {
                        for name in &names {
                            println!("{}", name);
                        }
                        println!("({} collections)", names.len());
                    }
                    Err(e) => println!("ERR collections failed: {}", e),
                },
                "DROP" => {
                    if arg1.is_empty() {
                        println!("ERR usage: DROP name");
                    } else {
                        match db.drop_collection(arg1) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(nil)"),
                            Err(e) => println!("ERR drop failed: {}", e),
                        }
                    }
                }
                "CLEAR" => match db
                    .collection(&current)
                    .and_then(|col| col.write().unwrap().clear())
                {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR clear failed: {}", e),
                },
                "COMPACT" => match db
                    .collection(&current)
                    .and_then(|col| col.write().unwrap().compact())
                {
                    Ok(freed) => println!("OK ({} bytes freed)", freed),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "GC" => match db.trigger_gc() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR gc failed: {}", e),
                },
                "GCSTATUS" => {
                    let status = db.gc_status();
                    println!(
                        "running={} progress={} bytes_freed={}",
                        status.running, status.progress, status.bytes_freed
                    );
                    for event in db.worker_events() {
                        println!("event: {}", event);
                    }
                }
                "PERSIST" => match db.persist_all_indexes() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR persist failed: {}", e),
                },
                "STATS" => match db.stats() {
                    Ok(stats) => {
                        for col in &stats.collections {
                            println!(
                                "{}: docs={} file={}B live={}B free_slots={} indexes={:?}",
                                col.name,
                                col.storage.document_count,
                                col.storage.file_size,
                                col.storage.live_data_size,
                                col.storage.free_slots,
                                col.indexed_paths,
                            );
                        }
                    }
                    Err(e) => println!("ERR stats failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    db.close()?;
    Ok(())
}
