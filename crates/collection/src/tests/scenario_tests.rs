use super::{filter, open_collection, open_collection_with};
use config::SmolConfig;
use serde_json::json;
use storage::Result;
use tempfile::tempdir;

// --------------------- compaction reclaim ---------------------

#[test]
fn compaction_reclaims_space_and_keeps_documents() -> Result<()> {
    let dir = tempdir()?;
    let mut users = open_collection(dir.path());

    // Ten tiny documents, all in the 1 KiB class.
    let fill = "x".repeat(100);
    for i in 0..10 {
        users.insert(&format!("doc_{}", i), &json!({"n": i, "fill": fill}))?;
    }
    for i in (1..10).step_by(2) {
        users.delete(&format!("doc_{}", i))?;
    }

    let pre = users.stats().storage.file_size;
    let freed = users.compact()?;

    assert!(freed > 0);
    let stats = users.stats().storage;
    assert!(stats.file_size < pre);
    assert_eq!(stats.file_size, 64 + 5 * 1024);
    assert_eq!(stats.document_count, 5);

    for i in (0..10).step_by(2) {
        assert_eq!(
            users.get(&format!("doc_{}", i))?,
            Some(json!({"n": i, "fill": fill}))
        );
    }
    Ok(())
}

// --------------------- blob transitions ---------------------

fn blob_file_count(dir: &std::path::Path) -> usize {
    let blob_dir = dir.join("blobs").join("users");
    if !blob_dir.exists() {
        return 0;
    }
    std::fs::read_dir(blob_dir).unwrap().count()
}

#[test]
fn blob_boundary_transitions() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SmolConfig {
        blob_threshold: 1024,
        ..SmolConfig::default()
    };
    let mut users = open_collection_with(dir.path(), cfg);

    // Over the threshold: a blob file appears.
    let big = json!({"content": "x".repeat(2000)});
    users.insert("doc", &big)?;
    assert_eq!(blob_file_count(dir.path()), 1);
    assert_eq!(users.get("doc")?, Some(big));

    // Still a blob: the same file is overwritten.
    let bigger = json!({"content": "y".repeat(3000)});
    users.update("doc", &bigger)?;
    assert_eq!(blob_file_count(dir.path()), 1);
    assert_eq!(users.get("doc")?, Some(bigger));

    // Under the threshold: the blob file disappears.
    let small = json!({"content": "z"});
    users.update("doc", &small)?;
    assert_eq!(blob_file_count(dir.path()), 0);
    assert_eq!(users.get("doc")?, Some(small));
    Ok(())
}

#[test]
fn blob_content_is_identical_across_the_crossing() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SmolConfig {
        blob_threshold: 1024,
        ..SmolConfig::default()
    };
    let mut users = open_collection_with(dir.path(), cfg);

    // Grow the same document across the boundary and back; get() must
    // track exactly.
    let sizes = [500usize, 1500, 900];
    users.insert("doc", &json!({"content": "a".repeat(sizes[0])}))?;
    for &n in &sizes[1..] {
        let doc = json!({"content": "a".repeat(n)});
        users.update("doc", &doc)?;
        assert_eq!(users.get("doc")?, Some(doc));
    }
    assert_eq!(blob_file_count(dir.path()), 0);
    Ok(())
}

#[test]
fn deleted_blobs_leave_no_files_behind() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SmolConfig {
        blob_threshold: 1024,
        ..SmolConfig::default()
    };
    let mut users = open_collection_with(dir.path(), cfg);

    users.insert("doc", &json!({"content": "x".repeat(5000)}))?;
    assert_eq!(blob_file_count(dir.path()), 1);

    assert!(users.delete("doc")?);
    assert_eq!(blob_file_count(dir.path()), 0);
    assert_eq!(users.stats().storage.live_data_size, 0);
    Ok(())
}

#[test]
fn indexed_blob_documents_answer_filters() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SmolConfig {
        blob_threshold: 1024,
        ..SmolConfig::default()
    };
    let mut users = open_collection_with(dir.path(), cfg);
    users.create_index("kind")?;

    users.insert("big", &json!({"kind": "blob", "content": "x".repeat(4000)}))?;
    users.insert("small", &json!({"kind": "inline"}))?;

    assert_eq!(users.find_ids(&filter(json!({"kind": "blob"})))?, ["big"]);
    let hits = users.find(&filter(json!({"kind": "blob"})))?;
    assert_eq!(hits[0].1["content"].as_str().unwrap().len(), 4000);
    Ok(())
}
