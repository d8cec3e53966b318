use super::{filter, open_collection};
use serde_json::json;
use storage::Result;
use tempfile::tempdir;

fn seeded(dir: &std::path::Path) -> crate::Collection {
    let mut users = open_collection(dir);
    users.create_index("role").unwrap();
    users.create_index("active").unwrap();
    users
        .insert("user_1", &json!({"role": "admin", "active": true}))
        .unwrap();
    users
        .insert("user_2", &json!({"role": "admin", "active": false}))
        .unwrap();
    users
        .insert("user_3", &json!({"role": "user", "active": true}))
        .unwrap();
    users
}

// --------------------- indexed intersection ---------------------

#[test]
fn find_intersects_posting_lists() -> Result<()> {
    let dir = tempdir()?;
    let users = seeded(dir.path());

    let hits = users.find(&filter(json!({"role": "admin", "active": true})))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "user_1");
    assert_eq!(hits[0].1, json!({"role": "admin", "active": true}));

    assert_eq!(users.count(Some(&filter(json!({"role": "admin"}))))?, 2);

    let mut ids = users.find_ids(&filter(json!({"role": "admin"})))?;
    ids.sort();
    assert_eq!(ids, ["user_1", "user_2"]);
    Ok(())
}

#[test]
fn find_one_returns_a_single_match() -> Result<()> {
    let dir = tempdir()?;
    let users = seeded(dir.path());

    let one = users.find_one(&filter(json!({"role": "user"})))?;
    assert_eq!(one.map(|(id, _)| id), Some("user_3".to_string()));
    assert_eq!(users.find_one(&filter(json!({"role": "nobody"})))?, None);
    Ok(())
}

#[test]
fn unmatchable_indexed_value_is_empty_without_io() -> Result<()> {
    let dir = tempdir()?;
    let users = seeded(dir.path());

    let before = users.stats().storage.slot_reads;
    assert_eq!(users.count(Some(&filter(json!({"role": "nobody"}))))?, 0);
    assert!(users.find(&filter(json!({"role": "nobody"})))?.is_empty());
    assert_eq!(users.stats().storage.slot_reads, before);
    Ok(())
}

// --------------------- index-only queries (no document reads) ---------------------

#[test]
fn covered_count_and_find_ids_do_zero_document_reads() -> Result<()> {
    let dir = tempdir()?;
    let users = seeded(dir.path());

    let before = users.stats().storage.slot_reads;

    assert_eq!(users.count(Some(&filter(json!({"role": "admin"}))))?, 2);
    assert_eq!(
        users.count(Some(&filter(json!({"role": "admin", "active": true}))))?,
        1
    );
    let mut ids = users.find_ids(&filter(json!({"role": "admin", "active": false})))?;
    ids.sort();
    assert_eq!(ids, ["user_2"]);

    assert_eq!(
        users.stats().storage.slot_reads,
        before,
        "covered queries must not touch the data file"
    );
    Ok(())
}

#[test]
fn partially_covered_queries_read_only_candidates() -> Result<()> {
    let dir = tempdir()?;
    let mut users = seeded(dir.path());
    users.insert("user_4", &json!({"role": "user", "active": false, "name": "Dana"}))?;

    let before = users.stats().storage.slot_reads;
    // "name" is unindexed; "role" narrows the candidates to two documents.
    let ids = users.find_ids(&filter(json!({"role": "user", "name": "Dana"})))?;
    assert_eq!(ids, ["user_4"]);

    let reads = users.stats().storage.slot_reads - before;
    assert_eq!(reads, 2, "only the role=user candidates are read");
    Ok(())
}

// --------------------- nested paths ---------------------

#[test]
fn nested_path_index() -> Result<()> {
    let dir = tempdir()?;
    let mut users = open_collection(dir.path());
    users.create_index("profile.country")?;

    users.insert("us_1", &json!({"profile": {"country": "US"}}))?;
    users.insert("us_2", &json!({"profile": {"country": "US"}}))?;
    users.insert("de_1", &json!({"profile": {"country": "DE"}}))?;
    users.insert("none", &json!({"name": "stateless"}))?;

    let mut ids = users.find_ids(&filter(json!({"profile.country": "US"})))?;
    ids.sort();
    assert_eq!(ids, ["us_1", "us_2"]);

    let hits = users.find(&filter(json!({"profile.country": "DE"})))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "de_1");
    Ok(())
}

// --------------------- index maintenance through mutations ---------------------

#[test]
fn update_moves_ids_between_posting_lists() -> Result<()> {
    let dir = tempdir()?;
    let mut users = seeded(dir.path());

    users.update("user_2", &json!({"role": "user", "active": false}))?;

    assert_eq!(users.find_ids(&filter(json!({"role": "admin"})))?, ["user_1"]);
    let mut demoted = users.find_ids(&filter(json!({"role": "user"})))?;
    demoted.sort();
    assert_eq!(demoted, ["user_2", "user_3"]);

    // The old value no longer reaches user_2 through any filter.
    assert_eq!(
        users.count(Some(&filter(json!({"role": "admin", "active": false}))))?,
        0
    );
    Ok(())
}

#[test]
fn delete_purges_ids_from_every_posting_list() -> Result<()> {
    let dir = tempdir()?;
    let mut users = seeded(dir.path());

    users.delete("user_1")?;

    assert_eq!(users.find_ids(&filter(json!({"role": "admin"})))?, ["user_2"]);
    assert_eq!(
        users.find_ids(&filter(json!({"active": true})))?,
        ["user_3"]
    );
    assert_eq!(users.count(None)?, 2);
    Ok(())
}

#[test]
fn create_index_over_existing_documents() -> Result<()> {
    let dir = tempdir()?;
    let mut users = open_collection(dir.path());

    users.insert("u1", &json!({"team": "red"}))?;
    users.insert("u2", &json!({"team": "blue"}))?;
    users.insert("u3", &json!({"team": "red"}))?;

    assert!(users.create_index("team")?);
    assert!(!users.create_index("team")?);
    assert_eq!(users.get_indexes(), vec!["team".to_string()]);

    let before = users.stats().storage.slot_reads;
    let mut reds = users.find_ids(&filter(json!({"team": "red"})))?;
    reds.sort();
    assert_eq!(reds, ["u1", "u3"]);
    assert_eq!(users.stats().storage.slot_reads, before);
    Ok(())
}

#[test]
fn filters_match_numbers_across_integer_and_float() -> Result<()> {
    let dir = tempdir()?;
    let mut users = open_collection(dir.path());
    users.create_index("age")?;
    users.insert("u", &json!({"age": 30}))?;

    assert_eq!(users.find_ids(&filter(json!({"age": 30.0})))?, ["u"]);
    Ok(())
}

#[test]
fn unindexed_filters_fall_back_to_full_scan() -> Result<()> {
    let dir = tempdir()?;
    let mut users = open_collection(dir.path());
    users.insert("a", &json!({"city": "Lisbon"}))?;
    users.insert("b", &json!({"city": "Porto"}))?;

    assert_eq!(users.find_ids(&filter(json!({"city": "Lisbon"})))?, ["a"]);
    assert_eq!(users.count(Some(&filter(json!({"city": "Porto"}))))?, 1);
    assert_eq!(users.count(Some(&filter(json!({"city": "Faro"}))))?, 0);
    Ok(())
}

// --------------------- compaction through the coordinator ---------------------

#[test]
fn queries_survive_compaction() -> Result<()> {
    let dir = tempdir()?;
    let mut users = seeded(dir.path());
    users.delete("user_3")?;

    let freed = users.compact()?;
    assert!(freed > 0);

    assert_eq!(users.count(Some(&filter(json!({"role": "admin"}))))?, 2);
    assert_eq!(
        users.get("user_1")?,
        Some(json!({"role": "admin", "active": true}))
    );
    // Post-compaction the index file was persisted with the new locations.
    assert!(dir.path().join("users.idx").exists());
    Ok(())
}
