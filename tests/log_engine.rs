use scribe::core::append::{self, entry_line_re, BulkItem, EntryFilters};
use scribe::core::error::{ErrorCode, ScribeError};
use scribe::core::mutate::Engine;
use scribe::core::registry::Project;
use scribe::core::store::Store;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, Engine) {
    let tmp = tempdir().expect("tempdir");
    let store_root = tmp.path().join("store");
    std::fs::create_dir_all(&store_root).unwrap();
    std::fs::write(
        store_root.join("config.toml"),
        "repo_slug = \"scribe-test\"\n\n[writer]\nfsync = false\n\n[rotation]\nthreshold_entries = 5\n",
    )
    .unwrap();
    let store = Store::new(&store_root);
    let engine = Engine::open(store.clone()).expect("engine open");
    (tmp, store, engine)
}

fn make_project(engine: &Engine, base: &Path, name: &str) -> Project {
    let root = base.join(name);
    std::fs::create_dir_all(&root).unwrap();
    engine
        .registry()
        .set_project(name, &root, None, None, json!({}))
        .expect("set_project")
}

fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn appended_lines_match_the_grammar() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let outcome = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "implemented the thing",
        "agent-1",
        "done",
        &meta(&[("phase", "0"), ("component", "engine")]),
    )
    .expect("append");

    assert!(entry_line_re().is_match(&outcome.raw_line));
    assert_eq!(outcome.entry_id.len(), 32);

    let content = std::fs::read_to_string(&outcome.log_path).unwrap();
    for line in content.lines().filter(|l| l.starts_with('[')) {
        assert!(entry_line_re().is_match(line), "bad line: {line}");
    }
    assert!(content.contains("component=engine; phase=0"));
}

#[test]
fn missing_required_metadata_rejects_before_any_write() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let err = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "doc_updates",
        "updated something",
        "agent-1",
        "info",
        &meta(&[("doc", "architecture"), ("action", "append")]),
    )
    .unwrap_err();

    match err {
        ScribeError::Engine(e) => {
            assert_eq!(e.code, ErrorCode::MissingMetadata);
            assert_eq!(e.diagnostics["missing"][0], "section");
        }
        other => panic!("unexpected: {other}"),
    }

    // The log file was never created.
    let log_path = project.docs_dir.join("progress/DOC_UPDATES.md");
    assert!(!log_path.exists());
}

#[test]
fn newline_in_metadata_is_rejected() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let err = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "msg",
        "agent-1",
        "info",
        &meta(&[("note", "line1\nline2")]),
    )
    .unwrap_err();
    match err {
        ScribeError::Engine(e) => assert_eq!(e.code, ErrorCode::BadMetaValue),
        other => panic!("unexpected: {other}"),
    }
}

#[test]
fn entry_ids_are_deterministic_per_tuple_and_distinct_across_entries() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let a = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "first",
        "agent-1",
        "info",
        &BTreeMap::new(),
    )
    .unwrap();
    let b = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "second",
        "agent-1",
        "info",
        &BTreeMap::new(),
    )
    .unwrap();

    assert_ne!(a.entry_id, b.entry_id);
    assert_eq!(
        a.entry_id,
        append::entry_id(
            "scribe-test",
            "demo",
            &a.timestamp,
            "agent-1",
            "first",
            &BTreeMap::new()
        )
    );
}

#[test]
fn bulk_appends_are_contiguous_with_monotonic_timestamps() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let items: Vec<BulkItem> = (0..4)
        .map(|i| BulkItem {
            message: format!("bulk item {}", i),
            status: Some("progress".to_string()),
            metadata: BTreeMap::new(),
            timestamp: None,
        })
        .collect();

    let outcomes = append::append_bulk(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "agent-1",
        items,
    )
    .unwrap();

    assert_eq!(outcomes.len(), 4);
    for pair in outcomes.windows(2) {
        assert!(
            pair[0].timestamp < pair[1].timestamp,
            "timestamps must stagger: {} vs {}",
            pair[0].timestamp,
            pair[1].timestamp
        );
    }

    // Contiguous in the file, in order.
    let content = std::fs::read_to_string(&outcomes[0].log_path).unwrap();
    let entry_lines: Vec<&str> = content
        .lines()
        .filter(|l| entry_line_re().is_match(l))
        .collect();
    let positions: Vec<usize> = outcomes
        .iter()
        .map(|o| {
            entry_lines
                .iter()
                .position(|l| **l == o.raw_line)
                .expect("entry present")
        })
        .collect();
    for pair in positions.windows(2) {
        assert_eq!(pair[0] + 1, pair[1]);
    }
}

#[test]
fn rotation_reminder_fires_at_threshold() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    let mut last_reminder = None;
    for i in 0..5 {
        let outcome = append::append_entry(
            &store,
            &engine.config,
            engine.registry(),
            &project,
            "progress",
            &format!("entry {}", i),
            "agent-1",
            "info",
            &BTreeMap::new(),
        )
        .unwrap();
        last_reminder = outcome.rotation_reminder;
    }
    let reminder = last_reminder.expect("threshold of 5 reached");
    assert!(reminder.contains("threshold"));
}

#[test]
fn read_recent_tails_entry_lines_only() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    for i in 0..6 {
        append::append_entry(
            &store,
            &engine.config,
            engine.registry(),
            &project,
            "progress",
            &format!("entry {}", i),
            "agent-1",
            "info",
            &BTreeMap::new(),
        )
        .unwrap();
    }

    let recent = append::read_recent(&engine.config, &project, "progress", 3).unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent[0].contains("entry 3"));
    assert!(recent[2].contains("entry 5"));
    // Header lines never leak into the tail.
    assert!(recent.iter().all(|l| entry_line_re().is_match(l)));
}

#[test]
fn mirror_table_answers_filtered_queries() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");

    append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "alpha work",
        "agent-1",
        "info",
        &BTreeMap::new(),
    )
    .unwrap();
    append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "bugs",
        "beta bug",
        "agent-2",
        "bug",
        &meta(&[("status", "open")]),
    )
    .unwrap();

    let all = append::query_entries(&store, &EntryFilters::default()).unwrap();
    assert_eq!(all.len(), 2);

    let bugs = append::query_entries(
        &store,
        &EntryFilters {
            log_key: Some("bugs".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0].agent, "agent-2");

    let by_text = append::query_entries(
        &store,
        &EntryFilters {
            contains: Some("alpha".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0].message, "alpha work");
}

#[test]
fn progress_log_path_override_is_honored() {
    let (tmp, store, engine) = setup();
    let root = tmp.path().join("custom");
    std::fs::create_dir_all(&root).unwrap();
    let project = engine
        .registry()
        .set_project(
            "custom",
            &root,
            None,
            Some(Path::new("STATUS_LOG.md")),
            json!({}),
        )
        .unwrap();

    let outcome = append::append_entry(
        &store,
        &engine.config,
        engine.registry(),
        &project,
        "progress",
        "routed",
        "agent-1",
        "info",
        &BTreeMap::new(),
    )
    .unwrap();
    assert_eq!(outcome.log_path.file_name().unwrap(), "STATUS_LOG.md");
    assert!(root.join("STATUS_LOG.md").exists());
}
