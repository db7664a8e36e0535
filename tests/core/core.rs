use scribe::core::audit::{self, DocChange};
use scribe::core::db;
use scribe::core::error::{ErrorCode, ScribeError};
use scribe::core::mutate::Engine;
use scribe::core::registry::{Project, FLAG_BASELINE_DIFFERS};
use scribe::core::store::Store;
use scribe::core::writer;
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, Engine) {
    let tmp = tempdir().expect("tempdir");
    let store_root = tmp.path().join("store");
    std::fs::create_dir_all(&store_root).unwrap();
    std::fs::write(
        store_root.join("config.toml"),
        "repo_slug = \"scribe-test\"\n\n[writer]\nfsync = false\n",
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

fn engine_code(err: ScribeError) -> ErrorCode {
    match err {
        ScribeError::Engine(e) => e.code,
        other => panic!("expected engine error, got {other}"),
    }
}

#[test]
fn registry_db_initializes_with_wal_and_foreign_keys() {
    let (_tmp, store, _engine) = setup();
    let db_path = db::registry_db_path(&store);
    assert!(db_path.exists());

    let conn = db::db_connect(&db_path).expect("db connect");
    let fk_on: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("pragma foreign_keys");
    assert_eq!(fk_on, 1);
}

#[test]
fn project_set_is_upsert_and_creates_docs_dir() {
    let (tmp, _store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    assert!(project.docs_dir.is_dir());
    assert_eq!(project.name, "demo");

    // Upsert with a defaults map; same root is not a collision for the
    // same project name.
    let updated = engine
        .registry()
        .set_project("demo", &project.root, None, None, json!({"agent": "bot"}))
        .unwrap();
    assert_eq!(updated.defaults["agent"], "bot");
    assert_eq!(engine.registry().list_projects().unwrap().len(), 1);
}

#[test]
fn project_root_is_unique_after_canonicalization() {
    let (tmp, _store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let err = engine
        .registry()
        .set_project("other", &project.root, None, None, json!({}))
        .unwrap_err();
    assert_eq!(engine_code(err), ErrorCode::PathCollision);
}

#[test]
fn register_lookup_and_duplicate_contracts() {
    let (tmp, _store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let doc_path = project.docs_dir.join("ARCHITECTURE.md");
    std::fs::write(&doc_path, "# Architecture\n").unwrap();

    let doc = engine
        .registry()
        .register_doc(&project, "architecture", &doc_path, "doc", None)
        .expect("register");
    assert_eq!(doc.key, "architecture");

    let looked_up = engine.registry().lookup("demo", "architecture").unwrap();
    assert_eq!(looked_up.path, doc.path);

    let dup = engine
        .registry()
        .register_doc(&project, "architecture", &doc_path, "doc", None)
        .unwrap_err();
    assert_eq!(engine_code(dup), ErrorCode::DuplicateDoc);

    let collision = engine
        .registry()
        .register_doc(&project, "arch2", &doc_path, "doc", None)
        .unwrap_err();
    assert_eq!(engine_code(collision), ErrorCode::PathCollision);
}

#[test]
fn lookup_unknown_key_is_doc_not_found() {
    let (tmp, _store, engine) = setup();
    make_project(&engine, tmp.path(), "demo");
    let err = engine.registry().lookup("demo", "phantom").unwrap_err();
    assert_eq!(engine_code(err), ErrorCode::DocNotFound);
}

#[test]
fn register_outside_docs_dir_is_path_escape() {
    let (tmp, _store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let stray = project.root.join("stray.md");
    std::fs::write(&stray, "x\n").unwrap();
    let err = engine
        .registry()
        .register_doc(&project, "stray", &stray, "doc", None)
        .unwrap_err();
    assert_eq!(engine_code(err), ErrorCode::PathEscape);
}

#[test]
fn hash_update_tracks_baseline_divergence() {
    let (tmp, _store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let doc_path = project.docs_dir.join("PLAN.md");
    std::fs::write(&doc_path, "# Plan\n").unwrap();
    let baseline = writer::sha256_file(&doc_path).unwrap();

    engine
        .registry()
        .register_doc(&project, "plan", &doc_path, "doc", Some(&baseline))
        .unwrap();

    engine
        .registry()
        .update_doc_hash("demo", "plan", &baseline)
        .unwrap();
    let doc = engine.registry().lookup("demo", "plan").unwrap();
    assert!(!doc.flags.iter().any(|f| f == FLAG_BASELINE_DIFFERS));

    engine
        .registry()
        .update_doc_hash("demo", "plan", &writer::sha256_hex(b"changed"))
        .unwrap();
    let doc = engine.registry().lookup("demo", "plan").unwrap();
    assert!(doc.flags.iter().any(|f| f == FLAG_BASELINE_DIFFERS));
}

#[test]
fn doc_changes_mirror_round_trip() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let doc_path = project.docs_dir.join("DOC.md");
    std::fs::write(&doc_path, "# Doc\n").unwrap();
    engine
        .registry()
        .register_doc(&project, "doc", &doc_path, "doc", None)
        .unwrap();

    let change = DocChange::new(
        "demo",
        "doc",
        Some("overview"),
        "replace_section",
        "tester",
        &writer::sha256_hex(b"before"),
        &writer::sha256_hex(b"after"),
        json!({"note": "first"}),
    );
    let status = audit::record_change(&store, engine.registry(), &change).unwrap();
    assert_eq!(status, audit::MirrorStatus::Stored);

    let changes = audit::changes_for_doc(&store, "demo", "doc", 10).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, "replace_section");
    assert_eq!(changes[0].section.as_deref(), Some("overview"));
}

#[test]
fn pending_queue_reconciles_into_store() {
    let (tmp, store, engine) = setup();
    let project = make_project(&engine, tmp.path(), "demo");
    let doc_path = project.docs_dir.join("DOC.md");
    std::fs::write(&doc_path, "# Doc\n").unwrap();
    engine
        .registry()
        .register_doc(&project, "doc", &doc_path, "doc", None)
        .unwrap();

    // Queue a change by hand, as a failed mirror would have.
    let change = DocChange::new(
        "demo",
        "doc",
        None,
        "append",
        "tester",
        &writer::sha256_hex(b"b"),
        &writer::sha256_hex(b"a"),
        json!({}),
    );
    std::fs::write(
        store.mirror_pending_path(),
        format!("{}\n", serde_json::to_string(&change).unwrap()),
    )
    .unwrap();

    let drained = audit::reconcile_pending(&store, engine.registry()).unwrap();
    assert_eq!(drained, 1);
    assert!(!store.mirror_pending_path().exists());
    assert_eq!(audit::changes_for_doc(&store, "demo", "doc", 10).unwrap().len(), 1);
}

#[test]
fn atomic_writer_survives_repeated_replacement() {
    let (tmp, _store, _engine) = setup();
    let target = tmp.path().join("doc.md");
    let mut last = String::new();
    for i in 0..20 {
        last = format!("revision {}\n", i);
        writer::atomic_write(&target, last.as_bytes(), false).unwrap();
    }
    assert_eq!(std::fs::read_to_string(&target).unwrap(), last);
}
