// src/core/schemas.rs
// Centralized database schema definitions for the Scribe registry store.

pub const REGISTRY_DB_NAME: &str = "registry.db";

// --- Projects ---
pub const REGISTRY_SCHEMA_PROJECTS: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        name TEXT PRIMARY KEY,
        root TEXT NOT NULL UNIQUE,
        docs_dir TEXT NOT NULL,
        progress_log_path TEXT,
        defaults_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        last_access_at TEXT NOT NULL
    )
";

// --- Registered docs ---
pub const REGISTRY_SCHEMA_DOCS: &str = "
    CREATE TABLE IF NOT EXISTS registered_docs (
        project TEXT NOT NULL,
        key TEXT NOT NULL,
        path TEXT NOT NULL,
        doc_type TEXT NOT NULL DEFAULT 'doc',
        baseline_hash TEXT,
        current_hash TEXT,
        flags_json TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY (project, key),
        FOREIGN KEY (project) REFERENCES projects(name)
    )
";

pub const REGISTRY_INDEX_DOCS_PATH: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_registered_docs_path ON registered_docs(project, path)";

// --- Mutation audit mirror ---
pub const REGISTRY_SCHEMA_DOC_CHANGES: &str = "
    CREATE TABLE IF NOT EXISTS doc_changes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project TEXT NOT NULL,
        doc TEXT NOT NULL,
        section TEXT,
        action TEXT NOT NULL,
        agent TEXT NOT NULL,
        sha_before TEXT NOT NULL,
        sha_after TEXT NOT NULL,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
";

pub const REGISTRY_INDEX_CHANGES_DOC: &str =
    "CREATE INDEX IF NOT EXISTS idx_doc_changes_doc ON doc_changes(project, doc)";

// --- Optional append-log mirror for queries ---
pub const REGISTRY_SCHEMA_LOG_MIRROR: &str = "
    CREATE TABLE IF NOT EXISTS log_entries_mirror (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project TEXT NOT NULL,
        log_key TEXT NOT NULL,
        ts TEXT NOT NULL,
        agent TEXT NOT NULL,
        entry_id TEXT NOT NULL,
        message TEXT NOT NULL,
        meta_json TEXT NOT NULL DEFAULT '{}',
        sha256 TEXT NOT NULL,
        raw_line TEXT NOT NULL
    )
";

pub const REGISTRY_INDEX_MIRROR_LOG: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_mirror_log ON log_entries_mirror(project, log_key)";
pub const REGISTRY_INDEX_MIRROR_ENTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_log_mirror_entry ON log_entries_mirror(entry_id)";
