//! Registry: project identities and registered documents.
//!
//! The registry is the single owning table for document identity. Structural
//! edits that target an unregistered doc key are rejected with
//! `DOC_NOT_FOUND` and no side effects — no healing, no path guessing.

use crate::core::db;
use crate::core::error::{ErrorCode, ScribeError};
use crate::core::sandbox;
use crate::core::store::Store;
use crate::core::time;
use crate::core::writer;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A registered project identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Canonical absolute root; unique across projects.
    pub root: PathBuf,
    /// Descendant of `root` that holds managed documents.
    pub docs_dir: PathBuf,
    pub progress_log_path: Option<PathBuf>,
    pub defaults: JsonValue,
    pub created_at: String,
    pub last_access_at: String,
}

/// A `(project, key)` registered document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredDoc {
    pub project: String,
    pub key: String,
    pub path: PathBuf,
    pub doc_type: String,
    pub baseline_hash: Option<String>,
    pub current_hash: Option<String>,
    pub flags: Vec<String>,
}

pub const FLAG_BASELINE_DIFFERS: &str = "baseline_differs";
pub const FLAG_MIRROR_PENDING: &str = "mirror_pending";

/// Handle over the registry store.
pub struct Registry {
    store: Store,
    lock_timeout: Duration,
}

impl Registry {
    /// Open (and initialize if needed) the registry under `store`.
    pub fn open(store: &Store, lock_timeout: Duration) -> Result<Self, ScribeError> {
        db::initialize_registry_db(store)?;
        Ok(Self {
            store: store.clone(),
            lock_timeout,
        })
    }

    fn db_path(&self) -> PathBuf {
        db::registry_db_path(&self.store)
    }

    fn doc_not_found(kind: &str, name: &str, extra: JsonValue) -> ScribeError {
        ScribeError::engine_with(
            ErrorCode::DocNotFound,
            format!("{} '{}' is not registered", kind, name),
            extra,
        )
    }

    /// Create or update a project identity.
    ///
    /// The root is canonicalized; `docs_dir` defaults to `<root>/docs` and
    /// must be a descendant of the root.
    pub fn set_project(
        &self,
        name: &str,
        root: &Path,
        docs_dir: Option<&Path>,
        progress_log_path: Option<&Path>,
        defaults: JsonValue,
    ) -> Result<Project, ScribeError> {
        let canonical_root = root.canonicalize().map_err(|_| {
            ScribeError::engine_with(
                ErrorCode::PathEscape,
                format!("project root does not resolve: {}", root.display()),
                json!({"root": root.display().to_string()}),
            )
        })?;
        let docs_dir = match docs_dir {
            Some(d) => sandbox::resolve_in_root(&canonical_root, d)?,
            None => canonical_root.join("docs"),
        };
        let progress_log_path = match progress_log_path {
            Some(p) => Some(sandbox::resolve_in_root(&canonical_root, p)?),
            None => None,
        };
        std::fs::create_dir_all(&docs_dir)?;

        let _guard = writer::acquire_path_lock(&self.db_path(), self.lock_timeout)?;
        let conn = db::db_connect(&self.db_path())?;

        // Root uniqueness after canonicalization.
        let clash: Option<String> = conn
            .query_row(
                "SELECT name FROM projects WHERE root = ?1 AND name != ?2",
                params![canonical_root.to_string_lossy(), name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = clash {
            return Err(ScribeError::engine_with(
                ErrorCode::PathCollision,
                format!("root already registered to project '{}'", other),
                json!({"root": canonical_root.display().to_string(), "project": other}),
            ));
        }

        let now = time::now_rfc3339();
        conn.execute(
            "INSERT INTO projects (name, root, docs_dir, progress_log_path, defaults_json, created_at, last_access_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(name) DO UPDATE SET
                 root = excluded.root,
                 docs_dir = excluded.docs_dir,
                 progress_log_path = excluded.progress_log_path,
                 defaults_json = excluded.defaults_json,
                 last_access_at = excluded.last_access_at",
            params![
                name,
                canonical_root.to_string_lossy(),
                docs_dir.to_string_lossy(),
                progress_log_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                defaults.to_string(),
                now,
            ],
        )?;
        drop(conn);

        self.get_project(name)
    }

    pub fn get_project(&self, name: &str) -> Result<Project, ScribeError> {
        let conn = db::db_connect(&self.db_path())?;
        conn.query_row(
            "SELECT name, root, docs_dir, progress_log_path, defaults_json, created_at, last_access_at
             FROM projects WHERE name = ?1",
            params![name],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| Self::doc_not_found("project", name, json!({"kind": "project"})))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, ScribeError> {
        let conn = db::db_connect(&self.db_path())?;
        let mut stmt = conn.prepare(
            "SELECT name, root, docs_dir, progress_log_path, defaults_json, created_at, last_access_at
             FROM projects ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_project)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    pub fn touch_project(&self, name: &str) -> Result<(), ScribeError> {
        let _guard = writer::acquire_path_lock(&self.db_path(), self.lock_timeout)?;
        let conn = db::db_connect(&self.db_path())?;
        conn.execute(
            "UPDATE projects SET last_access_at = ?1 WHERE name = ?2",
            params![time::now_rfc3339(), name],
        )?;
        Ok(())
    }

    /// Register a document under `(project, key)`.
    ///
    /// Fails with `DUPLICATE_DOC` if the key exists and `PATH_COLLISION` if
    /// the path is already registered under another key. The path must
    /// resolve inside the project's docs_dir.
    pub fn register_doc(
        &self,
        project: &Project,
        key: &str,
        path: &Path,
        doc_type: &str,
        baseline_hash: Option<&str>,
    ) -> Result<RegisteredDoc, ScribeError> {
        let resolved = sandbox::resolve_in_root(&project.docs_dir, path)?;

        let _guard = writer::acquire_path_lock(&self.db_path(), self.lock_timeout)?;
        let conn = db::db_connect(&self.db_path())?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT key FROM registered_docs WHERE project = ?1 AND key = ?2",
                params![project.name, key],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(ScribeError::engine_with(
                ErrorCode::DuplicateDoc,
                format!("doc key '{}' already registered in '{}'", key, project.name),
                json!({"project": project.name, "key": key}),
            ));
        }

        let path_owner: Option<String> = conn
            .query_row(
                "SELECT key FROM registered_docs WHERE project = ?1 AND path = ?2",
                params![project.name, resolved.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner) = path_owner {
            return Err(ScribeError::engine_with(
                ErrorCode::PathCollision,
                format!("path already registered under key '{}'", owner),
                json!({"path": resolved.display().to_string(), "key": owner}),
            ));
        }

        conn.execute(
            "INSERT INTO registered_docs (project, key, path, doc_type, baseline_hash, current_hash, flags_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, '[]')",
            params![
                project.name,
                key,
                resolved.to_string_lossy(),
                doc_type,
                baseline_hash,
            ],
        )?;
        drop(conn);
        drop(_guard);

        self.lookup(&project.name, key)
    }

    /// Resolve `(project, key)` or fail with `DOC_NOT_FOUND`.
    pub fn lookup(&self, project: &str, key: &str) -> Result<RegisteredDoc, ScribeError> {
        let conn = db::db_connect(&self.db_path())?;
        conn.query_row(
            "SELECT project, key, path, doc_type, baseline_hash, current_hash, flags_json
             FROM registered_docs WHERE project = ?1 AND key = ?2",
            params![project, key],
            row_to_doc,
        )
        .optional()?
        .ok_or_else(|| {
            Self::doc_not_found(
                "doc",
                key,
                json!({"kind": "doc", "project": project, "key": key}),
            )
        })
    }

    pub fn list_docs(&self, project: &str) -> Result<Vec<RegisteredDoc>, ScribeError> {
        let conn = db::db_connect(&self.db_path())?;
        let mut stmt = conn.prepare(
            "SELECT project, key, path, doc_type, baseline_hash, current_hash, flags_json
             FROM registered_docs WHERE project = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![project], row_to_doc)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Store the post-mutation hash and refresh derived flags.
    pub fn update_doc_hash(
        &self,
        project: &str,
        key: &str,
        current_hash: &str,
    ) -> Result<(), ScribeError> {
        let _guard = writer::acquire_path_lock(&self.db_path(), self.lock_timeout)?;
        let conn = db::db_connect(&self.db_path())?;
        let doc = conn
            .query_row(
                "SELECT project, key, path, doc_type, baseline_hash, current_hash, flags_json
                 FROM registered_docs WHERE project = ?1 AND key = ?2",
                params![project, key],
                row_to_doc,
            )
            .optional()?
            .ok_or_else(|| Self::doc_not_found("doc", key, json!({"project": project})))?;

        let mut flags = doc.flags.clone();
        let differs = doc
            .baseline_hash
            .as_deref()
            .is_some_and(|b| b != current_hash);
        flags.retain(|f| f != FLAG_BASELINE_DIFFERS);
        if differs {
            flags.push(FLAG_BASELINE_DIFFERS.to_string());
        }

        conn.execute(
            "UPDATE registered_docs SET current_hash = ?1, flags_json = ?2
             WHERE project = ?3 AND key = ?4",
            params![current_hash, serde_json::to_string(&flags)?, project, key],
        )?;
        Ok(())
    }

    /// Add or remove a flag on a registered doc.
    pub fn set_flag(
        &self,
        project: &str,
        key: &str,
        flag: &str,
        on: bool,
    ) -> Result<(), ScribeError> {
        let _guard = writer::acquire_path_lock(&self.db_path(), self.lock_timeout)?;
        let conn = db::db_connect(&self.db_path())?;
        let doc = conn
            .query_row(
                "SELECT project, key, path, doc_type, baseline_hash, current_hash, flags_json
                 FROM registered_docs WHERE project = ?1 AND key = ?2",
                params![project, key],
                row_to_doc,
            )
            .optional()?
            .ok_or_else(|| Self::doc_not_found("doc", key, json!({"project": project})))?;

        let mut flags = doc.flags;
        flags.retain(|f| f != flag);
        if on {
            flags.push(flag.to_string());
        }
        conn.execute(
            "UPDATE registered_docs SET flags_json = ?1 WHERE project = ?2 AND key = ?3",
            params![serde_json::to_string(&flags)?, project, key],
        )?;
        Ok(())
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let root: String = row.get(1)?;
    let docs_dir: String = row.get(2)?;
    let progress: Option<String> = row.get(3)?;
    let defaults_json: String = row.get(4)?;
    Ok(Project {
        name: row.get(0)?,
        root: PathBuf::from(root),
        docs_dir: PathBuf::from(docs_dir),
        progress_log_path: progress.map(PathBuf::from),
        defaults: serde_json::from_str(&defaults_json).unwrap_or(JsonValue::Null),
        created_at: row.get(5)?,
        last_access_at: row.get(6)?,
    })
}

fn row_to_doc(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegisteredDoc> {
    let path: String = row.get(2)?;
    let flags_json: String = row.get(6)?;
    Ok(RegisteredDoc {
        project: row.get(0)?,
        key: row.get(1)?,
        path: PathBuf::from(path),
        doc_type: row.get(3)?,
        baseline_hash: row.get(4)?,
        current_hash: row.get(5)?,
        flags: serde_json::from_str(&flags_json).unwrap_or_default(),
    })
}
