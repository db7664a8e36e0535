//! Store handle for Scribe's shared state directory.
//!
//! A Store is the directory that owns the registry database, the engine
//! configuration, and the mirror-pending recovery queue. Project content
//! (docs, logs) lives under each project's own root; the store only holds
//! cross-project state.

use std::path::{Path, PathBuf};

/// Handle to a Scribe state directory.
///
/// The engine never consults ambient state: callers construct a `Store` and
/// pass it explicitly, together with a project identity, on every call.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the default store root: `$SCRIBE_HOME`, else `~/.scribe`.
    pub fn default_root() -> PathBuf {
        if let Ok(home) = std::env::var("SCRIBE_HOME") {
            return PathBuf::from(home);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".scribe")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn mirror_pending_path(&self) -> PathBuf {
        self.root.join("mirror_pending.jsonl")
    }
}
