//! Path sandbox: every filesystem target must stay inside a project root.
//!
//! All engine reads and writes resolve through [`resolve_in_root`]. The
//! check canonicalizes the deepest existing ancestor so symlink escapes are
//! caught even for files that do not exist yet.

use crate::core::error::{ErrorCode, ScribeError};
use serde_json::json;
use std::path::{Component, Path, PathBuf};

fn escape(root: &Path, candidate: &Path, reason: &str) -> ScribeError {
    ScribeError::engine_with(
        ErrorCode::PathEscape,
        format!("path escapes project root: {}", candidate.display()),
        json!({
            "root": root.display().to_string(),
            "path": candidate.display().to_string(),
            "reason": reason,
        }),
    )
}

/// Resolve `candidate` (absolute or root-relative) to an absolute path that
/// is verified to live inside `root` after symlink resolution.
///
/// `root` must already exist; the target may not. Fails with `PATH_ESCAPE`
/// for `..` traversal, symlinks that leave the root, and non-regular-file
/// targets (directories are permitted for ancestor checks only).
pub fn resolve_in_root(root: &Path, candidate: &Path) -> Result<PathBuf, ScribeError> {
    let canonical_root = root
        .canonicalize()
        .map_err(|_| escape(root, candidate, "root does not resolve"))?;

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        canonical_root.join(candidate)
    };

    // Lexical screen first: parent traversal is rejected outright rather
    // than resolved, so `a/../../etc` cannot sneak past the prefix check.
    for component in joined.components() {
        if matches!(component, Component::ParentDir) {
            return Err(escape(&canonical_root, candidate, "parent traversal"));
        }
    }

    let resolved = resolve_existing_prefix(&joined)
        .map_err(|_| escape(&canonical_root, candidate, "ancestor does not resolve"))?;

    if !resolved.starts_with(&canonical_root) {
        return Err(escape(&canonical_root, candidate, "outside root"));
    }

    if resolved.exists() {
        let meta = std::fs::symlink_metadata(&resolved)?;
        if !meta.file_type().is_file() && !meta.file_type().is_dir() {
            return Err(escape(&canonical_root, candidate, "not a regular file"));
        }
    }

    Ok(resolved)
}

/// Canonicalize the deepest existing ancestor and re-append the remainder.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return Err(std::io::Error::other("no existing ancestor")),
        }
    }
    let mut resolved = existing.canonicalize()?;
    for part in tail.iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}
