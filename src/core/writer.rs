//! Atomic file replacement and the per-resource lock registry.
//!
//! Documents and log files share one lock namespace keyed by canonical
//! absolute path. Writers hold the lock from `sha_before` through the
//! rename; a failure at any step leaves the original file intact.

use crate::core::error::{ErrorCode, ScribeError};
use parking_lot::{Mutex, RawMutex};
use rustc_hash::FxHashMap;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Guard over one path's advisory lock; write access ends when dropped.
pub type PathLockGuard = parking_lot::lock_api::ArcMutexGuard<RawMutex, ()>;

fn path_lock_map() -> &'static Mutex<FxHashMap<PathBuf, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<FxHashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(FxHashMap::default()))
}

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let key = path.to_path_buf();
    let mut map = path_lock_map().lock();
    map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

/// Acquire the advisory lock for `path`, waiting at most `timeout`.
///
/// Expiry yields `LOCK_TIMEOUT` and leaves no partial state behind because
/// the lock is simply never granted.
pub fn acquire_path_lock(path: &Path, timeout: Duration) -> Result<PathLockGuard, ScribeError> {
    let lock = lock_for(path);
    lock.try_lock_arc_for(timeout).ok_or_else(|| {
        ScribeError::engine_with(
            ErrorCode::LockTimeout,
            format!("could not lock {} within {:?}", path.display(), timeout),
            json!({"path": path.display().to_string(), "timeout_seconds": timeout.as_secs()}),
        )
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn sha256_file(path: &Path) -> Result<String, ScribeError> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

/// Replace `path` with `content` atomically: write a sibling temp file,
/// fsync, rename over the target, fsync the directory, then verify the
/// on-disk bytes hash to the expected value.
///
/// The caller must already hold the path lock. Returns `sha_after`.
pub fn atomic_write(path: &Path, content: &[u8], fsync: bool) -> Result<String, ScribeError> {
    let dir = path
        .parent()
        .ok_or_else(|| ScribeError::Config(format!("no parent dir for {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        ulid::Ulid::new()
    );
    let tmp_path = dir.join(tmp_name);

    let write_result = (|| -> Result<(), ScribeError> {
        let mut f = File::create(&tmp_path)?;
        f.write_all(content)?;
        if fsync {
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        if fsync {
            sync_dir(dir)?;
        }
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    let expected = sha256_hex(content);
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(ScribeError::engine_with(
            ErrorCode::HashMismatch,
            format!("post-write verification failed for {}", path.display()),
            json!({"expected": expected, "actual": actual}),
        ));
    }
    Ok(actual)
}

/// Append raw text to a log file, creating it if needed. The caller must
/// hold the path lock; the write is a single `O_APPEND` call.
pub fn append_text(path: &Path, text: &str, fsync: bool) -> Result<(), ScribeError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(text.as_bytes())?;
    if fsync {
        f.sync_all()?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), ScribeError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), ScribeError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_replaces_and_verifies() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("doc.md");
        std::fs::write(&target, "old").unwrap();

        let sha = atomic_write(&target, b"new contents\n", false).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new contents\n");
        assert_eq!(sha, sha256_hex(b"new contents\n"));

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files must not survive");
    }

    #[test]
    fn test_lock_timeout_yields_lock_timeout_code() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("contended.md");
        let _held = acquire_path_lock(&path, Duration::from_secs(1)).unwrap();
        match acquire_path_lock(&path, Duration::from_millis(50)) {
            Ok(_) => panic!("expected lock acquisition to time out"),
            Err(ScribeError::Engine(e)) => assert_eq!(e.code, ErrorCode::LockTimeout),
            Err(other) => panic!("expected LOCK_TIMEOUT, got {other}"),
        }
    }

    #[test]
    fn test_lock_is_reacquirable_after_release() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("serial.md");
        drop(acquire_path_lock(&path, Duration::from_secs(1)).unwrap());
        assert!(acquire_path_lock(&path, Duration::from_millis(50)).is_ok());
    }
}
