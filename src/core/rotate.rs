//! Rotation engine: archive the active log, chain hashes, start a new file.
//!
//! Every log file carries a rotation header written at creation. For
//! sequence N, `Previous Hash` is the SHA-256 of the file it succeeded and
//! `Root Hash` is the hash of the chain's first archived file, so
//! recomputing any archive's hash must reproduce the value recorded in its
//! successor. A marker file covers the window between archive and
//! new-active creation; the next append completes the rotation.

use crate::core::append;
use crate::core::config::ScribeConfig;
use crate::core::error::{ErrorCode, ScribeError};
use crate::core::registry::Project;
use crate::core::time;
use crate::core::writer;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Everything recorded about one rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationRecord {
    pub rotation_id: String,
    /// Sequence of the file this header opens (1-based).
    pub sequence: u64,
    pub timestamp: String,
    pub previous_path: Option<String>,
    pub previous_sha256: Option<String>,
    pub previous_entry_count: Option<u64>,
    pub chain_previous_hash: Option<String>,
    pub chain_root_hash: Option<String>,
}

impl RotationRecord {
    /// The header for a brand-new chain (sequence 1, all references None).
    pub fn genesis() -> Self {
        Self {
            rotation_id: time::new_rotation_id(),
            sequence: 1,
            timestamp: time::log_stamp(Utc::now()),
            previous_path: None,
            previous_sha256: None,
            previous_entry_count: None,
            chain_previous_hash: None,
            chain_root_hash: None,
        }
    }
}

fn none_or(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "None".to_string())
}

/// Render the header block that opens every log file.
pub fn render_header(log_key: &str, record: &RotationRecord) -> String {
    let entries = record
        .previous_entry_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "None".to_string());
    format!(
        "# Scribe Log: {key}\n\
         \n\
         - Rotation ID: {id}\n\
         - Rotation Timestamp: {ts}\n\
         - Current Sequence: {seq}\n\
         - Total Rotations: {rotations}\n\
         \n\
         ## Previous Log Reference\n\
         - Path: {prev_path}\n\
         - Hash: {prev_hash}\n\
         - Entries: {prev_entries}\n\
         \n\
         ## Hash Chain Information\n\
         - Chain Sequence: {seq}\n\
         - Previous Hash: {chain_prev}\n\
         - Root Hash: {chain_root}\n\
         \n",
        key = log_key,
        id = record.rotation_id,
        ts = record.timestamp,
        seq = record.sequence,
        rotations = record.sequence.saturating_sub(1),
        prev_path = none_or(&record.previous_path),
        prev_hash = none_or(&record.previous_sha256),
        prev_entries = entries,
        chain_prev = none_or(&record.chain_previous_hash),
        chain_root = none_or(&record.chain_root_hash),
    )
}

fn header_field(content: &str, label: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?m)^- {}: (.+)$", regex::escape(label))).ok()?;
    let value = re.captures(content)?.get(1)?.as_str().trim().to_string();
    if value == "None" {
        None
    } else {
        Some(value)
    }
}

/// Parsed view of a log file's rotation header.
#[derive(Debug, Clone)]
pub struct HeaderInfo {
    pub sequence: u64,
    pub previous_path: Option<String>,
    pub previous_sha256: Option<String>,
    pub chain_root_hash: Option<String>,
}

/// Read the rotation header of a log file's contents. Files predating the
/// header format read as sequence 1 with no references.
pub fn parse_header(content: &str) -> HeaderInfo {
    let sequence = header_field(content, "Current Sequence")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    HeaderInfo {
        sequence,
        previous_path: header_field(content, "Path"),
        previous_sha256: header_field(content, "Hash"),
        chain_root_hash: header_field(content, "Root Hash"),
    }
}

fn marker_path(log_path: &Path) -> PathBuf {
    let name = format!(
        ".{}.rotation-pending.json",
        log_path.file_name().unwrap_or_default().to_string_lossy()
    );
    log_path.with_file_name(name)
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingRotation {
    log_key: String,
    record: RotationRecord,
}

/// Ensure the active log file exists, completing any interrupted rotation.
/// The caller must hold the log's path lock.
pub fn ensure_active(path: &Path, log_key: &str, fsync: bool) -> Result<(), ScribeError> {
    let marker = marker_path(path);
    if marker.exists() {
        let raw = std::fs::read_to_string(&marker)?;
        if let Ok(pending) = serde_json::from_str::<PendingRotation>(&raw) {
            if !path.exists() {
                let header = render_header(&pending.log_key, &pending.record);
                writer::atomic_write(path, header.as_bytes(), fsync)?;
            }
            std::fs::remove_file(&marker)?;
            return Ok(());
        }
        // Unreadable marker: fall through and treat as absent.
        std::fs::remove_file(&marker)?;
    }
    if !path.exists() {
        let header = render_header(log_key, &RotationRecord::genesis());
        writer::atomic_write(path, header.as_bytes(), fsync)?;
    }
    Ok(())
}

fn archive_path_for(path: &Path, now_tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let mut candidate = path.with_file_name(format!("{}.{}.md", stem, now_tag));
    let mut counter = 2;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}.{}-{}.md", stem, now_tag, counter));
        counter += 1;
    }
    candidate
}

/// Rotate a project log: archive the active file and open the next one in
/// the chain.
pub fn rotate_log(
    config: &ScribeConfig,
    project: &Project,
    log_key: &str,
) -> Result<RotationRecord, ScribeError> {
    let def = config.log(log_key)?;
    let path = append::resolve_log_path(project, log_key, def)?;

    let _guard = writer::acquire_path_lock(&path, config.lock_timeout())?;
    ensure_active(&path, log_key, config.writer.fsync)?;

    let content = std::fs::read_to_string(&path)?;
    let archived_hash = writer::sha256_hex(content.as_bytes());
    let entry_count = append::count_entries(&content);
    let header = parse_header(&content);

    let now = Utc::now();
    let tag = now.format("%Y%m%d-%H%M%S").to_string();
    let archive = archive_path_for(&path, &tag);

    let next = RotationRecord {
        rotation_id: time::new_rotation_id(),
        sequence: header.sequence + 1,
        timestamp: time::log_stamp(now),
        previous_path: Some(
            archive
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        ),
        previous_sha256: Some(archived_hash.clone()),
        previous_entry_count: Some(entry_count),
        chain_previous_hash: Some(archived_hash.clone()),
        chain_root_hash: Some(header.chain_root_hash.unwrap_or(archived_hash)),
    };

    // Marker first: if we crash between the rename and the new-active write,
    // the next append finds the prepared header and completes the rotation.
    let pending = PendingRotation {
        log_key: log_key.to_string(),
        record: next.clone(),
    };
    writer::atomic_write(
        &marker_path(&path),
        serde_json::to_string(&pending)?.as_bytes(),
        config.writer.fsync,
    )?;

    std::fs::rename(&path, &archive)?;
    writer::atomic_write(
        &path,
        render_header(log_key, &next).as_bytes(),
        config.writer.fsync,
    )?;
    std::fs::remove_file(marker_path(&path))?;

    Ok(next)
}

/// Report from walking a rotation chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub files: usize,
    pub verified_links: usize,
    pub chain_root_hash: Option<String>,
}

/// Walk the chain backwards from the active file, recomputing every
/// archive's SHA-256 against the hash its successor recorded.
pub fn verify_chain(
    config: &ScribeConfig,
    project: &Project,
    log_key: &str,
) -> Result<ChainReport, ScribeError> {
    let def = config.log(log_key)?;
    let active = append::resolve_log_path(project, log_key, def)?;
    if !active.exists() {
        return Ok(ChainReport {
            files: 0,
            verified_links: 0,
            chain_root_hash: None,
        });
    }

    let dir = active.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut files = 1usize;
    let mut verified = 0usize;
    let mut content = std::fs::read_to_string(&active)?;
    let root = parse_header(&content).chain_root_hash;

    loop {
        let header = parse_header(&content);
        let (Some(prev_name), Some(expected_hash)) =
            (header.previous_path, header.previous_sha256)
        else {
            break;
        };
        let prev_path = dir.join(&prev_name);
        let prev_content = std::fs::read_to_string(&prev_path).map_err(|_| {
            ScribeError::engine_with(
                ErrorCode::RotationChainBroken,
                format!("archived log missing: {}", prev_name),
                json!({"file": prev_name, "expected_sha256": expected_hash}),
            )
        })?;
        let actual = writer::sha256_hex(prev_content.as_bytes());
        if actual != expected_hash {
            return Err(ScribeError::engine_with(
                ErrorCode::RotationChainBroken,
                format!("hash mismatch at {}", prev_name),
                json!({"file": prev_name, "expected": expected_hash, "actual": actual}),
            ));
        }
        // Every file in the chain records the same root.
        if let (Some(r), Some(this_root)) = (&root, parse_header(&prev_content).chain_root_hash) {
            if parse_header(&prev_content).previous_path.is_some() && this_root != *r {
                return Err(ScribeError::engine_with(
                    ErrorCode::RotationChainBroken,
                    format!("root hash diverges at {}", prev_name),
                    json!({"file": prev_name, "expected_root": r, "actual_root": this_root}),
                ));
            }
        }
        files += 1;
        verified += 1;
        content = prev_content;
    }

    Ok(ChainReport {
        files,
        verified_links: verified,
        chain_root_hash: root,
    })
}
