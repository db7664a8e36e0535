//! Append log engine: canonical line formatting, metadata enforcement,
//! deterministic entry identity, and atomic appends under the per-log lock.
//!
//! Entries are never rewritten. Every line follows the grammar
//! `[emoji] [timestamp] [Agent: a] [Project: p] [ID: hex32] message | k=v; ...`
//! and carries an id derived from the entry's canonical tuple.

use crate::core::config::{LogConfig, ScribeConfig};
use crate::core::db;
use crate::core::error::{ErrorCode, ScribeError};
use crate::core::registry::{Project, Registry};
use crate::core::rotate;
use crate::core::sandbox;
use crate::core::store::Store;
use crate::core::time;
use crate::core::writer;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Grammar every appended line must satisfy.
pub fn entry_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[[^\]]+\] \[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} UTC\] \[Agent: [^\]]+\] \[Project: [^\]]+\]( \[ID: [0-9a-f]{32}\])? [^|]*( \| [^=;]+=[^;]*(; [^=;]+=[^;]*)*)?$",
        )
        .unwrap()
    })
}

/// Status token to line emoji. Unknown statuses fall back to the note mark.
pub fn emoji_for_status(status: &str) -> &'static str {
    match status {
        "done" | "success" => "✅",
        "progress" | "in_progress" => "🚧",
        "blocked" | "failed" => "🛑",
        "bug" => "🐛",
        "security" => "🔒",
        "warn" | "warning" => "⚠️",
        "info" => "📝",
        _ => "📝",
    }
}

/// Result of one append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub log_path: PathBuf,
    pub entry_id: String,
    pub raw_line: String,
    pub timestamp: String,
    /// Advisory rotation reminder once the entry count crosses the
    /// configured threshold; never auto-enforced.
    pub rotation_reminder: Option<String>,
}

/// One item of a bulk append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Caller-supplied timestamp; defaults to the staggered batch clock.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Resolve a log's on-disk path for a project, inside the project root.
///
/// The `progress` log prefers the project's own `progress_log_path`; all
/// templates expand `{docs_dir}` and `{key}`.
pub fn resolve_log_path(
    project: &Project,
    key: &str,
    def: &LogConfig,
) -> Result<PathBuf, ScribeError> {
    if key == "progress" {
        if let Some(path) = &project.progress_log_path {
            return sandbox::resolve_in_root(&project.root, path);
        }
    }
    let expanded = def
        .path_template
        .replace("{docs_dir}", &project.docs_dir.to_string_lossy())
        .replace("{key}", key);
    sandbox::resolve_in_root(&project.root, Path::new(&expanded))
}

/// Enforce per-log metadata: no newlines in values, all required keys present.
pub fn validate_metadata(
    def: &LogConfig,
    meta: &BTreeMap<String, String>,
) -> Result<(), ScribeError> {
    for (key, value) in meta {
        if value.contains('\n') || value.contains('\r') || key.contains('\n') {
            return Err(ScribeError::engine_with(
                ErrorCode::BadMetaValue,
                format!("metadata value for '{}' contains a newline", key),
                json!({"key": key}),
            ));
        }
    }
    let missing: Vec<&String> = def
        .required_metadata
        .iter()
        .filter(|k| !meta.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(ScribeError::engine_with(
            ErrorCode::MissingMetadata,
            format!(
                "missing required metadata: {}",
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            json!({"missing": missing}),
        ));
    }
    Ok(())
}

/// Digest over the sorted metadata pairs; part of the entry identity tuple.
fn meta_digest(meta: &BTreeMap<String, String>) -> String {
    let joined = meta
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";");
    writer::sha256_hex(joined.as_bytes())
}

/// Deterministic entry identity: first 32 hex chars of the tuple hash.
pub fn entry_id(
    repo_slug: &str,
    project_slug: &str,
    timestamp: &str,
    agent: &str,
    message: &str,
    meta: &BTreeMap<String, String>,
) -> String {
    let tuple = format!(
        "{}|{}|{}|{}|{}|{}",
        repo_slug,
        project_slug,
        timestamp,
        agent,
        message,
        meta_digest(meta)
    );
    writer::sha256_hex(tuple.as_bytes())[..32].to_string()
}

/// Assemble one canonical log line.
pub fn format_entry(
    emoji: &str,
    timestamp: &str,
    agent: &str,
    project: &str,
    id: &str,
    message: &str,
    meta: &BTreeMap<String, String>,
) -> String {
    let mut line = format!(
        "[{}] [{}] [Agent: {}] [Project: {}] [ID: {}] {}",
        emoji, timestamp, agent, project, id, message
    );
    if !meta.is_empty() {
        let pairs = meta
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        line.push_str(&format!(" | {}", pairs));
    }
    line
}

/// Count grammar-conforming entry lines in a log file's contents.
pub fn count_entries(content: &str) -> u64 {
    content
        .lines()
        .filter(|l| entry_line_re().is_match(l))
        .count() as u64
}

/// Append one entry to a project log.
#[allow(clippy::too_many_arguments)]
pub fn append_entry(
    store: &Store,
    config: &ScribeConfig,
    registry: &Registry,
    project: &Project,
    log_key: &str,
    message: &str,
    agent: &str,
    status: &str,
    meta: &BTreeMap<String, String>,
) -> Result<AppendOutcome, ScribeError> {
    let items = vec![BulkItem {
        message: message.to_string(),
        status: Some(status.to_string()),
        metadata: meta.clone(),
        timestamp: None,
    }];
    let mut outcomes = append_bulk(store, config, registry, project, log_key, agent, items)?;
    Ok(outcomes.pop().expect("bulk of one yields one outcome"))
}

/// Append a batch of entries under a single lock acquisition.
///
/// Timestamps are monotonic per entry: the batch starts at the current
/// clock and staggers one second per item unless a caller-supplied
/// timestamp moves it forward.
pub fn append_bulk(
    store: &Store,
    config: &ScribeConfig,
    registry: &Registry,
    project: &Project,
    log_key: &str,
    agent: &str,
    items: Vec<BulkItem>,
) -> Result<Vec<AppendOutcome>, ScribeError> {
    let def = config.log(log_key)?;
    let path = resolve_log_path(project, log_key, def)?;

    // Validate everything before any write; a bad item rejects the batch.
    for item in &items {
        validate_metadata(def, &item.metadata)?;
        if item.message.contains('\n') {
            return Err(ScribeError::engine_with(
                ErrorCode::BadMetaValue,
                "log messages must be single-line",
                json!({"message": item.message}),
            ));
        }
    }

    let _guard = writer::acquire_path_lock(&path, config.lock_timeout())?;
    rotate::ensure_active(&path, log_key, config.writer.fsync)?;

    let mut clock = Utc::now();
    let mut outcomes = Vec::with_capacity(items.len());
    let mut block = String::new();

    for item in items {
        if let Some(explicit) = item.timestamp {
            if explicit > clock {
                clock = explicit;
            }
        }
        let stamp = time::log_stamp(clock);
        let status = item.status.as_deref().unwrap_or("info");
        let id = entry_id(
            &config.repo_slug,
            &project.name,
            &stamp,
            agent,
            &item.message,
            &item.metadata,
        );
        let line = format_entry(
            emoji_for_status(status),
            &stamp,
            agent,
            &project.name,
            &id,
            &item.message,
            &item.metadata,
        );
        block.push_str(&line);
        block.push('\n');
        outcomes.push(AppendOutcome {
            log_path: path.clone(),
            entry_id: id,
            raw_line: line,
            timestamp: stamp,
            rotation_reminder: None,
        });
        clock += ChronoDuration::seconds(1);
    }

    writer::append_text(&path, &block, config.writer.fsync)?;

    // Advisory rotation reminder on the last outcome of the batch.
    let content = std::fs::read_to_string(&path)?;
    let entries = count_entries(&content);
    if entries >= config.rotation.threshold_entries {
        if let Some(last) = outcomes.last_mut() {
            last.rotation_reminder = Some(format!(
                "log '{}' has {} entries (threshold {}); consider rotating",
                log_key, entries, config.rotation.threshold_entries
            ));
        }
    }
    drop(_guard);

    // Best-effort mirror and registry touch; the append itself is durable.
    for outcome in &outcomes {
        let _ = mirror_entry(store, project, log_key, agent, outcome);
    }
    let _ = registry.touch_project(&project.name);

    Ok(outcomes)
}

fn mirror_entry(
    store: &Store,
    project: &Project,
    log_key: &str,
    agent: &str,
    outcome: &AppendOutcome,
) -> Result<(), ScribeError> {
    let conn = db::db_connect(&db::registry_db_path(store))?;
    let (message, meta_json) = split_raw_line(&outcome.raw_line);
    conn.execute(
        "INSERT INTO log_entries_mirror (project, log_key, ts, agent, entry_id, message, meta_json, sha256, raw_line)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            project.name,
            log_key,
            outcome.timestamp,
            agent,
            outcome.entry_id,
            message,
            meta_json,
            writer::sha256_hex(outcome.raw_line.as_bytes()),
            outcome.raw_line,
        ],
    )?;
    Ok(())
}

/// Pull message and metadata back out of a formatted line for the mirror.
fn split_raw_line(line: &str) -> (String, String) {
    let after_id = line
        .splitn(6, "] ")
        .last()
        .unwrap_or(line)
        .to_string();
    match after_id.split_once(" | ") {
        Some((msg, meta)) => {
            let mut map = serde_json::Map::new();
            for pair in meta.split("; ") {
                if let Some((k, v)) = pair.split_once('=') {
                    map.insert(k.to_string(), json!(v));
                }
            }
            (msg.to_string(), serde_json::Value::Object(map).to_string())
        }
        None => (after_id, "{}".to_string()),
    }
}

/// Tail the active log: the last `n` grammar-conforming entry lines.
pub fn read_recent(
    config: &ScribeConfig,
    project: &Project,
    log_key: &str,
    n: usize,
) -> Result<Vec<String>, ScribeError> {
    let def = config.log(log_key)?;
    let path = resolve_log_path(project, log_key, def)?;
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let entries: Vec<String> = content
        .lines()
        .filter(|l| entry_line_re().is_match(l))
        .map(|l| l.to_string())
        .collect();
    let start = entries.len().saturating_sub(n);
    Ok(entries[start..].to_vec())
}

/// Filters for querying the mirror table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilters {
    pub project: Option<String>,
    pub log_key: Option<String>,
    pub agent: Option<String>,
    /// Substring match on the message.
    pub contains: Option<String>,
    pub limit: Option<usize>,
}

/// A mirrored entry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroredEntry {
    pub project: String,
    pub log_key: String,
    pub ts: String,
    pub agent: String,
    pub entry_id: String,
    pub message: String,
    pub raw_line: String,
}

/// Query mirrored entries, most recent first.
pub fn query_entries(
    store: &Store,
    filters: &EntryFilters,
) -> Result<Vec<MirroredEntry>, ScribeError> {
    let conn = db::db_connect(&db::registry_db_path(store))?;
    let mut sql = String::from(
        "SELECT project, log_key, ts, agent, entry_id, message, raw_line
         FROM log_entries_mirror WHERE 1=1",
    );
    let mut args: Vec<String> = Vec::new();
    if let Some(p) = &filters.project {
        sql.push_str(&format!(" AND project = ?{}", args.len() + 1));
        args.push(p.clone());
    }
    if let Some(k) = &filters.log_key {
        sql.push_str(&format!(" AND log_key = ?{}", args.len() + 1));
        args.push(k.clone());
    }
    if let Some(a) = &filters.agent {
        sql.push_str(&format!(" AND agent = ?{}", args.len() + 1));
        args.push(a.clone());
    }
    if let Some(s) = &filters.contains {
        sql.push_str(&format!(" AND message LIKE ?{}", args.len() + 1));
        args.push(format!("%{}%", s));
    }
    sql.push_str(" ORDER BY id DESC");
    if let Some(limit) = filters.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
        Ok(MirroredEntry {
            project: row.get(0)?,
            log_key: row.get(1)?,
            ts: row.get(2)?,
            agent: row.get(3)?,
            entry_id: row.get(4)?,
            message: row.get(5)?,
            raw_line: row.get(6)?,
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_formatted_line_matches_grammar() {
        let m = meta(&[("doc", "architecture"), ("action", "append")]);
        let id = entry_id("scribe", "demo", "2026-01-01 00:00:00 UTC", "agent-1", "hello", &m);
        let line = format_entry(
            "📝",
            "2026-01-01 00:00:00 UTC",
            "agent-1",
            "demo",
            &id,
            "hello world",
            &m,
        );
        assert!(entry_line_re().is_match(&line), "line failed grammar: {line}");
    }

    #[test]
    fn test_metadata_keys_serialize_sorted() {
        let m = meta(&[("zeta", "1"), ("alpha", "2")]);
        let line = format_entry("📝", "2026-01-01 00:00:00 UTC", "a", "p", &"0".repeat(32), "m", &m);
        assert!(line.ends_with("| alpha=2; zeta=1"));
    }

    #[test]
    fn test_entry_id_is_deterministic_and_32_hex() {
        let m = meta(&[("k", "v")]);
        let a = entry_id("r", "p", "2026-01-01 00:00:00 UTC", "agent", "msg", &m);
        let b = entry_id("r", "p", "2026-01-01 00:00:00 UTC", "agent", "msg", &m);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entry_id_varies_with_metadata() {
        let a = entry_id("r", "p", "t", "agent", "msg", &meta(&[("k", "v")]));
        let b = entry_id("r", "p", "t", "agent", "msg", &meta(&[("k", "w")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_newline_in_meta_value_is_rejected() {
        let def = LogConfig::default();
        let err = validate_metadata(&def, &meta(&[("k", "bad\nvalue")])).unwrap_err();
        match err {
            ScribeError::Engine(e) => assert_eq!(e.code, ErrorCode::BadMetaValue),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_missing_required_metadata_names_keys() {
        let def = LogConfig {
            required_metadata: vec!["doc".into(), "section".into(), "action".into()],
            ..Default::default()
        };
        let err = validate_metadata(&def, &meta(&[("doc", "architecture"), ("action", "append")]))
            .unwrap_err();
        match err {
            ScribeError::Engine(e) => {
                assert_eq!(e.code, ErrorCode::MissingMetadata);
                assert_eq!(e.diagnostics["missing"][0], "section");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_line_without_meta_matches_grammar() {
        let line = format_entry(
            "✅",
            "2026-01-01 00:00:00 UTC",
            "a",
            "p",
            &"a".repeat(32),
            "plain message",
            &BTreeMap::new(),
        );
        assert!(entry_line_re().is_match(&line));
    }
}
