//! Mutation audit mirror: one `doc_changes` row per accepted mutation.
//!
//! The mirror is written after the file write is durable and is
//! best-effort: a store failure never rolls back the file. Instead the
//! change is queued in `mirror_pending.jsonl` and the doc is flagged
//! `mirror_pending` until reconciled.

use crate::core::db;
use crate::core::error::ScribeError;
use crate::core::registry::{Registry, FLAG_MIRROR_PENDING};
use crate::core::store::Store;
use crate::core::time;
use crate::core::writer;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::io::{BufRead, BufReader};

/// One accepted mutation, as mirrored to the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChange {
    pub project: String,
    pub doc: String,
    pub section: Option<String>,
    pub action: String,
    pub agent: String,
    pub sha_before: String,
    pub sha_after: String,
    pub metadata: JsonValue,
    pub created_at: String,
}

impl DocChange {
    pub fn new(
        project: &str,
        doc: &str,
        section: Option<&str>,
        action: &str,
        agent: &str,
        sha_before: &str,
        sha_after: &str,
        metadata: JsonValue,
    ) -> Self {
        Self {
            project: project.to_string(),
            doc: doc.to_string(),
            section: section.map(|s| s.to_string()),
            action: action.to_string(),
            agent: agent.to_string(),
            sha_before: sha_before.to_string(),
            sha_after: sha_after.to_string(),
            metadata,
            created_at: time::now_rfc3339(),
        }
    }
}

/// Whether the change reached the store or was queued for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    Stored,
    Pending,
}

fn insert_change(store: &Store, change: &DocChange) -> Result<(), ScribeError> {
    let conn = db::db_connect(&db::registry_db_path(store))?;
    conn.execute(
        "INSERT INTO doc_changes (project, doc, section, action, agent, sha_before, sha_after, metadata_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            change.project,
            change.doc,
            change.section,
            change.action,
            change.agent,
            change.sha_before,
            change.sha_after,
            change.metadata.to_string(),
            change.created_at,
        ],
    )?;
    Ok(())
}

/// Mirror an accepted mutation. Never fails the mutation: on store error the
/// change lands in the pending queue and the doc is flagged.
pub fn record_change(
    store: &Store,
    registry: &Registry,
    change: &DocChange,
) -> Result<MirrorStatus, ScribeError> {
    match insert_change(store, change) {
        Ok(()) => Ok(MirrorStatus::Stored),
        Err(_) => {
            let line = serde_json::to_string(change)?;
            writer::append_text(&store.mirror_pending_path(), &format!("{}\n", line), true)?;
            // Flag best-effort as well; the queue alone is enough to recover.
            let _ = registry.set_flag(&change.project, &change.doc, FLAG_MIRROR_PENDING, true);
            Ok(MirrorStatus::Pending)
        }
    }
}

/// Drain the pending queue into the store. Changes that still fail stay
/// queued; docs whose changes all landed get their flag cleared.
pub fn reconcile_pending(store: &Store, registry: &Registry) -> Result<usize, ScribeError> {
    let queue_path = store.mirror_pending_path();
    if !queue_path.exists() {
        return Ok(0);
    }

    let file = std::fs::File::open(&queue_path)?;
    let mut drained = 0usize;
    let mut still_pending: Vec<String> = Vec::new();
    let mut cleared: Vec<(String, String)> = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(change) = serde_json::from_str::<DocChange>(&line) else {
            still_pending.push(line);
            continue;
        };
        match insert_change(store, &change) {
            Ok(()) => {
                drained += 1;
                cleared.push((change.project.clone(), change.doc.clone()));
            }
            Err(_) => still_pending.push(line),
        }
    }

    let remaining = still_pending.join("\n");
    if remaining.is_empty() {
        std::fs::remove_file(&queue_path)?;
    } else {
        writer::atomic_write(&queue_path, format!("{}\n", remaining).as_bytes(), true)?;
    }

    for (project, doc) in cleared {
        let still_queued = still_pending.iter().any(|l| {
            serde_json::from_str::<DocChange>(l)
                .map(|c| c.project == project && c.doc == doc)
                .unwrap_or(false)
        });
        if !still_queued {
            let _ = registry.set_flag(&project, &doc, FLAG_MIRROR_PENDING, false);
        }
    }

    Ok(drained)
}

/// Query mirrored changes for a document, most recent first.
pub fn changes_for_doc(
    store: &Store,
    project: &str,
    doc: &str,
    limit: usize,
) -> Result<Vec<DocChange>, ScribeError> {
    let conn = db::db_connect(&db::registry_db_path(store))?;
    let mut stmt = conn.prepare(
        "SELECT project, doc, section, action, agent, sha_before, sha_after, metadata_json, created_at
         FROM doc_changes WHERE project = ?1 AND doc = ?2
         ORDER BY id DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![project, doc, limit as i64], |row| {
        let metadata_json: String = row.get(7)?;
        Ok(DocChange {
            project: row.get(0)?,
            doc: row.get(1)?,
            section: row.get(2)?,
            action: row.get(3)?,
            agent: row.get(4)?,
            sha_before: row.get(5)?,
            sha_after: row.get(6)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or(JsonValue::Null),
            created_at: row.get(8)?,
        })
    })?;
    let mut changes = Vec::new();
    for row in rows {
        changes.push(row?);
    }
    Ok(changes)
}
