//! Mutation engine: structured, body-relative edits over registered docs.
//!
//! Every mutation runs the same pipeline: registry lookup, path sandbox,
//! per-document lock, frontmatter split, body transform, atomic write,
//! post-write verification, registry hash update, audit mirror. Frontmatter
//! bytes are preserved identically unless the caller explicitly updates a
//! frontmatter field.

use crate::core::append;
use crate::core::audit::{self, DocChange};
use crate::core::config::ScribeConfig;
use crate::core::create::{self, DocSpec};
use crate::core::crosslink::{self, LinkDiagnostic};
use crate::core::error::{ErrorCode, ScribeError};
use crate::core::frontmatter::{self, body_lines, render_lines};
use crate::core::index::{DocumentIndex, LineKind};
use crate::core::normalize;
use crate::core::registry::Registry;
use crate::core::sandbox;
use crate::core::store::Store;
use crate::core::toc;
use crate::core::writer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Desired checkbox state for a `status_update` edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxStatus {
    Done,
    Open,
}

/// A structured edit. All line numbers are 1-based, inclusive, and
/// body-relative; frontmatter never counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    ReplaceRange {
        start_line: usize,
        end_line: usize,
        content: String,
    },
    ReplaceBlock {
        anchor_text: String,
        content: String,
    },
    ReplaceSection {
        section_slug: String,
        content: String,
    },
    Append {
        content: String,
    },
    StatusUpdate {
        section_slug: String,
        token: String,
        status: CheckboxStatus,
        #[serde(default)]
        proof: Option<String>,
    },
    /// Ordered, atomic list. Each edit compiles against the current
    /// in-memory body so later edits see earlier effects; any failure
    /// discards the whole patch.
    ApplyPatch {
        edits: Vec<Edit>,
        #[serde(default)]
        patch_source_hash: Option<String>,
    },
}

/// Success payload of every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub doc_path: PathBuf,
    pub section: Option<String>,
    pub action: String,
    pub sha_before: String,
    pub sha_after: String,
    pub preview_diff: String,
    pub body_line_offset: usize,
    /// False when the mutation was a byte-identical no-op.
    pub changed: bool,
}

/// Caller identity and side-channel options for a mutation.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub agent: String,
    /// Append a `doc_updates` log entry after the audit record.
    pub auto_log: bool,
}

impl Default for MutationContext {
    fn default() -> Self {
        Self {
            agent: "scribe".to_string(),
            auto_log: false,
        }
    }
}

#[derive(Debug)]
struct EditEffect {
    action: &'static str,
    section: Option<String>,
}

/// The engine facade: store, configuration, registry.
pub struct Engine {
    pub store: Store,
    pub config: ScribeConfig,
    registry: Registry,
}

enum WriteOp {
    Edit(Edit),
    NormalizeHeaders,
    GenerateToc,
    UpdateFrontmatter(Vec<(String, String)>),
}

impl Engine {
    pub fn open(store: Store) -> Result<Self, ScribeError> {
        let config = ScribeConfig::load(&store)?;
        let registry = Registry::open(&store, config.lock_timeout())?;
        Ok(Self {
            store,
            config,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply one structured edit (or patch) to a registered document.
    pub fn mutate(
        &self,
        project_name: &str,
        doc_key: &str,
        edit: Edit,
        ctx: &MutationContext,
    ) -> Result<MutationOutcome, ScribeError> {
        self.run_write(project_name, doc_key, ctx, WriteOp::Edit(edit))
    }

    /// Canonicalize headings. Idempotent.
    pub fn normalize_headers(
        &self,
        project_name: &str,
        doc_key: &str,
        ctx: &MutationContext,
    ) -> Result<MutationOutcome, ScribeError> {
        self.run_write(project_name, doc_key, ctx, WriteOp::NormalizeHeaders)
    }

    /// Generate or refresh the TOC between the configured markers. Idempotent.
    pub fn generate_toc(
        &self,
        project_name: &str,
        doc_key: &str,
        ctx: &MutationContext,
    ) -> Result<MutationOutcome, ScribeError> {
        self.run_write(project_name, doc_key, ctx, WriteOp::GenerateToc)
    }

    /// Replace named scalar frontmatter fields, preserving everything else.
    pub fn update_frontmatter(
        &self,
        project_name: &str,
        doc_key: &str,
        updates: Vec<(String, String)>,
        ctx: &MutationContext,
    ) -> Result<MutationOutcome, ScribeError> {
        self.run_write(
            project_name,
            doc_key,
            ctx,
            WriteOp::UpdateFrontmatter(updates),
        )
    }

    /// Read-only link check; never writes, never audits.
    pub fn check_links(
        &self,
        project_name: &str,
        doc_key: &str,
        check_anchors: bool,
    ) -> Result<Vec<LinkDiagnostic>, ScribeError> {
        let project = self.registry.get_project(project_name)?;
        let doc = self.registry.lookup(project_name, doc_key)?;
        let path = sandbox::resolve_in_root(&project.root, &doc.path)?;
        let raw = std::fs::read_to_string(&path)?;
        let split = frontmatter::split(&raw);
        Ok(crosslink::validate_crosslinks(
            &project.root,
            &path,
            &split.body,
            check_anchors,
        ))
    }

    /// Create a new document from a body or structured description,
    /// optionally registering it under `register_key`.
    pub fn create_doc(
        &self,
        project_name: &str,
        rel_path: &str,
        spec: &DocSpec,
        register_key: Option<&str>,
        ctx: &MutationContext,
    ) -> Result<MutationOutcome, ScribeError> {
        let project = self.registry.get_project(project_name)?;
        let path = sandbox::resolve_in_root(&project.docs_dir, std::path::Path::new(rel_path))?;
        if path.exists() {
            return Err(ScribeError::engine_with(
                ErrorCode::PathCollision,
                format!("file already exists: {}", path.display()),
                json!({"path": path.display().to_string()}),
            ));
        }

        let content = create::render_document(spec);
        let _guard = writer::acquire_path_lock(&path, self.config.lock_timeout())?;
        let sha_after = writer::atomic_write(&path, content.as_bytes(), self.config.writer.fsync)?;

        let doc_key = match register_key {
            Some(key) => {
                self.registry
                    .register_doc(&project, key, &path, &spec.doc_type, Some(&sha_after))?;
                key.to_string()
            }
            None => rel_path.to_string(),
        };

        let change = DocChange::new(
            project_name,
            &doc_key,
            None,
            "create_doc",
            &ctx.agent,
            &writer::sha256_hex(b""),
            &sha_after,
            json!({"registered": register_key.is_some()}),
        );
        audit::record_change(&self.store, &self.registry, &change)?;

        Ok(MutationOutcome {
            doc_path: path,
            section: None,
            action: "create_doc".to_string(),
            sha_before: writer::sha256_hex(b""),
            sha_after,
            preview_diff: preview_diff(&[], &body_lines(&content)),
            body_line_offset: frontmatter::split(&content).body_line_offset,
            changed: true,
        })
    }

    fn run_write(
        &self,
        project_name: &str,
        doc_key: &str,
        ctx: &MutationContext,
        op: WriteOp,
    ) -> Result<MutationOutcome, ScribeError> {
        let project = self.registry.get_project(project_name)?;
        let doc = self.registry.lookup(project_name, doc_key)?;
        let path = sandbox::resolve_in_root(&project.root, &doc.path)?;

        let _guard = writer::acquire_path_lock(&path, self.config.lock_timeout())?;

        let raw = std::fs::read_to_string(&path)?;
        let sha_before = writer::sha256_hex(raw.as_bytes());
        let split = frontmatter::split(&raw);
        let old_lines = body_lines(&split.body);

        let (new_frontmatter, new_lines, effect) = match op {
            WriteOp::Edit(edit) => {
                let mut lines = old_lines.clone();
                let effect = apply_edit(&mut lines, &edit, &sha_before)?;
                (split.frontmatter.clone(), lines, effect)
            }
            WriteOp::NormalizeHeaders => {
                let out = normalize::normalize_headers(&split.body);
                (
                    split.frontmatter.clone(),
                    body_lines(&out.body),
                    EditEffect {
                        action: "normalize_headers",
                        section: None,
                    },
                )
            }
            WriteOp::GenerateToc => {
                let out = toc::generate_toc(
                    &split.body,
                    &self.config.toc.marker_start,
                    &self.config.toc.marker_end,
                );
                (
                    split.frontmatter.clone(),
                    body_lines(&out.body),
                    EditEffect {
                        action: "generate_toc",
                        section: None,
                    },
                )
            }
            WriteOp::UpdateFrontmatter(updates) => {
                let updated = frontmatter::update_fields(&split.frontmatter, &updates)?;
                (
                    updated,
                    old_lines.clone(),
                    EditEffect {
                        action: "update_frontmatter",
                        section: None,
                    },
                )
            }
        };

        let output = frontmatter::join(&new_frontmatter, &render_lines(&new_lines));
        if output == raw {
            return Ok(MutationOutcome {
                doc_path: path,
                section: effect.section,
                action: effect.action.to_string(),
                sha_before: sha_before.clone(),
                sha_after: sha_before,
                preview_diff: String::new(),
                body_line_offset: split.body_line_offset,
                changed: false,
            });
        }

        let sha_after = writer::atomic_write(&path, output.as_bytes(), self.config.writer.fsync)?;
        self.registry
            .update_doc_hash(project_name, doc_key, &sha_after)?;

        let change = DocChange::new(
            project_name,
            doc_key,
            effect.section.as_deref(),
            effect.action,
            &ctx.agent,
            &sha_before,
            &sha_after,
            json!({}),
        );
        // Best-effort: a Pending status means the change is queued for
        // reconciliation; the file write is already durable either way.
        audit::record_change(&self.store, &self.registry, &change)?;

        if ctx.auto_log {
            let mut meta = BTreeMap::new();
            meta.insert("doc".to_string(), doc_key.to_string());
            meta.insert(
                "section".to_string(),
                effect.section.clone().unwrap_or_else(|| "-".to_string()),
            );
            meta.insert("action".to_string(), effect.action.to_string());
            let _ = append::append_entry(
                &self.store,
                &self.config,
                &self.registry,
                &project,
                "doc_updates",
                &format!("{} on {}", effect.action, doc_key),
                &ctx.agent,
                "info",
                &meta,
            );
        }

        Ok(MutationOutcome {
            doc_path: path,
            section: effect.section,
            action: effect.action.to_string(),
            sha_before,
            sha_after,
            preview_diff: preview_diff(&old_lines, &new_lines),
            body_line_offset: split.body_line_offset,
            changed: true,
        })
    }

}

/// Split edit content into LF lines; verbatim, no fence interpretation.
fn content_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    body_lines(content)
}

fn apply_edit(
    lines: &mut Vec<String>,
    edit: &Edit,
    sha_before: &str,
) -> Result<EditEffect, ScribeError> {
    match edit {
        Edit::ReplaceRange {
            start_line,
            end_line,
            content,
        } => replace_range(lines, *start_line, *end_line, content),
        Edit::ReplaceBlock {
            anchor_text,
            content,
        } => replace_block(lines, anchor_text, content),
        Edit::ReplaceSection {
            section_slug,
            content,
        } => replace_section(lines, section_slug, content),
        Edit::Append { content } => append_body(lines, content),
        Edit::StatusUpdate {
            section_slug,
            token,
            status,
            proof,
        } => status_update(lines, section_slug, token, *status, proof.as_deref()),
        Edit::ApplyPatch {
            edits,
            patch_source_hash,
        } => {
            if let Some(expected) = patch_source_hash {
                if expected != sha_before {
                    return Err(ScribeError::engine_with(
                        ErrorCode::StaleSource,
                        "patch source hash does not match current document",
                        json!({"expected": expected, "actual": sha_before}),
                    ));
                }
            }
            let mut section = None;
            for e in edits {
                let effect = apply_edit(lines, e, sha_before)?;
                if section.is_none() {
                    section = effect.section;
                }
            }
            Ok(EditEffect {
                action: "apply_patch",
                section,
            })
        }
    }
}

fn replace_range(
    lines: &mut Vec<String>,
    start: usize,
    end: usize,
    content: &str,
) -> Result<EditEffect, ScribeError> {
    if start < 1 || end < start || end > lines.len() {
        return Err(ScribeError::engine_with(
            ErrorCode::RangeOutOfBounds,
            format!(
                "range {}..{} invalid for body of {} lines",
                start,
                end,
                lines.len()
            ),
            json!({"start_line": start, "end_line": end, "body_line_count": lines.len()}),
        ));
    }
    lines.splice(start - 1..end, content_lines(content));
    Ok(EditEffect {
        action: "replace_range",
        section: None,
    })
}

fn replace_block(
    lines: &mut Vec<String>,
    anchor_text: &str,
    content: &str,
) -> Result<EditEffect, ScribeError> {
    let index = DocumentIndex::build(lines);
    let mut matches: Vec<usize> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if index.in_fence(i + 1) {
            continue;
        }
        if matches!(index.kinds[i], LineKind::AtxHeading(_)) {
            continue;
        }
        if line == anchor_text || line.starts_with(anchor_text) {
            matches.push(i);
        }
    }
    match matches.len() {
        0 => Err(ScribeError::engine_with(
            ErrorCode::AnchorNotFound,
            format!("anchor text not found: '{}'", anchor_text),
            json!({"anchor_text": anchor_text}),
        )),
        1 => {
            let start = matches[0];
            let end = lines[start..]
                .iter()
                .position(|l| l.trim().is_empty())
                .map(|off| start + off)
                .unwrap_or(lines.len());
            lines.splice(start..end, content_lines(content));
            Ok(EditEffect {
                action: "replace_block",
                section: None,
            })
        }
        _ => Err(ScribeError::engine_with(
            ErrorCode::AmbiguousAnchor,
            format!("anchor text matches {} lines", matches.len()),
            json!({
                "anchor_text": anchor_text,
                "lines": matches.iter().map(|i| i + 1).collect::<Vec<_>>(),
            }),
        )),
    }
}

fn replace_section(
    lines: &mut Vec<String>,
    slug: &str,
    content: &str,
) -> Result<EditEffect, ScribeError> {
    let index = DocumentIndex::build(lines);
    let anchor = index.resolve_section(slug)?.clone();
    // Keep the anchor comment and heading; replace everything up to (but not
    // including) the terminator.
    lines.splice(
        anchor.first_content_line - 1..anchor.terminator_line - 1,
        content_lines(content),
    );
    Ok(EditEffect {
        action: "replace_section",
        section: Some(slug.to_string()),
    })
}

fn append_body(lines: &mut Vec<String>, content: &str) -> Result<EditEffect, ScribeError> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.extend(content_lines(content));
    Ok(EditEffect {
        action: "append",
        section: None,
    })
}

fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*[-*]\s+)\[( |x|X)\]\s+(.*)$").unwrap())
}

fn status_update(
    lines: &mut Vec<String>,
    section_slug: &str,
    token: &str,
    status: CheckboxStatus,
    proof: Option<&str>,
) -> Result<EditEffect, ScribeError> {
    let index = DocumentIndex::build(lines);
    let anchor = index.resolve_section(section_slug)?.clone();

    let word = Regex::new(&format!(r"\b{}\b", regex::escape(token)))
        .map_err(|e| ScribeError::Config(format!("bad token pattern: {}", e)))?;

    let mut matches: Vec<usize> = Vec::new();
    for i in anchor.first_content_line - 1..anchor.terminator_line - 1 {
        if let Some(caps) = checkbox_re().captures(&lines[i]) {
            if word.is_match(caps.get(3).unwrap().as_str()) {
                matches.push(i);
            }
        }
    }

    if matches.len() != 1 {
        return Err(ScribeError::engine_with(
            ErrorCode::TokenNotFound,
            format!(
                "token '{}' matched {} checklist lines in section '{}'",
                token,
                matches.len(),
                section_slug
            ),
            json!({
                "token": token,
                "section": section_slug,
                "lines": matches.iter().map(|i| i + 1).collect::<Vec<_>>(),
            }),
        ));
    }

    let i = matches[0];
    let caps = checkbox_re().captures(&lines[i]).unwrap();
    let prefix = caps.get(1).unwrap().as_str().to_string();
    let label = caps.get(3).unwrap().as_str();

    // Strip any existing proof marker before re-attaching.
    let proof_re = Regex::new(r"\s*\(proof: [^)]*\)\s*$").unwrap();
    let bare = proof_re.replace(label, "").to_string();

    let mark = match status {
        CheckboxStatus::Done => "x",
        CheckboxStatus::Open => " ",
    };
    let mut rebuilt = format!("{}[{}] {}", prefix, mark, bare.trim_end());
    if let Some(p) = proof {
        rebuilt.push_str(&format!(" (proof: {})", p));
    }
    lines[i] = rebuilt;

    Ok(EditEffect {
        action: "status_update",
        section: Some(section_slug.to_string()),
    })
}

/// Compact line diff for mutation previews: common prefix/suffix trimmed,
/// removals then additions, bounded output.
fn preview_diff(old: &[String], new: &[String]) -> String {
    const MAX_SIDE: usize = 12;

    let mut prefix = 0usize;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0usize;
    while suffix < old.len().saturating_sub(prefix)
        && suffix < new.len().saturating_sub(prefix)
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let removed = &old[prefix..old.len() - suffix];
    let added = &new[prefix..new.len() - suffix];

    let mut out = Vec::new();
    for line in removed.iter().take(MAX_SIDE) {
        out.push(format!("- {}", line));
    }
    if removed.len() > MAX_SIDE {
        out.push(format!("- (+{} more)", removed.len() - MAX_SIDE));
    }
    for line in added.iter().take(MAX_SIDE) {
        out.push(format!("+ {}", line));
    }
    if added.len() > MAX_SIDE {
        out.push(format!("+ (+{} more)", added.len() - MAX_SIDE));
    }
    out.join("\n")
}
