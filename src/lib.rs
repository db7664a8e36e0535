//! Scribe: a local-first documentation and audit-log engine.
//!
//! Scribe applies deterministic, body-relative edits to Markdown documents
//! while preserving frontmatter byte-for-byte, enforces a registry contract
//! for document identity, generates stable tables of contents and
//! normalized headings, and maintains append-only logs with integrity
//! hashing and hash-chained rotations.
//!
//! # Core Principles
//!
//! - **Local-first**: all state is on disk, hashed, and auditable
//! - **Deterministic**: identical inputs produce identical bytes; normalize
//!   and TOC generation are fixed points
//! - **Explicit identity**: every call names its project; there is no
//!   ambient "current project"
//! - **No partial writes**: atomic replacement with post-write verification
//!
//! # Architecture
//!
//! All mutations run one pipeline: registry lookup, path sandbox,
//! per-document lock, frontmatter split, body transform, atomic write,
//! registry hash update, audit mirror. Log appends serialize under a
//! per-log lock and carry deterministic entry ids; rotations chain each
//! archive's SHA-256 into its successor's header.
//!
//! # Crate Structure
//!
//! - [`core`]: the document lifecycle engine
//! - `cli` (private): clap surface for the `scribe` binary

pub mod core;

mod cli;

use crate::cli::{Cli, Command, DocsCommand, LogCommand, ProjectCommand};
use crate::core::append::{self, BulkItem, EntryFilters};
use crate::core::audit;
use crate::core::create::DocSpec;
use crate::core::error::ScribeError;
use crate::core::mutate::{Edit, Engine, MutationContext};
use crate::core::rotate;
use crate::core::store::Store;
use clap::Parser;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

fn print_ok(extra: JsonValue) {
    let mut base = json!({"ok": true});
    if let (Some(obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    println!("{}", serde_json::to_string_pretty(&base).unwrap_or_default());
}

fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>, ScribeError> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let (k, v) = pair.split_once('=').ok_or_else(|| {
            ScribeError::Config(format!("expected key=value, got '{}'", pair))
        })?;
        map.insert(k.to_string(), v.to_string());
    }
    Ok(map)
}

pub fn run() -> Result<(), ScribeError> {
    let cli = Cli::parse();
    let store = Store::new(cli.store.unwrap_or_else(Store::default_root));
    std::fs::create_dir_all(&store.root)?;

    if matches!(cli.command, Command::Version) {
        println!("v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let engine = Engine::open(store.clone())?;

    match cli.command {
        Command::Version => unreachable!("handled above"),
        Command::Project(project_cli) => match project_cli.command {
            ProjectCommand::Set {
                name,
                root,
                docs_dir,
                progress_log,
                defaults,
            } => {
                let defaults = match defaults {
                    Some(raw) => serde_json::from_str(&raw)
                        .map_err(|e| ScribeError::Config(format!("bad defaults JSON: {}", e)))?,
                    None => json!({}),
                };
                let project = engine.registry().set_project(
                    &name,
                    &root,
                    docs_dir.as_deref(),
                    progress_log.as_deref(),
                    defaults,
                )?;
                print_ok(json!({"project": project}));
            }
            ProjectCommand::List => {
                let projects = engine.registry().list_projects()?;
                print_ok(json!({"projects": projects}));
            }
            ProjectCommand::Show { name } => {
                let project = engine.registry().get_project(&name)?;
                let docs = engine.registry().list_docs(&name)?;
                print_ok(json!({"project": project, "docs": docs}));
            }
        },
        Command::Docs(docs_cli) => match docs_cli.command {
            DocsCommand::Register {
                project,
                key,
                path,
                doc_type,
            } => {
                let proj = engine.registry().get_project(&project)?;
                let resolved = crate::core::sandbox::resolve_in_root(&proj.docs_dir, &path)?;
                let baseline = if resolved.exists() {
                    Some(crate::core::writer::sha256_file(&resolved)?)
                } else {
                    None
                };
                let doc = engine.registry().register_doc(
                    &proj,
                    &key,
                    &resolved,
                    &doc_type,
                    baseline.as_deref(),
                )?;
                print_ok(json!({"doc": doc}));
            }
            DocsCommand::List { project } => {
                let docs = engine.registry().list_docs(&project)?;
                print_ok(json!({"docs": docs}));
            }
            DocsCommand::Create {
                project,
                path,
                content,
                spec_json,
                register,
                agent,
            } => {
                let spec = match (content, spec_json) {
                    (Some(body), None) => DocSpec {
                        content: Some(body),
                        ..Default::default()
                    },
                    (None, Some(raw)) => serde_json::from_str(&raw)
                        .map_err(|e| ScribeError::Config(format!("bad spec JSON: {}", e)))?,
                    (None, None) => DocSpec::default(),
                    (Some(_), Some(_)) => unreachable!("clap conflicts_with"),
                };
                let ctx = MutationContext {
                    agent,
                    auto_log: false,
                };
                let outcome =
                    engine.create_doc(&project, &path, &spec, register.as_deref(), &ctx)?;
                print_ok(json!({"result": outcome}));
            }
            DocsCommand::Edit {
                project,
                doc,
                edit_json,
                agent,
                log_update,
            } => {
                let edit: Edit = serde_json::from_str(&edit_json)
                    .map_err(|e| ScribeError::Config(format!("bad edit JSON: {}", e)))?;
                let ctx = MutationContext {
                    agent,
                    auto_log: log_update,
                };
                let outcome = engine.mutate(&project, &doc, edit, &ctx)?;
                print_ok(json!({"result": outcome}));
            }
            DocsCommand::Normalize {
                project,
                doc,
                agent,
            } => {
                let ctx = MutationContext {
                    agent,
                    auto_log: false,
                };
                let outcome = engine.normalize_headers(&project, &doc, &ctx)?;
                print_ok(json!({"result": outcome}));
            }
            DocsCommand::Toc {
                project,
                doc,
                agent,
            } => {
                let ctx = MutationContext {
                    agent,
                    auto_log: false,
                };
                let outcome = engine.generate_toc(&project, &doc, &ctx)?;
                print_ok(json!({"result": outcome}));
            }
            DocsCommand::Frontmatter {
                project,
                doc,
                sets,
                agent,
            } => {
                let updates: Vec<(String, String)> =
                    parse_pairs(&sets)?.into_iter().collect();
                let ctx = MutationContext {
                    agent,
                    auto_log: false,
                };
                let outcome = engine.update_frontmatter(&project, &doc, updates, &ctx)?;
                print_ok(json!({"result": outcome}));
            }
            DocsCommand::CheckLinks {
                project,
                doc,
                check_anchors,
            } => {
                let diagnostics = engine.check_links(&project, &doc, check_anchors)?;
                let clean = diagnostics.is_empty();
                print_ok(json!({"diagnostics": diagnostics, "clean": clean}));
            }
            DocsCommand::Changes {
                project,
                doc,
                limit,
            } => {
                let changes = audit::changes_for_doc(&store, &project, &doc, limit)?;
                print_ok(json!({"changes": changes}));
            }
            DocsCommand::ReconcileMirror => {
                let drained = audit::reconcile_pending(&store, engine.registry())?;
                print_ok(json!({"drained": drained}));
            }
        },
        Command::Log(log_cli) => match log_cli.command {
            LogCommand::Append {
                project,
                log_key,
                message,
                agent,
                status,
                meta,
            } => {
                let proj = engine.registry().get_project(&project)?;
                let meta = parse_pairs(&meta)?;
                let outcome = append::append_entry(
                    &store,
                    &engine.config,
                    engine.registry(),
                    &proj,
                    &log_key,
                    &message,
                    &agent,
                    &status,
                    &meta,
                )?;
                print_ok(json!({"entry": outcome}));
            }
            LogCommand::Bulk {
                project,
                log_key,
                items_json,
                agent,
            } => {
                let items: Vec<BulkItem> = serde_json::from_str(&items_json)
                    .map_err(|e| ScribeError::Config(format!("bad items JSON: {}", e)))?;
                let proj = engine.registry().get_project(&project)?;
                let outcomes = append::append_bulk(
                    &store,
                    &engine.config,
                    engine.registry(),
                    &proj,
                    &log_key,
                    &agent,
                    items,
                )?;
                print_ok(json!({"entries": outcomes}));
            }
            LogCommand::Rotate { project, log_key } => {
                let proj = engine.registry().get_project(&project)?;
                let record = rotate::rotate_log(&engine.config, &proj, &log_key)?;
                print_ok(json!({"rotation": record}));
            }
            LogCommand::Recent {
                project,
                log_key,
                limit,
            } => {
                let proj = engine.registry().get_project(&project)?;
                let entries = append::read_recent(&engine.config, &proj, &log_key, limit)?;
                print_ok(json!({"entries": entries}));
            }
            LogCommand::VerifyChain { project, log_key } => {
                let proj = engine.registry().get_project(&project)?;
                let report = rotate::verify_chain(&engine.config, &proj, &log_key)?;
                print_ok(json!({"chain": report}));
            }
            LogCommand::Query {
                project,
                log_key,
                agent,
                contains,
                limit,
            } => {
                let filters = EntryFilters {
                    project,
                    log_key,
                    agent,
                    contains,
                    limit: Some(limit),
                };
                let entries = append::query_entries(&store, &filters)?;
                print_ok(json!({"entries": entries}));
            }
        },
    }

    Ok(())
}
