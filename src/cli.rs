//! CLI struct definitions for the Scribe command-line adapter.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`. The
//! adapter only parses arguments and maps engine results to JSON envelopes;
//! project identity is always an explicit argument.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "scribe",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first documentation and audit-log engine: deterministic Markdown edits, registry-backed identity, hash-chained logs.",
    disable_version_flag = true
)]
pub(crate) struct Cli {
    /// Store directory (defaults to $SCRIBE_HOME, then ~/.scribe)
    #[clap(long, global = true)]
    pub store: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print the version
    Version,
    /// Project identity management
    Project(ProjectCli),
    /// Document registration, creation, and mutation
    Docs(DocsCli),
    /// Append-only logs: append, rotate, query
    Log(LogCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct ProjectCli {
    #[clap(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ProjectCommand {
    /// Create or update a project identity
    Set {
        name: String,
        /// Project root directory (canonicalized; must exist)
        #[clap(long)]
        root: PathBuf,
        /// Docs directory, relative to the root (default: docs)
        #[clap(long)]
        docs_dir: Option<PathBuf>,
        /// Dedicated progress log path, relative to the root
        #[clap(long)]
        progress_log: Option<PathBuf>,
        /// Defaults map as a JSON object
        #[clap(long)]
        defaults: Option<String>,
    },
    /// List registered projects
    List,
    /// Show one project
    Show { name: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct DocsCli {
    #[clap(subcommand)]
    pub command: DocsCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum DocsCommand {
    /// Register an existing file under a doc key
    Register {
        project: String,
        key: String,
        path: PathBuf,
        #[clap(long, default_value = "doc")]
        doc_type: String,
    },
    /// List a project's registered docs
    List { project: String },
    /// Create a new document from content or a structured description
    Create {
        project: String,
        /// Path relative to the project's docs dir
        path: String,
        /// Verbatim body content
        #[clap(long, conflicts_with = "spec_json")]
        content: Option<String>,
        /// Full DocSpec as JSON (sections, snippet, frontmatter, title)
        #[clap(long)]
        spec_json: Option<String>,
        /// Register the new file under this doc key
        #[clap(long)]
        register: Option<String>,
        /// Acting agent recorded in the audit trail
        #[clap(long, default_value = "cli")]
        agent: String,
    },
    /// Apply a structured edit (or patch) to a registered doc
    Edit {
        project: String,
        doc: String,
        /// Edit as JSON, e.g. '{"op":"replace_section","section_slug":"overview","content":"..."}'
        edit_json: String,
        #[clap(long, default_value = "cli")]
        agent: String,
        /// Also append a doc_updates log entry
        #[clap(long)]
        log_update: bool,
    },
    /// Canonicalize headings (idempotent)
    Normalize {
        project: String,
        doc: String,
        #[clap(long, default_value = "cli")]
        agent: String,
    },
    /// Generate or refresh the table of contents (idempotent)
    Toc {
        project: String,
        doc: String,
        #[clap(long, default_value = "cli")]
        agent: String,
    },
    /// Update named frontmatter scalar fields
    Frontmatter {
        project: String,
        doc: String,
        /// key=value pairs
        #[clap(long = "set", required = true)]
        sets: Vec<String>,
        #[clap(long, default_value = "cli")]
        agent: String,
    },
    /// Validate crosslinks (read-only)
    CheckLinks {
        project: String,
        doc: String,
        #[clap(long)]
        check_anchors: bool,
    },
    /// Show the mutation audit trail for a doc
    Changes {
        project: String,
        doc: String,
        #[clap(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Reconcile the mirror-pending queue into the store
    ReconcileMirror,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LogCli {
    #[clap(subcommand)]
    pub command: LogCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LogCommand {
    /// Append one entry to a project log
    Append {
        project: String,
        log_key: String,
        message: String,
        #[clap(long, default_value = "cli")]
        agent: String,
        /// Entry status (selects the line emoji)
        #[clap(long, default_value = "info")]
        status: String,
        /// Metadata as key=value pairs
        #[clap(long = "meta")]
        meta: Vec<String>,
    },
    /// Append a batch of entries under one lock acquisition
    Bulk {
        project: String,
        log_key: String,
        /// Items as a JSON array of {message, status?, metadata?}
        items_json: String,
        #[clap(long, default_value = "cli")]
        agent: String,
    },
    /// Archive the active log and start the next file in the chain
    Rotate {
        project: String,
        log_key: String,
    },
    /// Tail the last N entries of the active log
    Recent {
        project: String,
        log_key: String,
        #[clap(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Walk the rotation chain and verify every archived hash
    VerifyChain {
        project: String,
        log_key: String,
    },
    /// Query the mirrored entries table
    Query {
        #[clap(long)]
        project: Option<String>,
        #[clap(long)]
        log_key: Option<String>,
        #[clap(long)]
        agent: Option<String>,
        /// Substring match on the message
        #[clap(long)]
        contains: Option<String>,
        #[clap(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}
