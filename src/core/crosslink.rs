//! Crosslink validator: read-only checks of related-doc links.
//!
//! Verifies that `path#anchor` links in a body resolve inside the project
//! and, optionally, that the anchor exists in the target document using the
//! same anchor algorithm as the TOC generator. Produces diagnostics; never
//! writes and never emits an audit record.

use crate::core::frontmatter;
use crate::core::index::DocumentIndex;
use crate::core::sandbox;
use crate::core::toc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// One problem found in a document's links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDiagnostic {
    /// Body-relative line of the offending link.
    pub line: usize,
    pub target: String,
    pub problem: String,
}

/// A link occurrence in the body, fenced code excluded.
#[derive(Debug, Clone)]
pub struct LinkRef {
    pub line: usize,
    pub target: String,
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Inline links only; images are skipped by the leading-bang check.
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(([^)\s]+)(?:\s+[^)]*)?\)").unwrap())
}

/// Collect link targets outside fenced code.
pub fn scan_links(body: &str) -> Vec<LinkRef> {
    let lines = frontmatter::body_lines(body);
    let index = DocumentIndex::build(&lines);

    let mut refs = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if index.in_fence(i + 1) {
            continue;
        }
        for caps in link_re().captures_iter(line) {
            let whole = caps.get(0).unwrap();
            if whole.start() > 0 && line.as_bytes()[whole.start() - 1] == b'!' {
                continue; // image, not a crosslink
            }
            refs.push(LinkRef {
                line: i + 1,
                target: caps.get(1).unwrap().as_str().to_string(),
            });
        }
    }
    refs
}

fn is_external(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("mailto:")
}

/// Validate every crosslink in `body`.
///
/// `doc_path` is the absolute path of the document being checked (anchors of
/// relative targets resolve against its parent directory); `project_root`
/// bounds every resolution.
pub fn validate_crosslinks(
    project_root: &Path,
    doc_path: &Path,
    body: &str,
    check_anchors: bool,
) -> Vec<LinkDiagnostic> {
    let mut diagnostics = Vec::new();
    let doc_dir = doc_path.parent().unwrap_or(project_root);

    for link in scan_links(body) {
        if is_external(&link.target) {
            continue;
        }

        let (path_part, anchor_part) = match link.target.split_once('#') {
            Some((p, a)) => (p, Some(a)),
            None => (link.target.as_str(), None),
        };

        // Same-document anchor link.
        if path_part.is_empty() {
            if check_anchors {
                if let Some(anchor) = anchor_part {
                    if !toc::anchor_set(body).iter().any(|a| a == anchor) {
                        diagnostics.push(LinkDiagnostic {
                            line: link.line,
                            target: link.target.clone(),
                            problem: format!("anchor '#{}' not found in this document", anchor),
                        });
                    }
                }
            }
            continue;
        }

        let candidate = doc_dir.join(path_part);
        let resolved = match sandbox::resolve_in_root(project_root, &candidate) {
            Ok(p) => p,
            Err(_) => {
                diagnostics.push(LinkDiagnostic {
                    line: link.line,
                    target: link.target.clone(),
                    problem: "target escapes the project root".to_string(),
                });
                continue;
            }
        };

        if !resolved.exists() {
            diagnostics.push(LinkDiagnostic {
                line: link.line,
                target: link.target.clone(),
                problem: "target file not found".to_string(),
            });
            continue;
        }

        if check_anchors {
            if let Some(anchor) = anchor_part {
                match std::fs::read_to_string(&resolved) {
                    Ok(raw) => {
                        let split = frontmatter::split(&raw);
                        if !toc::anchor_set(&split.body).iter().any(|a| a == anchor) {
                            diagnostics.push(LinkDiagnostic {
                                line: link.line,
                                target: link.target.clone(),
                                problem: format!(
                                    "anchor '#{}' not found in {}",
                                    anchor, path_part
                                ),
                            });
                        }
                    }
                    Err(_) => diagnostics.push(LinkDiagnostic {
                        line: link.line,
                        target: link.target.clone(),
                        problem: "target file not readable".to_string(),
                    }),
                }
            }
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_links_skips_fences_and_images() {
        let body = "[ok](a.md)\n```\n[no](b.md)\n```\n![img](c.png)\n";
        let refs = scan_links(body);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "a.md");
        assert_eq!(refs[0].line, 1);
    }

    #[test]
    fn test_scan_links_captures_anchored_targets() {
        let refs = scan_links("see [arch](docs/ARCHITECTURE.md#overview)\n");
        assert_eq!(refs[0].target, "docs/ARCHITECTURE.md#overview");
    }
}
