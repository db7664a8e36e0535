//! Header normalizer: canonicalize ATX/Setext headings, body-only.
//!
//! Running the normalizer twice produces no additional changes. Fenced code
//! is never touched.

use crate::core::frontmatter::{body_lines, render_lines};
use crate::core::index::{parse_atx, parse_loose_atx, DocumentIndex, LineKind};

/// Result of a normalization pass.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub body: String,
    /// Body-relative lines that were rewritten.
    pub changed_lines: Vec<usize>,
}

/// Normalize headings in `body`:
/// - ATX headings missing a space after `#` gain one (`##Title` -> `## Title`)
/// - Setext headings convert to ATX (`Title\n====` -> `# Title`)
/// - Trailing whitespace on heading lines is trimmed
///
/// Heading text itself is not modified, so numbering tokens survive.
pub fn normalize_headers(body: &str) -> NormalizeOutcome {
    let lines = body_lines(body);
    let index = DocumentIndex::build(&lines);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut changed: Vec<usize> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        match &index.kinds[i] {
            LineKind::FenceOpen | LineKind::FenceBody | LineKind::FenceClose => {
                out.push(line.clone());
            }
            LineKind::SetextUnderline(_) => {
                // The preceding text line was already emitted as ATX.
                changed.push(i + 1);
            }
            LineKind::AtxHeading(level) => {
                // Setext text lines are classified AtxHeading but carry no
                // leading hashes; convert them here.
                if !line.trim_start().starts_with('#') {
                    let rewritten = format!("{} {}", "#".repeat(*level as usize), line.trim());
                    if rewritten != *line {
                        changed.push(i + 1);
                    }
                    out.push(rewritten);
                } else if let Some((lvl, text)) = parse_atx(line) {
                    let rewritten = if text.is_empty() {
                        "#".repeat(lvl as usize)
                    } else {
                        format!("{} {}", "#".repeat(lvl as usize), text)
                    };
                    if rewritten != *line {
                        changed.push(i + 1);
                    }
                    out.push(rewritten);
                } else if let Some((lvl, text)) = parse_loose_atx(line) {
                    changed.push(i + 1);
                    out.push(format!("{} {}", "#".repeat(lvl as usize), text));
                } else {
                    out.push(line.clone());
                }
            }
            _ => {
                if let Some((lvl, text)) = parse_loose_atx(line) {
                    changed.push(i + 1);
                    out.push(format!("{} {}", "#".repeat(lvl as usize), text));
                } else {
                    out.push(line.clone());
                }
            }
        }
    }

    NormalizeOutcome {
        body: render_lines(&out),
        changed_lines: changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_space_after_hash_is_fixed() {
        let out = normalize_headers("##Title\nbody\n");
        assert_eq!(out.body, "## Title\nbody\n");
        assert_eq!(out.changed_lines, vec![1]);
    }

    #[test]
    fn test_setext_converts_to_atx_preserving_numbering() {
        let out = normalize_headers("1. Problem\n====\ntext\nDetails\n----\n");
        assert_eq!(out.body, "# 1. Problem\ntext\n## Details\n");
    }

    #[test]
    fn test_trailing_whitespace_trimmed_on_headings_only() {
        let out = normalize_headers("## Title   \nbody   \n");
        assert_eq!(out.body, "## Title\nbody   \n");
    }

    #[test]
    fn test_fenced_code_untouched() {
        let src = "# Real\n```\n##not-a-heading\n```\n";
        let out = normalize_headers(src);
        assert_eq!(out.body, src);
        assert!(out.changed_lines.is_empty());
    }

    #[test]
    fn test_normalize_is_a_fixed_point() {
        let once = normalize_headers("##One\nTwo\n---\n### Three  \n");
        let twice = normalize_headers(&once.body);
        assert_eq!(once.body, twice.body);
        assert!(twice.changed_lines.is_empty());
    }
}
