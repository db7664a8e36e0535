//! Anchor and section index over a document body.
//!
//! A single pass classifies every body line, matching fence runs so that
//! fenced-code interiors never contribute headings or anchors. Section
//! anchors are HTML comments of the form `<!-- ID: slug -->` placed on the
//! line immediately preceding a heading.

use crate::core::error::{ErrorCode, ScribeError};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

/// Classification of a single body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    FenceOpen,
    FenceBody,
    FenceClose,
    AtxHeading(u8),
    SetextUnderline(u8),
    AnchorComment,
    Blank,
    Other,
}

/// A heading with its 1-based body-relative line number.
#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u8,
    pub line: usize,
    pub text: String,
}

/// A resolved section anchor.
///
/// The section spans `heading_line` through `terminator_line - 1`; its
/// replaceable contents are `first_content_line ..= terminator_line - 1`.
#[derive(Debug, Clone)]
pub struct AnchorEntry {
    pub slug: String,
    pub anchor_line: usize,
    pub heading_line: usize,
    pub heading_level: u8,
    pub first_content_line: usize,
    pub terminator_line: usize,
}

/// Index of one document body: line kinds, headings, anchors, fence spans.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pub kinds: Vec<LineKind>,
    pub headings: Vec<Heading>,
    pub anchors: Vec<AnchorEntry>,
    /// Inclusive (open, close) line spans of fenced code, 1-based.
    pub fences: Vec<(usize, usize)>,
    pub line_count: usize,
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*<!--\s*ID:\s*([^\s>]+)\s*-->\s*$").unwrap())
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(`{3,}|~{3,})(.*)$").unwrap())
}

/// Parse an ATX heading: returns (level, text) with trailing closing hashes
/// and whitespace stripped.
pub fn parse_atx(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest
        .trim()
        .trim_end_matches('#')
        .trim_end()
        .to_string();
    Some((hashes as u8, text))
}

/// Loose ATX form: `##Title` with no space. Not a heading for section math,
/// but the normalizer repairs it, so the classifier must recognize it.
pub fn parse_loose_atx(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') || rest.starts_with('#') {
        return None;
    }
    Some((hashes as u8, rest.trim().to_string()))
}

fn setext_level(line: &str) -> Option<u8> {
    let t = line.trim_end();
    if !t.is_empty() && t.chars().all(|c| c == '=') {
        return Some(1);
    }
    if t.len() >= 2 && t.chars().all(|c| c == '-') {
        return Some(2);
    }
    None
}

impl DocumentIndex {
    /// Build the index over LF-normalized body lines.
    pub fn build(lines: &[String]) -> Self {
        let mut kinds = vec![LineKind::Other; lines.len()];
        let mut fences: Vec<(usize, usize)> = Vec::new();

        // Fence pass. A close fence uses the same character with a run at
        // least as long as the opener and nothing but whitespace after it.
        let mut open: Option<(usize, char, usize)> = None;
        for (i, line) in lines.iter().enumerate() {
            match open {
                None => {
                    if let Some(caps) = fence_re().captures(line) {
                        let run = caps.get(1).unwrap().as_str();
                        kinds[i] = LineKind::FenceOpen;
                        open = Some((i, run.chars().next().unwrap(), run.len()));
                    }
                }
                Some((start, ch, len)) => {
                    let t = line.trim();
                    let closes = t.chars().take_while(|&c| c == ch).count() >= len
                        && t.chars().all(|c| c == ch);
                    if closes {
                        kinds[i] = LineKind::FenceClose;
                        fences.push((start + 1, i + 1));
                        open = None;
                    } else {
                        kinds[i] = LineKind::FenceBody;
                    }
                }
            }
        }
        if let Some((start, _, _)) = open {
            // Unterminated fence runs to end of body.
            fences.push((start + 1, lines.len()));
        }

        // Heading / anchor / blank pass, fences excluded.
        let mut headings: Vec<Heading> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if kinds[i] != LineKind::Other {
                continue;
            }
            if line.trim().is_empty() {
                kinds[i] = LineKind::Blank;
                continue;
            }
            if anchor_re().is_match(line) {
                kinds[i] = LineKind::AnchorComment;
                continue;
            }
            if let Some((level, text)) = parse_atx(line) {
                kinds[i] = LineKind::AtxHeading(level);
                headings.push(Heading {
                    level,
                    line: i + 1,
                    text,
                });
                continue;
            }
            if let Some(level) = setext_level(line) {
                // Only an underline when the previous line is plain text.
                if i > 0 && kinds[i - 1] == LineKind::Other {
                    kinds[i] = LineKind::SetextUnderline(level);
                    kinds[i - 1] = LineKind::AtxHeading(level);
                    headings.push(Heading {
                        level,
                        line: i,
                        text: lines[i - 1].trim().to_string(),
                    });
                }
            }
        }
        headings.sort_by_key(|h| h.line);

        // Anchor pass: an anchor binds to the heading on the line
        // immediately before or immediately after it (next line preferred).
        let mut anchors: Vec<AnchorEntry> = Vec::new();
        let line_count = lines.len();
        for (i, line) in lines.iter().enumerate() {
            if kinds[i] != LineKind::AnchorComment {
                continue;
            }
            let Some(caps) = anchor_re().captures(line) else {
                continue;
            };
            let anchor_line = i + 1;
            let heading = headings
                .iter()
                .find(|h| h.line == anchor_line + 1)
                .or_else(|| headings.iter().find(|h| h.line + 1 == anchor_line));
            let Some(heading) = heading else {
                continue; // dangling anchor, not a section
            };
            let terminator_line = headings
                .iter()
                .find(|h| h.line > heading.line && h.level <= heading.level)
                .map(|h| h.line)
                .unwrap_or(line_count + 1);
            anchors.push(AnchorEntry {
                slug: caps.get(1).unwrap().as_str().to_string(),
                anchor_line,
                heading_line: heading.line,
                heading_level: heading.level,
                first_content_line: anchor_line.max(heading.line) + 1,
                terminator_line,
            });
        }

        DocumentIndex {
            kinds,
            headings,
            anchors,
            fences,
            line_count,
        }
    }

    pub fn in_fence(&self, line: usize) -> bool {
        self.fences
            .iter()
            .any(|&(start, end)| line >= start && line <= end)
    }

    /// Resolve a section slug to its unique anchor.
    ///
    /// Duplicate slugs fail with `AMBIGUOUS_ANCHOR` listing every occurrence
    /// line; a missing slug fails with `SECTION_NOT_FOUND`.
    pub fn resolve_section(&self, slug: &str) -> Result<&AnchorEntry, ScribeError> {
        let matches: Vec<&AnchorEntry> =
            self.anchors.iter().filter(|a| a.slug == slug).collect();
        match matches.len() {
            0 => Err(ScribeError::engine_with(
                ErrorCode::SectionNotFound,
                format!("no section anchored by '{}'", slug),
                json!({
                    "slug": slug,
                    "known": self.anchors.iter().map(|a| a.slug.clone()).collect::<Vec<_>>(),
                }),
            )),
            1 => Ok(matches[0]),
            _ => Err(ScribeError::engine_with(
                ErrorCode::AmbiguousAnchor,
                format!("anchor '{}' appears {} times", slug, matches.len()),
                json!({
                    "slug": slug,
                    "lines": matches.iter().map(|a| a.anchor_line).collect::<Vec<_>>(),
                }),
            )),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frontmatter::body_lines;

    fn index_of(body: &str) -> DocumentIndex {
        DocumentIndex::build(&body_lines(body))
    }

    #[test]
    fn test_headings_and_anchor_sections() {
        let idx = index_of(
            "# Title\n\n<!-- ID: overview -->\n## Overview\nold body\n\n## Next\ntail\n",
        );
        assert_eq!(idx.headings.len(), 3);
        let a = idx.resolve_section("overview").unwrap();
        assert_eq!(a.heading_line, 4);
        assert_eq!(a.heading_level, 2);
        assert_eq!(a.first_content_line, 5);
        assert_eq!(a.terminator_line, 7);
    }

    #[test]
    fn test_section_runs_to_end_of_body() {
        let idx = index_of("<!-- ID: tail -->\n## Tail\nline\nline\n");
        let a = idx.resolve_section("tail").unwrap();
        assert_eq!(a.terminator_line, 5);
    }

    #[test]
    fn test_fenced_code_hides_headings_and_anchors() {
        let idx = index_of(
            "# Real\n```\n# not a heading\n<!-- ID: fake -->\n## also not\n```\n## After\n",
        );
        assert_eq!(idx.headings.len(), 2);
        assert!(idx.resolve_section("fake").is_err());
        assert_eq!(idx.fences, vec![(2, 6)]);
    }

    #[test]
    fn test_duplicate_slug_is_ambiguous_with_lines() {
        let idx = index_of(
            "<!-- ID: phase_0 -->\n## A\nx\n<!-- ID: phase_0 -->\n## B\ny\n",
        );
        let err = idx.resolve_section("phase_0").unwrap_err();
        match err {
            ScribeError::Engine(e) => {
                assert_eq!(e.code, ErrorCode::AmbiguousAnchor);
                assert_eq!(e.diagnostics["lines"][0], 1);
                assert_eq!(e.diagnostics["lines"][1], 4);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_setext_headings_are_indexed_at_text_line() {
        let idx = index_of("Title\n=====\nbody\nSub\n---\n");
        assert_eq!(idx.headings[0].level, 1);
        assert_eq!(idx.headings[0].line, 1);
        assert_eq!(idx.headings[1].level, 2);
        assert_eq!(idx.headings[1].line, 4);
    }

    #[test]
    fn test_tilde_fence_with_longer_close() {
        let idx = index_of("~~~\ncode\n~~~~\nafter\n");
        assert_eq!(idx.fences, vec![(1, 3)]);
        assert_eq!(idx.kinds[3], LineKind::Other);
    }

    #[test]
    fn test_anchor_after_its_heading_binds_to_it() {
        let idx = index_of("# Title\n## Overview\n<!-- ID: overview -->\nold body\n");
        let a = idx.resolve_section("overview").unwrap();
        assert_eq!(a.heading_line, 2);
        assert_eq!(a.first_content_line, 4);
        assert_eq!(a.terminator_line, 5);
    }

    #[test]
    fn test_dangling_anchor_is_not_a_section() {
        let idx = index_of("<!-- ID: stray -->\nnot a heading\n");
        assert!(idx.anchors.is_empty());
    }
}
