//! TOC generator and the shared GitHub-style anchor algorithm.
//!
//! Anchor derivation is the single source of truth for both TOC links and
//! crosslink validation; the two must not diverge.

use crate::core::frontmatter::{body_lines, render_lines};
use crate::core::index::DocumentIndex;
use rustc_hash::FxHashMap;
use unicode_normalization::UnicodeNormalization;

/// Derive a GitHub-style anchor from heading text: NFKD normalize, strip
/// emoji, lowercase, collapse runs of non-`[a-z0-9]` to `-`, trim `-`.
pub fn github_anchor(heading: &str) -> String {
    let mut out = String::with_capacity(heading.len());
    let mut pending_dash = false;
    for ch in heading.nfkd() {
        if is_stripped(ch) {
            continue;
        }
        let lowered = ch.to_lowercase();
        for lc in lowered {
            if lc.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(lc);
            } else {
                pending_dash = true;
            }
        }
    }
    out
}

/// Characters removed entirely (no dash): emoji and the combining marks
/// that NFKD splits off accented letters.
fn is_stripped(ch: char) -> bool {
    matches!(u32::from(ch),
        0x1F000..=0x1FAFF   // pictographs, transport, supplemental
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // misc symbols and arrows
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x0300..=0x036F   // combining diacritical marks
        | 0x1AB0..=0x1AFF   // combining marks extended
        | 0x20D0..=0x20FF   // combining marks for symbols
        | 0xFE20..=0xFE2F   // combining half marks
    )
}

/// Slugs for every heading in document order, collision-suffixed `-1`, `-2`.
pub fn heading_slugs(index: &DocumentIndex) -> Vec<String> {
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut slugs = Vec::with_capacity(index.headings.len());
    for h in &index.headings {
        let base = github_anchor(&h.text);
        let n = seen.entry(base.clone()).or_insert(0);
        let slug = if *n == 0 {
            base.clone()
        } else {
            format!("{}-{}", base, n)
        };
        *n += 1;
        slugs.push(slug);
    }
    slugs
}

/// The set of anchors a link may target in this document.
pub fn anchor_set(body: &str) -> Vec<String> {
    let lines = body_lines(body);
    let index = DocumentIndex::build(&lines);
    heading_slugs(&index)
}

/// Result of a TOC generation pass.
#[derive(Debug, Clone)]
pub struct TocOutcome {
    pub body: String,
    /// True when markers were absent and freshly inserted.
    pub inserted_markers: bool,
    pub entries: usize,
}

/// Generate or refresh the table of contents between `marker_start` and
/// `marker_end`. Absent markers are inserted after a leading H1 title line
/// (or at the top of the body). Idempotent.
pub fn generate_toc(body: &str, marker_start: &str, marker_end: &str) -> TocOutcome {
    let lines = body_lines(body);
    let index = DocumentIndex::build(&lines);
    let slugs = heading_slugs(&index);

    // A leading H1 is the document title; it keeps its slug but is not
    // listed in its own TOC.
    let leading_h1 = index
        .headings
        .first()
        .filter(|h| {
            h.level == 1
                && lines[..h.line - 1].iter().all(|l| l.trim().is_empty())
        })
        .map(|h| h.line);

    let listed: Vec<(&crate::core::index::Heading, &str)> = index
        .headings
        .iter()
        .zip(slugs.iter())
        .filter(|(h, _)| Some(h.line) != leading_h1)
        .map(|(h, s)| (h, s.as_str()))
        .collect();
    let min_level = listed
        .iter()
        .map(|(h, _)| h.level as usize)
        .min()
        .unwrap_or(1);

    let mut entries: Vec<String> = Vec::with_capacity(listed.len());
    for (heading, slug) in &listed {
        let indent = "  ".repeat(heading.level as usize - min_level);
        entries.push(format!("{}- [{}](#{})", indent, heading.text, slug));
    }

    let start_at = lines
        .iter()
        .enumerate()
        .find(|(i, l)| l.trim() == marker_start && !index.in_fence(i + 1))
        .map(|(i, _)| i);
    let end_at = lines
        .iter()
        .enumerate()
        .find(|(i, l)| l.trim() == marker_end && !index.in_fence(i + 1))
        .map(|(i, _)| i);

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + entries.len() + 4);
    let mut inserted_markers = false;

    match (start_at, end_at) {
        (Some(s), Some(e)) if s < e => {
            out.extend(lines[..=s].iter().cloned());
            out.extend(entries.iter().cloned());
            out.extend(lines[e..].iter().cloned());
        }
        _ => {
            inserted_markers = true;
            let insert_after = leading_h1.unwrap_or(0);
            out.extend(lines[..insert_after].iter().cloned());
            if insert_after > 0 {
                out.push(String::new());
            }
            out.push(marker_start.to_string());
            out.extend(entries.iter().cloned());
            out.push(marker_end.to_string());
            let rest = &lines[insert_after..];
            if !rest.is_empty() && !rest[0].trim().is_empty() {
                out.push(String::new());
            }
            out.extend(rest.iter().cloned());
        }
    }

    TocOutcome {
        body: render_lines(&out),
        inserted_markers,
        entries: entries.len(),
    }
}
