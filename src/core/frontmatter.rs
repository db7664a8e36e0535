//! Frontmatter engine: split a document into its frontmatter block and body.
//!
//! Frontmatter bytes are preserved identically across any body mutation.
//! All line numbers exposed by the engine are body-relative: line 1 is the
//! first body line; frontmatter contributes `body_line_offset` but never
//! counts toward line math.

use crate::core::error::{ErrorCode, ScribeError};
use serde_json::json;
use unicode_normalization::UnicodeNormalization;

/// A document split into preserved frontmatter bytes and a mutable body.
#[derive(Debug, Clone)]
pub struct SplitDocument {
    /// Raw frontmatter bytes, fences included; empty when absent.
    pub frontmatter: String,
    /// Body text, NFC-normalized. Line endings are normalized to LF when
    /// the body is taken apart for mutation; frontmatter is never touched.
    pub body: String,
    /// File line number of the first body line (1 when no frontmatter).
    pub body_line_offset: usize,
}

/// Split `raw` into frontmatter and body.
///
/// Frontmatter is detected iff the file begins exactly with `---` on its own
/// line (LF or CRLF) and a closing `---` line follows. Anything else is all
/// body.
pub fn split(raw: &str) -> SplitDocument {
    let has_open = raw.starts_with("---\n") || raw.starts_with("---\r\n");
    if has_open {
        let mut consumed = 0usize; // byte offset past the last consumed line
        let mut line_count = 0usize;
        for (i, line) in raw.split_inclusive('\n').enumerate() {
            consumed += line.len();
            line_count = i + 1;
            if i == 0 {
                continue;
            }
            if line.trim_end_matches(['\r', '\n']) == "---" {
                let frontmatter = raw[..consumed].to_string();
                let body = raw[consumed..].nfc().collect::<String>();
                return SplitDocument {
                    frontmatter,
                    body,
                    body_line_offset: line_count + 1,
                };
            }
        }
        // Unterminated fence: treat the whole file as body.
    }
    SplitDocument {
        frontmatter: String::new(),
        body: raw.nfc().collect(),
        body_line_offset: 1,
    }
}

/// Reattach frontmatter and body verbatim.
pub fn join(frontmatter: &str, body: &str) -> String {
    let mut out = String::with_capacity(frontmatter.len() + body.len());
    out.push_str(frontmatter);
    out.push_str(body);
    out
}

/// Decompose a body into LF-normalized lines for body-relative arithmetic.
pub fn body_lines(body: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = body
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();
    // A trailing newline produces one phantom empty segment; drop it so the
    // canonical render below round-trips.
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Render lines back to the canonical body form: LF separators, exactly one
/// trailing newline for a non-empty body.
pub fn render_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Replace the values of named scalar keys inside an existing frontmatter
/// block, preserving key order, unknown keys, and surrounding whitespace.
/// Keys not already present are inserted before the closing fence.
pub fn update_fields(
    frontmatter: &str,
    updates: &[(String, String)],
) -> Result<String, ScribeError> {
    if frontmatter.is_empty() {
        return Err(ScribeError::engine_with(
            ErrorCode::SectionNotFound,
            "document has no frontmatter block to update",
            json!({"keys": updates.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()}),
        ));
    }

    let mut remaining: Vec<&(String, String)> = updates.iter().collect();
    let mut out_lines: Vec<String> = Vec::new();
    let raw_lines: Vec<&str> = frontmatter.split_inclusive('\n').collect();
    let last = raw_lines.len().saturating_sub(1);

    for (i, raw_line) in raw_lines.iter().enumerate() {
        if i == last {
            // Insert any keys that were not present, just above the fence.
            for (key, value) in remaining.drain(..) {
                out_lines.push(format!("{}: {}\n", key, value));
            }
            out_lines.push(raw_line.to_string());
            continue;
        }
        if i == 0 {
            out_lines.push(raw_line.to_string());
            continue;
        }

        let stripped = raw_line.trim_end_matches(['\r', '\n']);
        let mut replaced = false;
        if let Some(colon) = stripped.find(':') {
            let key = stripped[..colon].trim();
            if let Some(pos) = remaining.iter().position(|(k, _)| k == key) {
                let (_, value) = remaining.remove(pos);
                let prefix = &stripped[..colon];
                let newline = &raw_line[stripped.len()..];
                out_lines.push(format!("{}: {}{}", prefix, value, newline));
                replaced = true;
            }
        }
        if !replaced {
            out_lines.push(raw_line.to_string());
        }
    }

    Ok(out_lines.concat())
}
