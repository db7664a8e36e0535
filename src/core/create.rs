//! Doc creator: render a new document from a body or structured description.
//!
//! Callers never supply template code; the engine renders. Multiline bodies
//! are preserved unchanged, with no escape-sequence interpretation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One section of a structured document description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub heading: String,
    /// Section anchor slug; emitted as `<!-- ID: slug -->` above the heading.
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Heading level, default 2.
    #[serde(default)]
    pub level: Option<u8>,
}

/// Description of a document to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocSpec {
    /// Verbatim body; when set, `title`/`snippet`/`sections` are ignored.
    pub content: Option<String>,
    /// Optional frontmatter scalars, emitted in insertion order.
    pub frontmatter: BTreeMap<String, String>,
    /// H1 title line.
    pub title: Option<String>,
    /// Prelude text placed between the title and the first section.
    pub snippet: Option<String>,
    pub sections: Vec<SectionSpec>,
    pub doc_type: String,
}

impl Default for DocSpec {
    fn default() -> Self {
        Self {
            content: None,
            frontmatter: BTreeMap::new(),
            title: None,
            snippet: None,
            sections: Vec::new(),
            doc_type: "doc".to_string(),
        }
    }
}

/// Render the full on-disk contents for a new document.
pub fn render_document(spec: &DocSpec) -> String {
    let mut out = String::new();

    if !spec.frontmatter.is_empty() {
        out.push_str("---\n");
        for (key, value) in &spec.frontmatter {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out.push_str("---\n");
    }

    if let Some(content) = &spec.content {
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        return out;
    }

    if let Some(title) = &spec.title {
        out.push_str(&format!("# {}\n", title));
    }

    if let Some(snippet) = &spec.snippet {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(snippet);
        if !snippet.ends_with('\n') {
            out.push('\n');
        }
    }

    for section in &spec.sections {
        if !out.is_empty() {
            out.push('\n');
        }
        if let Some(anchor) = &section.anchor {
            out.push_str(&format!("<!-- ID: {} -->\n", anchor));
        }
        let level = section.level.unwrap_or(2).clamp(1, 6) as usize;
        out.push_str(&format!("{} {}\n", "#".repeat(level), section.heading));
        if !section.body.is_empty() {
            out.push_str(&section.body);
            if !section.body.ends_with('\n') {
                out.push('\n');
            }
        }
    }

    out
}
