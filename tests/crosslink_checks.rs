use scribe::core::crosslink;
use scribe::core::frontmatter;
use tempfile::tempdir;

fn write(root: &std::path::Path, rel: &str, content: &str) -> std::path::PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn valid_relative_links_produce_no_diagnostics() {
    let tmp = tempdir().unwrap();
    write(tmp.path(), "docs/TARGET.md", "## Overview\nx\n");
    let source = write(
        tmp.path(),
        "docs/SOURCE.md",
        "[t](TARGET.md)\n[a](TARGET.md#overview)\n",
    );
    let body = std::fs::read_to_string(&source).unwrap();

    let diagnostics = crosslink::validate_crosslinks(tmp.path(), &source, &body, true);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn external_links_are_ignored() {
    let tmp = tempdir().unwrap();
    let source = write(
        tmp.path(),
        "docs/SOURCE.md",
        "[w](https://example.com/page#frag)\n[m](mailto:a@b.c)\n",
    );
    let body = std::fs::read_to_string(&source).unwrap();
    assert!(crosslink::validate_crosslinks(tmp.path(), &source, &body, true).is_empty());
}

#[test]
fn escaping_link_is_reported_not_fatal() {
    let tmp = tempdir().unwrap();
    let source = write(tmp.path(), "docs/SOURCE.md", "[up](../../etc/passwd)\n");
    let body = std::fs::read_to_string(&source).unwrap();

    let diagnostics = crosslink::validate_crosslinks(tmp.path(), &source, &body, false);
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].problem.contains("escapes"));
    assert_eq!(diagnostics[0].line, 1);
}

#[test]
fn same_document_anchor_links_are_checked() {
    let tmp = tempdir().unwrap();
    let source = write(
        tmp.path(),
        "docs/SOURCE.md",
        "## Present\nx\n\n[ok](#present)\n[bad](#absent)\n",
    );
    let body = std::fs::read_to_string(&source).unwrap();

    let diagnostics = crosslink::validate_crosslinks(tmp.path(), &source, &body, true);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].target, "#absent");
}

#[test]
fn anchors_in_targets_with_frontmatter_resolve_against_the_body() {
    let tmp = tempdir().unwrap();
    write(
        tmp.path(),
        "docs/TARGET.md",
        "---\nid: t\n---\n## Only Heading\nx\n",
    );
    let source = write(
        tmp.path(),
        "docs/SOURCE.md",
        "[a](TARGET.md#only-heading)\n",
    );
    let raw = std::fs::read_to_string(&source).unwrap();
    let body = frontmatter::split(&raw).body;

    let diagnostics = crosslink::validate_crosslinks(tmp.path(), &source, &body, true);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn links_inside_fenced_code_are_not_validated() {
    let tmp = tempdir().unwrap();
    let source = write(
        tmp.path(),
        "docs/SOURCE.md",
        "```\n[gone](NOWHERE.md)\n```\n",
    );
    let body = std::fs::read_to_string(&source).unwrap();
    assert!(crosslink::validate_crosslinks(tmp.path(), &source, &body, true).is_empty());
}
