//! Tree-sitter helpers shared by the source extractors.

use crate::{Error, Result};
use tree_sitter::{Language as Grammar, Node, Parser, Tree};

/// Parse `source` with `grammar`. A fresh parser per call keeps workers
/// independent; parsers are not `Sync`.
pub fn parse(grammar: &Grammar, source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| Error::Grammar(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse("parser returned no tree".to_string()))
}

/// Source text of a node. Invalid UTF-8 slices yield an empty string.
pub fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

pub fn field_text<'a>(node: Node<'_>, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

/// Collapse runs of whitespace (including newlines) to single spaces.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty line of a doc, cut to `max` characters with `...`.
pub fn summary(doc: &str, max: usize) -> Option<String> {
    let line = doc.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() <= max {
        return Some(line.to_string());
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    Some(format!("{}...", cut.trim_end()))
}

/// Line comments directly above `node`, without blank lines in between,
/// oldest first. `prefix` is stripped from each line.
pub fn leading_comments(node: Node<'_>, source: &str, kind: &str, prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut cursor = node.prev_named_sibling();

    while let Some(prev) = cursor {
        if prev.kind() != kind || prev.end_position().row + 1 != expected_row {
            break;
        }
        let raw = text(prev, source);
        lines.push(raw.strip_prefix(prefix).unwrap_or(raw).trim().to_string());
        expected_row = prev.start_position().row;
        cursor = prev.prev_named_sibling();
    }

    lines.reverse();
    lines
}

/// Named children of `node` with the given kind.
pub fn children_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() == kind)
        .collect()
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}
