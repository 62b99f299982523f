use tree_sitter::Node;

use crate::TextRange;

/// Extract the source text for a tree-sitter node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Node text with all whitespace removed (`a . b` → `a.b`).
pub fn compact_text(node: Node<'_>, source: &str) -> String {
    node_text(node, source)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Find a child by field name.
pub fn child_by_field<'a>(node: Node<'a>, field: &str) -> Option<Node<'a>> {
    node.child_by_field_name(field)
}

/// Number of named children, ignoring comments (argument lists).
pub fn named_arg_count(args: Node<'_>) -> usize {
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|c| !matches!(c.kind(), "comment" | "line_comment" | "block_comment"))
        .count()
}

/// True when the node or any ancestor is a syntax error region.
pub fn inside_error(node: Node<'_>) -> bool {
    if node.has_error() {
        return true;
    }
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.is_error() {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// Extract a block doc comment (/** ... */) from the preceding sibling.
pub fn extract_block_doc_comment(node: Node<'_>, source: &str) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" && prev.kind() != "block_comment" {
        return None;
    }

    let text = node_text(prev, source);
    if !text.starts_with("/**") {
        return None;
    }

    let inner = text
        .strip_prefix("/**")
        .unwrap_or(text)
        .strip_suffix("*/")
        .unwrap_or(text)
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("* ")
                .or(trimmed.strip_prefix('*'))
                .unwrap_or(trimmed)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    (!inner.is_empty()).then_some(inner)
}

/// Extract a Python docstring from the first statement of a block.
pub fn extract_python_docstring(block: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = block.walk();
    let first_stmt = block.named_children(&mut cursor).next()?;
    if first_stmt.kind() != "expression_statement" {
        return None;
    }

    let expr = first_stmt.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }

    let text = node_text(expr, source);
    let content = text
        .strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .or_else(|| text.strip_prefix("'''").and_then(|s| s.strip_suffix("'''")))
        .unwrap_or(text)
        .trim()
        .to_string();

    (!content.is_empty()).then_some(content)
}

/// Convert a tree-sitter node to a `TextRange`.
pub fn node_range(node: Node<'_>) -> TextRange {
    node.range().into()
}
