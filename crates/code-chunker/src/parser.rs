use crate::language::Language;
use std::fmt::Debug;
use tree_sitter::{Node, Parser, Tree};

/// Share of the file that top-level error nodes may cover before the parse counts as failed
pub const MAX_ERROR_COVERAGE: f64 = 0.5;

/// Result of one parse attempt
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub tree: Option<Tree>,
    pub error: Option<String>,
}

impl ParseOutcome {
    pub fn parsed(tree: Tree) -> Self {
        Self {
            tree: Some(tree),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            tree: None,
            error: Some(error.into()),
        }
    }
}

/// Parser facade used by the AST splitter
pub trait SyntaxParser: Send + Sync + Debug {
    /// Parse `content` within `budget_ms` milliseconds
    fn parse(&self, content: &str, language: Language, budget_ms: u64) -> ParseOutcome;
}

/// Tree-sitter backed parser; a fresh [`Parser`] is created per call
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl SyntaxParser for TreeSitterParser {
    fn parse(&self, content: &str, language: Language, budget_ms: u64) -> ParseOutcome {
        let ts_language = match language.tree_sitter_language() {
            Ok(lang) => lang,
            Err(e) => return ParseOutcome::failed(e.to_string()),
        };

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&ts_language) {
            return ParseOutcome::failed(format!("Failed to set language: {e}"));
        }
        parser.set_timeout_micros(budget_ms.max(1).saturating_mul(1_000));

        match parser.parse(content, None) {
            Some(tree) => ParseOutcome::parsed(tree),
            None => ParseOutcome::failed(format!(
                "{language} parser gave up (timeout {budget_ms}ms or cancellation)"
            )),
        }
    }
}

/// Source text covered by a node
pub fn node_text<'c>(node: Node<'_>, content: &'c str) -> &'c str {
    content.get(node.byte_range()).unwrap_or_default()
}

/// 1-indexed inclusive line span of a node
pub fn node_location(node: Node<'_>) -> (usize, usize) {
    let start = node.start_position().row + 1;
    let mut end = node.end_position().row + 1;
    // A node ending at column 0 stops at the previous line's newline
    if node.end_position().column == 0 && end > start {
        end -= 1;
    }
    (start, end)
}

/// Declared name of a structural node
pub fn node_name(node: Node<'_>, content: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, content).to_string());
    }

    // C/C++ functions keep their name inside the declarator chain
    let mut current = node.child_by_field_name("declarator");
    while let Some(decl) = current {
        if matches!(
            decl.kind(),
            "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
        ) {
            return Some(node_text(decl, content).to_string());
        }
        current = decl.child_by_field_name("declarator");
    }

    // Go type declarations and impl blocks
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "type_spec" | "type_alias" => {
                if let Some(name) = child.child_by_field_name("name") {
                    return Some(node_text(name, content).to_string());
                }
            }
            "type_identifier" | "identifier" => {
                return Some(node_text(child, content).to_string());
            }
            _ => {}
        }
    }
    if node.kind() == "impl_item" {
        if let Some(ty) = node.child_by_field_name("type") {
            return Some(node_text(ty, content).to_string());
        }
    }
    None
}

/// Fraction of the file covered by top-level error nodes
pub fn error_coverage(tree: &Tree, content_len: usize) -> f64 {
    let root = tree.root_node();
    if !root.has_error() || content_len == 0 {
        return 0.0;
    }
    if root.is_error() {
        return 1.0;
    }
    let mut cursor = root.walk();
    let covered: usize = root
        .children(&mut cursor)
        .filter(|child| child.is_error() || child.is_missing())
        .map(|child| child.end_byte().saturating_sub(child.start_byte()))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let coverage = covered as f64 / content_len as f64;
    coverage.min(1.0)
}
