use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::language::Language;
use crate::parser::node_location;
use crate::profile::{is_block, is_control_flow, is_statement};
use crate::types::MAX_COMPLEXITY_SCORE;
use tree_sitter::Node;

/// Raw counts behind a complexity score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplexityCounts {
    pub control_flow: usize,
    pub max_block_depth: usize,
    pub statements: usize,
    pub lines: usize,
}

impl ComplexityCounts {
    /// `1 + 2·control_flow + max_block_depth + round(5·statements/lines)`, clamped
    pub fn score(&self) -> u32 {
        let lines = self.lines.max(1);
        #[allow(clippy::cast_precision_loss)]
        let density = (5.0 * self.statements as f64 / lines as f64).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let density = density as usize;
        let raw = 1usize
            .saturating_add(self.control_flow.saturating_mul(2))
            .saturating_add(self.max_block_depth)
            .saturating_add(density);
        u32::try_from(raw)
            .unwrap_or(MAX_COMPLEXITY_SCORE)
            .min(MAX_COMPLEXITY_SCORE)
    }
}

/// Count branches, block depth and statements below `node`
pub fn count_node(node: Node<'_>, checkpoint: &Checkpoint<'_>) -> Result<ComplexityCounts> {
    let (start, end) = node_location(node);
    let mut counts = ComplexityCounts {
        lines: end - start + 1,
        ..Default::default()
    };

    let mut cursor = node.walk();
    let mut stack = vec![(node, 0usize)];
    while let Some((current, depth)) = stack.pop() {
        checkpoint.tick()?;
        let kind = current.kind();
        let depth = if is_block(kind) { depth + 1 } else { depth };
        counts.max_block_depth = counts.max_block_depth.max(depth);
        if is_control_flow(kind) {
            counts.control_flow += 1;
        }
        if current.id() != node.id() && is_statement(kind) {
            counts.statements += 1;
        }
        for child in current.named_children(&mut cursor) {
            stack.push((child, depth));
        }
    }
    Ok(counts)
}

/// Complexity score of a syntax node
pub fn node_complexity(node: Node<'_>, checkpoint: &Checkpoint<'_>) -> Result<u32> {
    Ok(count_node(node, checkpoint)?.score())
}

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "elif", "else if", "for", "foreach", "while", "loop", "match", "switch", "case",
    "catch", "except", "when", "unless", "until",
];

/// Line-level estimate used for chunks without a syntax tree
pub fn text_complexity(text: &str, language: Language) -> u32 {
    let comments = language.comment_prefixes();
    let mut counts = ComplexityCounts::default();
    let mut brace_depth = 0usize;

    for line in text.lines() {
        counts.lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || comments.iter().any(|p| trimmed.starts_with(p)) {
            continue;
        }
        counts.statements += 1;

        let head = trimmed.trim_start_matches(['}', ')', ' ']);
        if CONTROL_KEYWORDS.iter().any(|kw| {
            head.strip_prefix(kw)
                .is_some_and(|rest| rest.is_empty() || !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
        }) {
            counts.control_flow += 1;
        }

        if language.uses_braces() {
            for c in trimmed.chars() {
                match c {
                    '{' => {
                        brace_depth += 1;
                        counts.max_block_depth = counts.max_block_depth.max(brace_depth);
                    }
                    '}' => brace_depth = brace_depth.saturating_sub(1),
                    _ => {}
                }
            }
        } else {
            let indent = line.len() - line.trim_start().len();
            counts.max_block_depth = counts.max_block_depth.max(indent / 4);
        }
    }
    counts.score()
}
