//! Signature-driven segmentation for languages without (or after failing) a syntax tree.
//!
//! Unindented declaration lines (`fn`, `def`, `class`, `func`, headings...) open a
//! segment; decorator, attribute and doc-comment lines directly above a signature
//! move with it. Small segments merge forward and oversized ones are windowed.

use crate::checkpoint::Checkpoint;
use crate::complexity::text_complexity;
use crate::config::ChunkingOptions;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::strategy::window_lines;
use crate::types::{Chunk, ChunkType};
use once_cell::sync::Lazy;
use regex::Regex;

struct SyntaxRules {
    signatures: Vec<(Regex, ChunkType)>,
    prefixes: Vec<Regex>,
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| log::error!("Invalid syntax signature {pattern}: {e}"))
        .ok()
}

fn rules(signatures: &[(&str, ChunkType)], prefixes: &[&str]) -> SyntaxRules {
    SyntaxRules {
        signatures: signatures
            .iter()
            .filter_map(|(p, t)| compile(p).map(|re| (re, *t)))
            .collect(),
        prefixes: prefixes.iter().filter_map(|p| compile(p)).collect(),
    }
}

const C_STYLE_PREFIXES: &[&str] = &[r"^\s*//", r"^\s*/\*", r"^\s*\*", r"^@\w+"];

static RULES: Lazy<Vec<(Language, SyntaxRules)>> = Lazy::new(|| {
    use crate::types::ChunkType::{Block, Class, Function, Namespace, Template};

    let js_signatures: &[(&str, ChunkType)] = &[
        (r"^(export\s+)?(default\s+)?(async\s+)?function\b", Function),
        (r"^(export\s+)?(default\s+)?(abstract\s+)?class\s+\w+", Class),
        (
            r"^(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s*)?(\([^)]*\)|\w+)\s*=>",
            Function,
        ),
    ];
    let ts_signatures: Vec<(&str, ChunkType)> = js_signatures
        .iter()
        .copied()
        .chain([
            (r"^(export\s+)?(declare\s+)?(interface|enum)\s+\w+", Class),
            (r"^(export\s+)?type\s+\w+", Class),
            (r"^(export\s+)?(declare\s+)?(namespace|module)\s+\w+", Namespace),
        ])
        .collect();

    vec![
        (
            Language::Rust,
            rules(
                &[
                    (
                        r"^(pub(\([^)]*\))?\s+)?(const\s+|async\s+|unsafe\s+|extern\s+\S+\s+)*fn\s+\w+",
                        Function,
                    ),
                    (r"^(pub(\([^)]*\))?\s+)?(struct|enum|union|trait)\s+\w+", Class),
                    (r"^(unsafe\s+)?impl\b", Class),
                    (r"^(pub(\([^)]*\))?\s+)?mod\s+\w+\s*\{", Namespace),
                    (r"^macro_rules!", Template),
                ],
                &[r"^\s*#\[", r"^\s*///", r"^\s*/\*\*", r"^\s*\*"],
            ),
        ),
        (
            Language::Python,
            rules(
                &[
                    (r"^(async\s+)?def\s+\w+", Function),
                    (r"^class\s+\w+", Class),
                ],
                &[r"^@", r"^#"],
            ),
        ),
        (
            Language::JavaScript,
            rules(js_signatures, C_STYLE_PREFIXES),
        ),
        (
            Language::TypeScript,
            rules(&ts_signatures, C_STYLE_PREFIXES),
        ),
        (
            Language::Go,
            rules(
                &[(r"^func\b", Function), (r"^type\s+\w+", Class)],
                &[r"^//"],
            ),
        ),
        (
            Language::Java,
            rules(
                &[(
                    r"^(public\s+|private\s+|protected\s+)?(abstract\s+|final\s+|static\s+|sealed\s+)*(class|interface|enum|record|@interface)\s+\w+",
                    Class,
                )],
                C_STYLE_PREFIXES,
            ),
        ),
        (
            Language::CSharp,
            rules(
                &[
                    (r"^namespace\s+[\w.]+", Namespace),
                    (
                        r"^(public\s+|internal\s+)?(static\s+|sealed\s+|abstract\s+|partial\s+)*(class|interface|struct|enum|record)\s+\w+",
                        Class,
                    ),
                ],
                &[r"^\s*//", r"^\s*\["],
            ),
        ),
        (
            Language::Kotlin,
            rules(
                &[
                    (r"^(private\s+|internal\s+|public\s+)?(suspend\s+|inline\s+)*fun\s+", Function),
                    (
                        r"^(data\s+|sealed\s+|abstract\s+|open\s+|enum\s+)*(class|interface|object)\s+\w+",
                        Class,
                    ),
                ],
                C_STYLE_PREFIXES,
            ),
        ),
        (
            Language::Swift,
            rules(
                &[
                    (r"^(public\s+|private\s+|internal\s+)?func\s+\w+", Function),
                    (
                        r"^(public\s+|final\s+|open\s+)*(class|struct|enum|protocol|extension)\s+\w+",
                        Class,
                    ),
                ],
                C_STYLE_PREFIXES,
            ),
        ),
        (
            Language::Scala,
            rules(
                &[
                    (r"^def\s+\w+", Function),
                    (r"^(case\s+|sealed\s+|abstract\s+)*(class|object|trait)\s+\w+", Class),
                ],
                C_STYLE_PREFIXES,
            ),
        ),
        (
            Language::C,
            rules(
                &[
                    (r"^(typedef\s+)?(struct|union|enum)\s+\w*\s*\{?\s*$", Class),
                    (r"^[A-Za-z_][\w\s\*]*\s\**[A-Za-z_]\w*\s*\([^;]*$", Function),
                ],
                &[r"^\s*//", r"^\s*/\*", r"^\s*\*"],
            ),
        ),
        (
            Language::Cpp,
            rules(
                &[
                    (r"^template\s*<", Template),
                    (r"^namespace\s+\w+", Namespace),
                    (r"^(typedef\s+)?(struct|union|enum|class)\s+\w+", Class),
                    (r"^[A-Za-z_][\w\s\*&:<>,]*\s[\*&]*[A-Za-z_~][\w:~]*\s*\([^;]*$", Function),
                ],
                &[r"^\s*//", r"^\s*/\*", r"^\s*\*"],
            ),
        ),
        (
            Language::Ruby,
            rules(
                &[
                    (r"^def\s+", Function),
                    (r"^class\s+\w+", Class),
                    (r"^module\s+\w+", Namespace),
                ],
                &[r"^#"],
            ),
        ),
        (
            Language::Php,
            rules(
                &[
                    (r"^(abstract\s+|final\s+)?(class|interface|trait|enum)\s+\w+", Class),
                    (r"^function\s+\w+", Function),
                    (r"^namespace\s+", Namespace),
                ],
                &[r"^\s*//", r"^\s*/\*\*", r"^\s*\*", r"^#\["],
            ),
        ),
        (
            Language::Lua,
            rules(&[(r"^(local\s+)?function\b", Function)], &[r"^--"]),
        ),
        (
            Language::Shell,
            rules(
                &[
                    (r"^function\s+[\w-]+", Function),
                    (r"^[\w-]+\s*\(\)\s*\{?", Function),
                ],
                &[r"^#[^!]"],
            ),
        ),
        (
            Language::Markdown,
            rules(&[(r"^#{1,6}\s+\S", Block)], &[]),
        ),
    ]
});

fn rules_for(language: Language) -> Option<&'static SyntaxRules> {
    RULES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, rules)| rules)
}

/// Languages this strategy has signatures for
pub fn has_signatures(language: Language) -> bool {
    matches!(
        language,
        Language::Rust
            | Language::Python
            | Language::JavaScript
            | Language::TypeScript
            | Language::Go
            | Language::Java
            | Language::C
            | Language::Cpp
            | Language::CSharp
            | Language::Ruby
            | Language::Swift
            | Language::Kotlin
            | Language::Php
            | Language::Scala
            | Language::Lua
            | Language::Shell
            | Language::Markdown
    )
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    chunk_type: ChunkType,
}

/// Cut a file into signature-delimited segments
pub fn split(
    content: &str,
    language: Language,
    options: &ChunkingOptions,
    checkpoint: &Checkpoint<'_>,
) -> Result<Vec<Chunk>> {
    let rules = rules_for(language)
        .ok_or_else(|| ChunkerError::unsupported_language(language.as_str()))?;
    let lines: Vec<&str> = content.lines().collect();

    let mut segments: Vec<Segment> = Vec::new();
    let mut current = Segment {
        start: 0,
        end: 0,
        chunk_type: ChunkType::Block,
    };
    let mut matched = false;

    for (idx, line) in lines.iter().enumerate() {
        checkpoint.tick()?;
        let Some(chunk_type) = rules
            .signatures
            .iter()
            .find(|(re, _)| re.is_match(line))
            .map(|(_, t)| *t)
        else {
            continue;
        };
        matched = true;

        // Pull attached prefix lines (decorators, doc comments) into the new segment
        let mut start = idx;
        while start > current.start
            && rules.prefixes.iter().any(|re| re.is_match(lines[start - 1]))
        {
            start -= 1;
        }

        if start > current.start {
            current.end = start;
            segments.push(current);
        }
        current = Segment {
            start,
            end: 0,
            chunk_type,
        };
    }

    if !matched {
        return Err(ChunkerError::empty(format!(
            "no {language} declaration signatures found"
        )));
    }
    current.end = lines.len();
    segments.push(current);

    let segments = merge_small_segments(&segments, &lines, options);

    let mut chunks = Vec::new();
    for segment in segments {
        checkpoint.tick()?;
        let body = &lines[segment.start..segment.end];
        let text = body.join("\n");
        if text.trim().is_empty() {
            continue;
        }
        let chars = text.chars().count();
        if chars > options.max_chunk_size || body.len() > options.max_lines {
            chunks.extend(window_lines(
                body,
                segment.start + 1,
                ChunkType::Block,
                language,
                options,
                checkpoint,
            )?);
            continue;
        }
        let complexity = text_complexity(&text, language);
        chunks.push(
            Chunk::new(
                text,
                segment.chunk_type,
                segment.start + 1,
                segment.end,
                language,
            )
            .complexity(complexity),
        );
    }

    if chunks.is_empty() {
        return Err(ChunkerError::empty("signature segments were blank"));
    }
    Ok(chunks)
}

fn segment_chars(segment: &Segment, lines: &[&str]) -> usize {
    let body = &lines[segment.start..segment.end];
    body.iter().map(|l| l.chars().count()).sum::<usize>() + body.len().saturating_sub(1)
}

/// Segments below `min_chunk_size` merge into the following one (the last one merges back)
fn merge_small_segments(
    segments: &[Segment],
    lines: &[&str],
    options: &ChunkingOptions,
) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut pending: Option<Segment> = None;

    for segment in segments {
        let segment = match pending.take() {
            Some(small) => Segment {
                start: small.start,
                end: segment.end,
                chunk_type: if small.chunk_type == ChunkType::Block {
                    segment.chunk_type
                } else {
                    small.chunk_type
                },
            },
            None => *segment,
        };
        if segment_chars(&segment, lines) < options.min_chunk_size {
            pending = Some(segment);
        } else {
            merged.push(segment);
        }
    }

    if let Some(small) = pending {
        match merged.last_mut() {
            Some(last) => last.end = small.end,
            None => merged.push(small),
        }
    }
    merged
}
