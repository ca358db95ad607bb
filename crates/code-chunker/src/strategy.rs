use crate::ast_analyzer::AstSplitter;
use crate::checkpoint::Checkpoint;
use crate::complexity::text_complexity;
use crate::config::ChunkingOptions;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::registry::StrategyKind;
use crate::syntax_aware;
use crate::types::{Chunk, ChunkType};

/// Execute one cascade step on source code
pub struct StrategyExecutor<'a> {
    options: &'a ChunkingOptions,
    checkpoint: &'a Checkpoint<'a>,
    ast: Option<&'a AstSplitter<'a>>,
}

impl<'a> StrategyExecutor<'a> {
    pub fn new(options: &'a ChunkingOptions, checkpoint: &'a Checkpoint<'a>) -> Self {
        Self {
            options,
            checkpoint,
            ast: None,
        }
    }

    /// Builder: enable the AST step
    #[must_use]
    pub fn with_ast(mut self, splitter: &'a AstSplitter<'a>) -> Self {
        self.ast = Some(splitter);
        self
    }

    /// Execute the given strategy
    pub fn execute(
        &self,
        kind: StrategyKind,
        content: &str,
        language: Language,
        path: &str,
    ) -> Result<Vec<Chunk>> {
        match kind {
            StrategyKind::TreesitterAst => match self.ast {
                Some(splitter) => splitter.try_split(content, language, path, self.checkpoint),
                None => Err(ChunkerError::unsupported_language(language.as_str())),
            },
            StrategyKind::SyntaxAware => {
                syntax_aware::split(content, language, self.options, self.checkpoint)
            }
            StrategyKind::LineBased => line_based(content, language, self.options, self.checkpoint),
            StrategyKind::BracketBalancing => {
                bracket_balancing(content, language, self.options, self.checkpoint)
            }
            StrategyKind::FullContent => Ok(vec![full_content(content, language)]),
        }
    }
}

/// Collects line-range chunks over one slice of lines
pub(crate) struct ChunkSink<'l> {
    lines: &'l [&'l str],
    first_line: usize,
    chunk_type: ChunkType,
    language: Language,
    chunks: Vec<Chunk>,
    /// Half-open line range of each chunk; `None` for pieces of an over-long line
    spans: Vec<Option<(usize, usize)>>,
}

impl<'l> ChunkSink<'l> {
    pub(crate) fn new(
        lines: &'l [&'l str],
        first_line: usize,
        chunk_type: ChunkType,
        language: Language,
    ) -> Self {
        Self {
            lines,
            first_line,
            chunk_type,
            language,
            chunks: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Emit lines `start..end` unless they are all blank
    pub(crate) fn push_span(&mut self, start: usize, end: usize) {
        if start >= end || self.lines[start..end].iter().all(|l| l.trim().is_empty()) {
            return;
        }
        let content = self.lines[start..end].join("\n");
        let complexity = text_complexity(&content, self.language);
        self.chunks.push(
            Chunk::new(
                content,
                self.chunk_type,
                self.first_line + start,
                self.first_line + end - 1,
                self.language,
            )
            .complexity(complexity),
        );
        self.spans.push(Some((start, end)));
    }

    /// Split one over-long line on character boundaries
    pub(crate) fn push_pieces(&mut self, idx: usize, max_chars: usize) {
        let line_no = self.first_line + idx;
        let chars: Vec<char> = self.lines[idx].chars().collect();
        for piece in chars.chunks(max_chars.max(1)) {
            let content: String = piece.iter().collect();
            if content.trim().is_empty() {
                continue;
            }
            let complexity = text_complexity(&content, self.language);
            self.chunks.push(
                Chunk::new(content, self.chunk_type, line_no, line_no, self.language)
                    .complexity(complexity),
            );
            self.spans.push(None);
        }
    }

    /// Fold an undersized last window into the one before it when the result fits
    pub(crate) fn merge_small_tail(&mut self, options: &ChunkingOptions) {
        let n = self.chunks.len();
        if n < 2 {
            return;
        }
        let (Some((prev_start, _)), Some((_, last_end))) = (self.spans[n - 2], self.spans[n - 1])
        else {
            return;
        };
        let last = &self.chunks[n - 1];
        if last.char_len() >= options.min_chunk_size && last.line_count() >= options.min_lines {
            return;
        }
        let merged = self.lines[prev_start..last_end].join("\n");
        if merged.chars().count() > options.max_chunk_size {
            return;
        }
        self.chunks.truncate(n - 2);
        self.spans.truncate(n - 2);
        let complexity = text_complexity(&merged, self.language);
        self.chunks.push(
            Chunk::new(
                merged,
                self.chunk_type,
                self.first_line + prev_start,
                self.first_line + last_end - 1,
                self.language,
            )
            .complexity(complexity),
        );
        self.spans.push(Some((prev_start, last_end)));
    }

    pub(crate) fn finish(self) -> Vec<Chunk> {
        self.chunks
    }
}

fn char_len(line: &str) -> usize {
    line.chars().count()
}

/// Window `lines` by `line_window`, bounded by `max_chunk_size`, with leading overlap
pub(crate) fn window_lines(
    lines: &[&str],
    first_line: usize,
    chunk_type: ChunkType,
    language: Language,
    options: &ChunkingOptions,
    checkpoint: &Checkpoint<'_>,
) -> Result<Vec<Chunk>> {
    let max_chars = options.max_chunk_size;
    let window = options.line_window.max(1);
    let mut sink = ChunkSink::new(lines, first_line, chunk_type, language);

    let mut start = 0;
    // Exclusive end of the previous window
    let mut prev_end = 0;
    while start < lines.len() {
        checkpoint.tick()?;

        if char_len(lines[start]) > max_chars {
            sink.push_pieces(start, max_chars);
            start += 1;
            prev_end = start;
            continue;
        }

        let mut end = start;
        let mut chars = 0;
        while end < lines.len() && end - start < window {
            let add = char_len(lines[end]) + usize::from(end > start);
            if chars + add > max_chars {
                break;
            }
            chars += add;
            end += 1;
        }

        // Overlap left no room for new lines
        if end <= prev_end {
            start = prev_end;
            continue;
        }

        sink.push_span(start, end);
        prev_end = end;
        if end >= lines.len() {
            break;
        }
        start = end.saturating_sub(options.overlap_lines).max(start + 1);
    }

    sink.merge_small_tail(options);
    Ok(sink.finish())
}

/// Fixed line windows over the whole file
pub fn line_based(
    content: &str,
    language: Language,
    options: &ChunkingOptions,
    checkpoint: &Checkpoint<'_>,
) -> Result<Vec<Chunk>> {
    if content.trim().is_empty() {
        return Err(ChunkerError::empty("file has no content"));
    }
    let lines: Vec<&str> = content.lines().collect();
    let chunks = window_lines(&lines, 1, ChunkType::Block, language, options, checkpoint)?;
    if chunks.is_empty() {
        return Err(ChunkerError::empty("no non-blank line windows"));
    }
    Ok(chunks)
}

/// Tracks bracket depth across lines, skipping strings and comments
struct BracketScanner {
    depth: usize,
    line_comments: &'static [&'static str],
    block_comments: bool,
    in_block_comment: bool,
    in_template: bool,
}

impl BracketScanner {
    fn new(language: Language) -> Self {
        Self {
            depth: 0,
            line_comments: language.comment_prefixes(),
            block_comments: language.uses_braces(),
            in_block_comment: false,
            in_template: false,
        }
    }

    fn feed(&mut self, line: &str) {
        let mut chars = line.char_indices().peekable();
        let mut quote: Option<char> = None;
        while let Some((idx, c)) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek().is_some_and(|(_, n)| *n == '/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if self.in_template {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    '`' => self.in_template = false,
                    _ => {}
                }
                continue;
            }
            if let Some(q) = quote {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    _ if c == q => quote = None,
                    _ => {}
                }
                continue;
            }
            if self.line_comments.iter().any(|p| line[idx..].starts_with(p)) {
                return;
            }
            match c {
                '/' if self.block_comments && chars.peek().is_some_and(|(_, n)| *n == '*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '"' | '\'' => quote = Some(c),
                '`' => self.in_template = true,
                '{' | '(' | '[' => self.depth += 1,
                '}' | ')' | ']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    const fn depth(&self) -> usize {
        self.depth
    }
}

/// Accumulate lines until brackets balance past half the size budget
pub fn bracket_balancing(
    content: &str,
    language: Language,
    options: &ChunkingOptions,
    checkpoint: &Checkpoint<'_>,
) -> Result<Vec<Chunk>> {
    if content.trim().is_empty() {
        return Err(ChunkerError::empty("file has no content"));
    }
    let lines: Vec<&str> = content.lines().collect();
    let max_chars = options.max_chunk_size;
    let half = max_chars / 2;
    let mut scanner = BracketScanner::new(language);
    let mut sink = ChunkSink::new(&lines, 1, ChunkType::Block, language);

    let mut start = 0;
    let mut chars = 0;
    for (idx, line) in lines.iter().enumerate() {
        checkpoint.tick()?;
        let len = char_len(line);

        if len > max_chars {
            sink.push_span(start, idx);
            sink.push_pieces(idx, max_chars);
            scanner.feed(line);
            start = idx + 1;
            chars = 0;
            continue;
        }

        let add = len + usize::from(idx > start);
        if idx > start && (chars + add > max_chars || idx - start >= options.max_lines) {
            // Budget would overflow: force a cut regardless of depth
            sink.push_span(start, idx);
            start = idx;
            chars = len;
        } else {
            chars += add;
        }

        scanner.feed(line);
        if scanner.depth() == 0 && chars >= half {
            sink.push_span(start, idx + 1);
            start = idx + 1;
            chars = 0;
        }
    }
    sink.push_span(start, lines.len());
    sink.merge_small_tail(options);

    let chunks = sink.finish();
    if chunks.is_empty() {
        return Err(ChunkerError::empty("no bracket groups"));
    }
    Ok(chunks)
}

/// The trimmed file as one chunk with its real line span
pub fn full_content(content: &str, language: Language) -> Chunk {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Chunk::new(String::new(), ChunkType::FullContent, 1, 1, language);
    }
    let leading = content.len() - content.trim_start().len();
    let start_line = 1 + content[..leading].matches('\n').count();
    let end_line = start_line + trimmed.matches('\n').count();
    Chunk::new(
        trimmed.to_string(),
        ChunkType::FullContent,
        start_line,
        end_line,
        language,
    )
    .complexity(text_complexity(trimmed, language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use pretty_assertions::assert_eq;

    fn create_test_content() -> String {
        let mut lines = Vec::new();
        for i in 0..100 {
            lines.push(format!("fn test_function_{i}() {{ }}"));
        }
        lines.join("\n")
    }

    fn options() -> ChunkingOptions {
        ChunkingOptions {
            min_chunk_size: 1,
            line_window: 10,
            ..Default::default()
        }
    }

    fn run<F>(f: F) -> Vec<Chunk>
    where
        F: FnOnce(&Checkpoint<'_>) -> Result<Vec<Chunk>>,
    {
        let clock = SystemClock::new();
        let checkpoint = Checkpoint::new(&clock, 10_000);
        f(&checkpoint).unwrap()
    }

    #[test]
    fn test_chunk_by_lines() {
        let content = create_test_content();
        let opts = options();
        let chunks = run(|cp| line_based(&content, Language::Rust, &opts, cp));

        assert_eq!(chunks.len(), 10);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start_line, i * 10 + 1);
            assert_eq!(chunk.line_count(), 10);
            assert_eq!(chunk.chunk_type, ChunkType::Block);
        }
    }

    #[test]
    fn line_windows_respect_char_budget() {
        let content = create_test_content();
        let opts = ChunkingOptions {
            max_chunk_size: 100,
            ..options()
        };
        let chunks = run(|cp| line_based(&content, Language::Rust, &opts, cp));
        assert!(chunks.len() > 10);
        assert!(chunks.iter().all(|c| c.char_len() <= 100));
    }

    #[test]
    fn overlap_repeats_leading_lines() {
        let content = create_test_content();
        let opts = ChunkingOptions {
            overlap_lines: 2,
            ..options()
        };
        let chunks = run(|cp| line_based(&content, Language::Rust, &opts, cp));
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[1].start_line, 9);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
        assert_eq!(chunks.last().unwrap().end_line, 100);
    }

    #[test]
    fn small_tail_merges_into_previous_window() {
        let content = "alpha beta gamma\n".repeat(11);
        let opts = ChunkingOptions {
            min_chunk_size: 20,
            ..options()
        };
        let chunks = run(|cp| line_based(&content, Language::Text, &opts, cp));
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 11));
    }

    #[test]
    fn long_lines_split_on_char_boundaries() {
        let content = format!("short\n{}\nend", "é".repeat(250));
        let opts = ChunkingOptions {
            max_chunk_size: 100,
            ..options()
        };
        let chunks = run(|cp| line_based(&content, Language::Text, &opts, cp));
        let pieces: Vec<_> = chunks.iter().filter(|c| c.start_line == 2).collect();
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|c| c.char_len() <= 100));
    }

    #[test]
    fn blank_file_is_empty_result() {
        let opts = options();
        let clock = SystemClock::new();
        let checkpoint = Checkpoint::new(&clock, 1_000);
        let err = line_based("  \n\n ", Language::Text, &opts, &checkpoint).unwrap_err();
        assert!(matches!(err, ChunkerError::EmptyResult(_)));
    }

    #[test]
    fn bracket_balancing_cuts_at_depth_zero() {
        let body = "    let value = compute(\"{ not a brace\");\n".repeat(4);
        let func = format!("fn f() {{\n{body}}}\n");
        let content = func.repeat(6);
        let opts = ChunkingOptions {
            max_chunk_size: 400,
            ..options()
        };
        let chunks = run(|cp| bracket_balancing(&content, Language::Rust, &opts, cp));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 400);
            assert!(chunk.content.starts_with("fn f()"), "{}", chunk.content);
            assert!(chunk.content.trim_end().ends_with('}'));
        }
    }

    #[test]
    fn bracket_scanner_ignores_strings_and_comments() {
        let mut scanner = BracketScanner::new(Language::Rust);
        scanner.feed("let s = \"((\"; // {{{");
        assert_eq!(scanner.depth(), 0);
        scanner.feed("/* [[[");
        scanner.feed("]]] */ call(");
        assert_eq!(scanner.depth(), 1);
        scanner.feed(")");
        assert_eq!(scanner.depth(), 0);
    }

    #[test]
    fn full_content_tracks_trimmed_span() {
        let chunk = full_content("\n\n  const a = 1\nconst b = 2\n\n", Language::Go);
        assert_eq!(chunk.content, "const a = 1\nconst b = 2");
        assert_eq!((chunk.start_line, chunk.end_line), (3, 4));
        assert_eq!(chunk.chunk_type, ChunkType::FullContent);

        let empty = full_content("   ", Language::Text);
        assert_eq!(empty.content, "");
        assert_eq!((empty.start_line, empty.end_line), (1, 1));
    }

    #[test]
    fn test_execute_strategies() {
        let content = create_test_content();
        let opts = options();
        let clock = SystemClock::new();
        let checkpoint = Checkpoint::new(&clock, 10_000);
        let executor = StrategyExecutor::new(&opts, &checkpoint);

        for kind in [
            StrategyKind::SyntaxAware,
            StrategyKind::LineBased,
            StrategyKind::BracketBalancing,
            StrategyKind::FullContent,
        ] {
            let chunks = executor.execute(kind, &content, Language::Rust, "test.rs").unwrap();
            assert!(!chunks.is_empty(), "Strategy {kind} produced no chunks");
        }
        assert!(executor
            .execute(StrategyKind::TreesitterAst, &content, Language::Rust, "test.rs")
            .is_err());
    }
}
