use crate::cache::{cache_key, ChunkCache};
use crate::checkpoint::Checkpoint;
use crate::clock::SystemClock;
use crate::complexity::{node_complexity, text_complexity};
use crate::config::ChunkingOptions;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::parser::{error_coverage, node_location, node_name, SyntaxParser, MAX_ERROR_COVERAGE};
use crate::profile::{profile_for, LanguageProfile};
use crate::strategy::{full_content, window_lines};
use crate::types::{Chunk, ChunkType};
use tree_sitter::Node;

/// A structural node (or a run of imports) considered for emission
#[derive(Debug, Clone, Copy)]
struct Candidate<'t> {
    chunk_type: ChunkType,
    start_byte: usize,
    end_byte: usize,
    start_line: usize,
    end_line: usize,
    /// Node covering the whole span, `None` for grouped imports
    span: Option<Node<'t>>,
    /// Structural node inside the span (differs from `span` for wrappers)
    node: Option<Node<'t>>,
}

impl<'t> Candidate<'t> {
    fn from_node(chunk_type: ChunkType, span: Node<'t>, node: Node<'t>) -> Self {
        let (start_line, end_line) = node_location(span);
        Self {
            chunk_type,
            start_byte: span.start_byte(),
            end_byte: span.end_byte(),
            start_line,
            end_line,
            span: Some(span),
            node: Some(node),
        }
    }

    fn import(node: Node<'t>) -> Self {
        let mut candidate = Self::from_node(ChunkType::Import, node, node);
        candidate.node = None;
        candidate
    }

    fn extend_import(&mut self, node: Node<'t>) {
        let (_, end_line) = node_location(node);
        self.end_byte = node.end_byte();
        self.end_line = end_line;
        self.span = None;
    }

    fn width(&self) -> usize {
        self.end_byte - self.start_byte
    }
}

/// Tallies of one split
#[derive(Debug, Default)]
struct Emission {
    chunks: Vec<Chunk>,
    considered: usize,
    rejected: usize,
}

/// AST-based splitter producing bounded structural chunks
#[derive(Debug)]
pub struct AstSplitter<'a> {
    parser: &'a dyn SyntaxParser,
    options: &'a ChunkingOptions,
    cache: Option<&'a dyn ChunkCache>,
}

impl<'a> AstSplitter<'a> {
    pub fn new(parser: &'a dyn SyntaxParser, options: &'a ChunkingOptions) -> Self {
        Self {
            parser,
            options,
            cache: None,
        }
    }

    /// Builder: memoize results (honoured only when `enable_cache` is set)
    #[must_use]
    pub fn with_cache(mut self, cache: &'a dyn ChunkCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Split without reporting why nothing came out
    pub fn split(&self, content: &str, language: Language, path: &str) -> Vec<Chunk> {
        let clock = SystemClock::new();
        let checkpoint = Checkpoint::new(&clock, self.options.timeout_ms);
        match self.try_split(content, language, path, &checkpoint) {
            Ok(chunks) => chunks,
            Err(e) => {
                log::debug!("AST split of {path} failed: {e}");
                Vec::new()
            }
        }
    }

    /// Split `content`, reporting the failure reason to the cascade
    pub fn try_split(
        &self,
        content: &str,
        language: Language,
        path: &str,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<Vec<Chunk>> {
        let profile = profile_for(language)
            .ok_or_else(|| ChunkerError::unsupported_language(language.as_str()))?;
        if content.trim().is_empty() {
            return Err(ChunkerError::empty("file has no content"));
        }

        let cache = self.cache.filter(|_| self.options.enable_cache);
        let key = cache.map(|_| cache_key(content, language, path, self.options));
        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(chunks) = cache.get(key) {
                log::debug!("AST cache hit for {path}");
                return Ok(chunks);
            }
        }

        let chunks = self.split_uncached(content, language, profile, checkpoint)?;

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            cache.set(key, chunks.clone(), self.options.cache_ttl_ms);
        }
        Ok(chunks)
    }

    fn split_uncached(
        &self,
        content: &str,
        language: Language,
        profile: &LanguageProfile,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<Vec<Chunk>> {
        let outcome = self
            .parser
            .parse(content, language, checkpoint.remaining_ms().max(1));
        let Some(tree) = outcome.tree else {
            // A parser that ran out of budget reports the deadline, not a syntax problem
            checkpoint.check()?;
            let reason = outcome
                .error
                .unwrap_or_else(|| format!("{language} parser returned no tree"));
            return Err(ChunkerError::parse(reason));
        };

        let coverage = error_coverage(&tree, content.len());
        if coverage > MAX_ERROR_COVERAGE {
            return Err(ChunkerError::parse(format!(
                "error nodes cover {:.0}% of the file",
                coverage * 100.0
            )));
        }

        let mut candidates = Vec::new();
        self.collect(tree.root_node(), profile, &mut candidates, checkpoint)?;
        let candidates = keep_narrowest(candidates);

        if candidates.is_empty() {
            log::debug!("No structural nodes in {language} source, emitting whole file");
            return Ok(vec![full_content(content, language)]);
        }

        let mut emission = Emission::default();
        for candidate in &candidates {
            self.emit(
                candidate,
                0,
                None,
                profile,
                content,
                language,
                &mut emission,
                checkpoint,
            )?;
        }

        if emission.chunks.is_empty() {
            return Err(ChunkerError::size_violation(format!(
                "all {} structural candidates outside bounds",
                emission.considered
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let rejected_fraction = emission.rejected as f64 / emission.considered.max(1) as f64;
        if rejected_fraction > self.options.fallback_threshold {
            return Err(ChunkerError::size_violation(format!(
                "{} of {} structural candidates outside bounds",
                emission.rejected, emission.considered
            )));
        }
        Ok(emission.chunks)
    }

    /// Gather top-level candidates below `parent`
    fn collect<'t>(
        &self,
        parent: Node<'t>,
        profile: &LanguageProfile,
        out: &mut Vec<Candidate<'t>>,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<()> {
        let mut imports: Option<Candidate<'t>> = None;
        let mut cursor = parent.walk();
        for child in parent.named_children(&mut cursor) {
            checkpoint.tick()?;
            let kind = child.kind();

            if profile.is_import(kind) {
                if self.options.extract_imports {
                    match imports.as_mut() {
                        Some(group) => group.extend_import(child),
                        None => imports = Some(Candidate::import(child)),
                    }
                }
                continue;
            }
            // Comments between imports keep the run together
            if is_comment(kind) {
                continue;
            }
            out.extend(imports.take());

            if child.is_error() {
                continue;
            }
            if profile.is_transparent(kind) {
                self.collect(child, profile, out, checkpoint)?;
                continue;
            }
            if let Some(candidate) = structural(child, profile) {
                out.push(candidate);
            }
        }
        out.extend(imports);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        candidate: &Candidate<'_>,
        level: usize,
        parent: Option<usize>,
        profile: &LanguageProfile,
        content: &str,
        language: Language,
        emission: &mut Emission,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<()> {
        checkpoint.tick()?;
        let opts = self.options;
        let text = content
            .get(candidate.start_byte..candidate.end_byte)
            .unwrap_or_default();
        let chars = text.chars().count();
        let lines = candidate.end_line - candidate.start_line + 1;
        let complexity = match candidate.span {
            Some(span) => node_complexity(span, checkpoint)?,
            None => text_complexity(text, language),
        };

        let oversized = chars > opts.max_chunk_size || lines > opts.max_lines;
        let fits_size = !oversized && chars >= opts.min_chunk_size && lines >= opts.min_lines;
        let fits_complexity = (opts.min_complexity..=opts.max_complexity).contains(&complexity);
        let fits = fits_size && fits_complexity;

        // Oversized nodes are re-extracted even when nested extraction is off
        let nested = match candidate.node {
            Some(node)
                if (opts.extract_nested || oversized) && level < opts.max_nesting_level =>
            {
                nested_candidates(node, profile)
            }
            _ => Vec::new(),
        };
        let decompose = !nested.is_empty()
            && (!fits || structural_depth(candidate, profile, checkpoint)? > opts.nesting_budget);

        if decompose {
            let emitted_before = emission.chunks.len();
            let mut enclosing = parent;
            if fits {
                emission.considered += 1;
                emission
                    .chunks
                    .push(chunk(candidate, text, language, complexity, level, parent, content));
                enclosing = Some(emission.chunks.len() - 1);
            }
            for child in &nested {
                self.emit(
                    child,
                    level + 1,
                    enclosing,
                    profile,
                    content,
                    language,
                    emission,
                    checkpoint,
                )?;
            }
            if oversized && emission.chunks.len() == emitted_before {
                return Err(oversized_error(candidate, chars, lines));
            }
            return Ok(());
        }

        emission.considered += 1;
        if fits {
            emission
                .chunks
                .push(chunk(candidate, text, language, complexity, level, parent, content));
        } else if oversized && opts.prefer_semantic_boundaries {
            return Err(oversized_error(candidate, chars, lines));
        } else if oversized {
            let text_lines: Vec<&str> = text.lines().collect();
            let windows = window_lines(
                &text_lines,
                candidate.start_line,
                ChunkType::Block,
                language,
                opts,
                checkpoint,
            )?;
            for mut window in windows {
                window.nesting_level = level;
                window.parent_index = parent;
                emission.chunks.push(window);
            }
        } else {
            log::debug!(
                "Rejected {:?} at lines {}-{} ({chars} chars, {lines} lines, complexity {complexity})",
                candidate.chunk_type,
                candidate.start_line,
                candidate.end_line
            );
            emission.rejected += 1;
        }
        Ok(())
    }
}

/// An oversized node can't be dropped without losing code
fn oversized_error(candidate: &Candidate<'_>, chars: usize, lines: usize) -> ChunkerError {
    ChunkerError::size_violation(format!(
        "{:?} at lines {}-{} exceeds the size bounds ({chars} chars, {lines} lines)",
        candidate.chunk_type, candidate.start_line, candidate.end_line
    ))
}

fn chunk(
    candidate: &Candidate<'_>,
    text: &str,
    language: Language,
    complexity: u32,
    level: usize,
    parent: Option<usize>,
    content: &str,
) -> Chunk {
    let mut chunk = Chunk::new(
        text.to_string(),
        candidate.chunk_type,
        candidate.start_line,
        candidate.end_line,
        language,
    )
    .complexity(complexity);
    chunk.nesting_level = level;
    chunk.parent_index = parent;
    if let Some(name) = candidate.node.and_then(|node| node_name(node, content)) {
        chunk = chunk.symbol_name(name);
    }
    chunk
}

/// Candidate for `node` if it is structural or wraps a structural node
fn structural<'t>(node: Node<'t>, profile: &LanguageProfile) -> Option<Candidate<'t>> {
    if let Some(chunk_type) = profile.chunk_type(node.kind()) {
        return Some(Candidate::from_node(chunk_type, node, node));
    }
    if !profile.is_wrapper(node.kind()) {
        return None;
    }
    let mut cursor = node.walk();
    let inner = node
        .named_children(&mut cursor)
        .find_map(|child| structural(child, profile))?;
    Some(Candidate::from_node(inner.chunk_type, node, inner.node?))
}

/// Structural nodes directly inside the container children of `node`
fn nested_candidates<'t>(node: Node<'t>, profile: &LanguageProfile) -> Vec<Candidate<'t>> {
    let mut found = Vec::new();
    let mut cursor = node.walk();
    for container in node.named_children(&mut cursor) {
        if !profile.is_container(container.kind()) {
            continue;
        }
        let mut inner = container.walk();
        found.extend(
            container
                .named_children(&mut inner)
                .filter_map(|child| structural(child, profile)),
        );
    }
    found
}

/// Depth of structural nesting below a candidate (0 = no nested structural nodes)
fn structural_depth(
    candidate: &Candidate<'_>,
    profile: &LanguageProfile,
    checkpoint: &Checkpoint<'_>,
) -> Result<usize> {
    let Some(node) = candidate.node else {
        return Ok(0);
    };
    let mut deepest = 0;
    for child in nested_candidates(node, profile) {
        checkpoint.tick()?;
        deepest = deepest.max(1 + structural_depth(&child, profile, checkpoint)?);
    }
    Ok(deepest)
}

/// Drop candidates overlapping a narrower one
fn keep_narrowest(mut candidates: Vec<Candidate<'_>>) -> Vec<Candidate<'_>> {
    candidates.sort_by_key(|c| (c.start_byte, c.end_byte));
    let mut kept: Vec<Candidate<'_>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match kept.last_mut() {
            Some(last) if candidate.start_byte < last.end_byte => {
                if candidate.width() < last.width() {
                    *last = candidate;
                }
            }
            _ => kept.push(candidate),
        }
    }
    kept
}

fn is_comment(kind: &str) -> bool {
    kind.ends_with("comment")
}
