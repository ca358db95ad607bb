use crate::cascade::Transition;
use crate::config::OptionsOverride;
use crate::detector::Detection;
use crate::language::Language;
use crate::registry::StrategyKind;
use serde::{Deserialize, Serialize};

/// Upper bound of [`Chunk::complexity_score`]
pub const MAX_COMPLEXITY_SCORE: u32 = 100;

/// One file processing request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Source file path (used for detection and cache keys)
    pub path: String,

    /// Full file content
    pub content: String,

    /// Language supplied by the caller, bypassing detection
    #[serde(default)]
    pub declared_language: Option<Language>,

    /// Per-call option override (highest precedence)
    #[serde(default)]
    pub options: Option<OptionsOverride>,
}

impl SourceUnit {
    /// Create a request from a path and content
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Builder: declare the language explicitly
    #[must_use]
    pub const fn with_language(mut self, language: Language) -> Self {
        self.declared_language = Some(language);
        self
    }

    /// Builder: attach a per-call option override
    #[must_use]
    pub fn with_options(mut self, options: OptionsOverride) -> Self {
        self.options = Some(options);
        self
    }
}

/// A bounded unit of source text with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The actual content
    pub content: String,

    /// Structural classification
    pub chunk_type: ChunkType,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Language of the file the chunk came from
    pub language: Language,

    /// Complexity score in `0..=MAX_COMPLEXITY_SCORE`
    pub complexity_score: u32,

    /// Structural depth (0 = top level)
    pub nesting_level: usize,

    /// Index of the enclosing chunk in the same result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<usize>,

    /// Declared name of the structural node, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
}

impl Chunk {
    /// Create a top-level chunk without a symbol
    #[must_use]
    pub fn new(
        content: String,
        chunk_type: ChunkType,
        start_line: usize,
        end_line: usize,
        language: Language,
    ) -> Self {
        Self {
            content,
            chunk_type,
            start_line,
            end_line,
            language,
            complexity_score: 0,
            nesting_level: 0,
            parent_index: None,
            symbol_name: None,
        }
    }

    /// Builder: set complexity score (clamped to the maximum)
    #[must_use]
    pub fn complexity(mut self, score: u32) -> Self {
        self.complexity_score = score.min(MAX_COMPLEXITY_SCORE);
        self
    }

    /// Builder: set symbol name
    #[must_use]
    pub fn symbol_name(mut self, name: impl Into<String>) -> Self {
        self.symbol_name = Some(name.into());
        self
    }

    /// Get the number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Length in Unicode scalar values, the unit of the size bounds
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Check if chunk contains a specific line
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Type of chunk based on semantic meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Function, method or constructor
    Function,
    /// Class, struct, enum, trait, interface or impl block
    Class,
    /// Module or namespace
    Namespace,
    /// Group of import statements
    Import,
    /// Template or macro definition
    Template,
    /// Unstructured region produced by a non-AST strategy
    Block,
    /// The whole (trimmed) file
    FullContent,
}

impl ChunkType {
    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Namespace => "namespace",
            Self::Import => "import",
            Self::Template => "template",
            Self::Block => "block",
            Self::FullContent => "full_content",
        }
    }

    /// Types that stand for a declared unit of code
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            Self::Function | Self::Class | Self::Namespace | Self::Template
        )
    }
}

/// Outcome of one `process_file` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Source path of the request
    pub path: String,

    /// Chunks in document order
    pub chunks: Vec<Chunk>,

    /// Language the chunks were produced for
    pub language: Language,

    /// Full detector verdict
    pub detection: Detection,

    /// Strategy that produced `chunks`
    pub strategy_used: StrategyKind,

    /// Rendered cascade log when any fallback happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,

    /// Typed cascade log
    #[serde(default)]
    pub transitions: Vec<Transition>,

    /// Always true for an admitted request
    pub success: bool,

    /// Non-fatal problems met along the way
    #[serde(default)]
    pub errors: Vec<String>,

    /// Wall-clock processing time
    pub elapsed_ms: u64,
}

impl ProcessingResult {
    /// Chunks of a given type
    pub fn chunks_of(&self, chunk_type: ChunkType) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(move |chunk| chunk.chunk_type == chunk_type)
    }

    /// Whether the primary strategy was bypassed or failed
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        !self.transitions.is_empty()
    }
}
