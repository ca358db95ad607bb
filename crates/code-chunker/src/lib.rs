//! # Unified Code Chunker
//!
//! Guarded, multi-strategy segmentation of source files into bounded chunks for
//! embedding and graph-construction pipelines.
//!
//! ## Philosophy
//!
//! The chunker never gives up on a file:
//! - Structural boundaries first (functions, classes, namespaces)
//! - Every chunk respects the size bounds of its language
//! - A deterministic fallback cascade ends in a whole-file chunk
//! - A guard layer protects the host against memory exhaustion and repeated failures
//!
//! ## Architecture
//!
//! ```text
//! SourceUnit
//!     │
//!     ├──> Detector (extension, shebang, file name, content signatures)
//!     │
//!     ├──> ConfigManager (defaults → mode → language → call override)
//!     │
//!     ├──> GuardCoordinator
//!     │    ├─> Memory admission (critical skips AST, emergency rejects)
//!     │    └─> Circuit breaker per language
//!     │
//!     └──> Cascade
//!          ├─> treesitter_ast     (100)
//!          ├─> syntax_aware       (80)
//!          ├─> line_based         (60)
//!          ├─> bracket_balancing  (40)
//!          └─> full_content       (0, never fails)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use unified_code_chunker::{Chunker, SourceUnit};
//!
//! let chunker = Chunker::default();
//!
//! let code = r#"
//! fn process_data(input: &str) -> String {
//!     let cleaned = input.trim();
//!     cleaned.to_uppercase()
//! }
//! "#;
//!
//! let result = chunker
//!     .process_file(&SourceUnit::new("example.rs", code))
//!     .expect("memory available");
//! for chunk in &result.chunks {
//!     println!(
//!         "{:?} at lines {}-{}: {}",
//!         chunk.chunk_type,
//!         chunk.start_line,
//!         chunk.end_line,
//!         chunk.symbol_name.as_deref().unwrap_or_default()
//!     );
//! }
//! ```

mod advisor;
mod ast_analyzer;
mod breaker;
mod cache;
mod cascade;
mod checkpoint;
mod chunker;
mod clock;
mod complexity;
mod config;
mod detector;
mod error;
mod guard;
mod language;
mod memory;
mod parser;
mod profile;
mod registry;
mod strategy;
mod syntax_aware;
mod types;
mod validate;

pub use advisor::{advise, FailureKind};
pub use ast_analyzer::AstSplitter;
pub use breaker::{Admission, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use cache::{cache_key, ChunkCache, InMemoryChunkCache, DEFAULT_CACHE_CAPACITY};
pub use cascade::{Cascade, Transition};
pub use checkpoint::Checkpoint;
pub use chunker::{
    Chunker, ChunkerBuilder, ChunkingStats, HealthDetails, HealthReport, HealthStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    language_preset, ChunkingMode, ChunkingOptions, ConfigManager, GuardConfig, OptionsOverride,
};
pub use detector::{detect, Detection, DetectionMethod};
pub use error::{ChunkerError, Result};
pub use guard::{GuardCoordinator, GuardDecision, GuardSnapshot};
pub use language::Language;
pub use memory::{
    FixedMemoryProvider, MemoryLevel, MemoryStatus, MemoryStatusProvider, ProcMemoryProvider,
};
pub use parser::{node_location, node_text, ParseOutcome, SyntaxParser, TreeSitterParser};
pub use registry::{list_strategies, select_strategy, StrategyDescriptor, StrategyKind};
pub use types::{Chunk, ChunkType, ProcessingResult, SourceUnit, MAX_COMPLEXITY_SCORE};
