use crate::config::ChunkingOptions;
use crate::types::{Chunk, ChunkType, MAX_COMPLEXITY_SCORE};

/// Why a chunk failed the result invariants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    EmptyContent,
    InvertedSpan,
    TooSmall { chars: usize, min: usize },
    TooLarge { chars: usize, max: usize },
    ComplexityOutOfRange(u32),
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => f.write_str("empty chunk"),
            Self::InvertedSpan => f.write_str("invalid line span"),
            Self::TooSmall { chars, min } => write!(f, "chunk of {chars} chars below minimum {min}"),
            Self::TooLarge { chars, max } => write!(f, "chunk of {chars} chars above maximum {max}"),
            Self::ComplexityOutOfRange(score) => write!(f, "complexity {score} out of range"),
        }
    }
}

/// Check one chunk against the per-call bounds
pub fn check_chunk(chunk: &Chunk, options: &ChunkingOptions) -> Option<Violation> {
    if chunk.start_line == 0 || chunk.start_line > chunk.end_line {
        return Some(Violation::InvertedSpan);
    }
    if chunk.complexity_score > MAX_COMPLEXITY_SCORE {
        return Some(Violation::ComplexityOutOfRange(chunk.complexity_score));
    }
    if chunk.chunk_type == ChunkType::FullContent {
        return None;
    }
    if chunk.content.trim().is_empty() {
        return Some(Violation::EmptyContent);
    }
    let chars = chunk.char_len();
    if chars < options.min_chunk_size {
        return Some(Violation::TooSmall {
            chars,
            min: options.min_chunk_size,
        });
    }
    if chars > options.max_chunk_size {
        return Some(Violation::TooLarge {
            chars,
            max: options.max_chunk_size,
        });
    }
    None
}

/// Chunks that passed validation plus the number dropped
#[derive(Debug, Default)]
pub struct Filtered {
    pub chunks: Vec<Chunk>,
    pub dropped: usize,
    pub first_violation: Option<Violation>,
}

impl Filtered {
    /// Share of the input that was dropped
    pub fn dropped_fraction(&self) -> f64 {
        let total = self.chunks.len() + self.dropped;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.dropped as f64 / total as f64;
        fraction
    }
}

/// Drop invalid chunks, re-pointing `parent_index` at the nearest surviving ancestor
pub fn filter_chunks(chunks: Vec<Chunk>, options: &ChunkingOptions) -> Filtered {
    let verdicts: Vec<Option<Violation>> =
        chunks.iter().map(|c| check_chunk(c, options)).collect();
    let parents: Vec<Option<usize>> = chunks.iter().map(|c| c.parent_index).collect();

    let mut new_index = vec![None; chunks.len()];
    let mut next = 0;
    for (idx, verdict) in verdicts.iter().enumerate() {
        if verdict.is_none() {
            new_index[idx] = Some(next);
            next += 1;
        }
    }

    let survivor_ancestor = |mut parent: Option<usize>| {
        // Bounded walk in case of malformed input cycles
        for _ in 0..parents.len() {
            let p = parent?;
            if let Some(mapped) = new_index.get(p).copied().flatten() {
                return Some(mapped);
            }
            parent = parents.get(p).copied().flatten();
        }
        None
    };

    let mut filtered = Filtered::default();
    for (idx, mut chunk) in chunks.into_iter().enumerate() {
        match verdicts[idx] {
            None => {
                chunk.parent_index = survivor_ancestor(chunk.parent_index)
                    .filter(|&p| p < filtered.chunks.len());
                filtered.chunks.push(chunk);
            }
            Some(violation) => {
                filtered.dropped += 1;
                filtered.first_violation.get_or_insert(violation);
            }
        }
    }
    filtered
}
