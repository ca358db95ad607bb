use crate::error::ChunkerError;
use crate::language::Language;
use crate::registry::StrategyKind;
use serde::{Deserialize, Serialize};

/// Why a cascade step was left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The parser gave up or the tree was mostly errors
    Parse,
    /// Candidates fell outside the size or complexity bounds
    SizeViolation,
    /// Nothing was produced
    Empty,
    /// Produced chunks failed the result invariants
    Invalid,
    /// The step overran its deadline
    Timeout,
    /// Memory reached the emergency level mid-step
    MemoryPressure,
    /// The step panicked
    Panic,
    /// The step cannot handle the language
    Unsupported,
    /// Bypassed: the circuit breaker is open
    CircuitOpen,
    /// Bypassed: memory is at the critical level
    MemoryCritical,
    /// Any other strategy error
    Other,
}

impl FailureKind {
    pub fn from_error(error: &ChunkerError) -> Self {
        match error {
            ChunkerError::ParseError(_) => Self::Parse,
            ChunkerError::SizeViolation(_) => Self::SizeViolation,
            ChunkerError::EmptyResult(_) => Self::Empty,
            ChunkerError::Timeout { .. } => Self::Timeout,
            ChunkerError::MemoryPressure { .. } => Self::MemoryPressure,
            ChunkerError::UnsupportedLanguage(_) => Self::Unsupported,
            ChunkerError::InvalidConfig(_)
            | ChunkerError::StrategyExhausted(_)
            | ChunkerError::IoError(_) => Self::Other,
        }
    }

    /// A step skipped without being run
    pub const fn is_bypass(self) -> bool {
        matches!(self, Self::CircuitOpen | Self::MemoryCritical)
    }

    /// Counts against the circuit breaker when the AST step ends this way
    pub const fn counts_as_failure(self) -> bool {
        !self.is_bypass() && !matches!(self, Self::MemoryPressure)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse error",
            Self::SizeViolation => "size violation",
            Self::Empty => "empty result",
            Self::Invalid => "invalid chunks",
            Self::Timeout => "timeout",
            Self::MemoryPressure => "memory pressure",
            Self::Panic => "panic",
            Self::Unsupported => "unsupported language",
            Self::CircuitOpen => "circuit open",
            Self::MemoryCritical => "memory critical",
            Self::Other => "error",
        }
    }
}

/// Pick the next cascade step after `failed`; always strictly later unless `failed` is terminal
pub fn advise(
    failed: StrategyKind,
    kind: FailureKind,
    language: Language,
    file_size: usize,
    large_file_threshold: usize,
) -> StrategyKind {
    if failed.is_terminal() {
        return StrategyKind::FullContent;
    }
    if file_size > large_file_threshold && !kind.is_bypass() {
        return StrategyKind::FullContent;
    }
    match kind {
        FailureKind::MemoryPressure => StrategyKind::FullContent,
        FailureKind::Timeout if failed < StrategyKind::LineBased => StrategyKind::LineBased,
        FailureKind::Timeout => StrategyKind::FullContent,
        _ => failed.next_for(language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: usize = 1024;

    #[test]
    fn ordinary_failures_move_to_next_supported_step() {
        let next = advise(
            StrategyKind::TreesitterAst,
            FailureKind::Parse,
            Language::Go,
            100,
            THRESHOLD,
        );
        assert_eq!(next, StrategyKind::SyntaxAware);

        let next = advise(
            StrategyKind::SyntaxAware,
            FailureKind::Empty,
            Language::Markdown,
            100,
            THRESHOLD,
        );
        assert_eq!(next, StrategyKind::LineBased);
    }

    #[test]
    fn large_files_jump_to_full_content() {
        let next = advise(
            StrategyKind::TreesitterAst,
            FailureKind::SizeViolation,
            Language::Go,
            THRESHOLD + 1,
            THRESHOLD,
        );
        assert_eq!(next, StrategyKind::FullContent);
    }

    #[test]
    fn memory_pressure_jumps_to_full_content() {
        let next = advise(
            StrategyKind::TreesitterAst,
            FailureKind::MemoryPressure,
            Language::Rust,
            10,
            THRESHOLD,
        );
        assert_eq!(next, StrategyKind::FullContent);
    }

    #[test]
    fn timeouts_go_lightweight() {
        let from_ast = advise(
            StrategyKind::TreesitterAst,
            FailureKind::Timeout,
            Language::Rust,
            10,
            THRESHOLD,
        );
        assert_eq!(from_ast, StrategyKind::LineBased);

        let from_line = advise(
            StrategyKind::LineBased,
            FailureKind::Timeout,
            Language::Rust,
            10,
            THRESHOLD,
        );
        assert_eq!(from_line, StrategyKind::FullContent);
    }

    #[test]
    fn always_strictly_later() {
        let kinds = [
            FailureKind::Parse,
            FailureKind::SizeViolation,
            FailureKind::Empty,
            FailureKind::Invalid,
            FailureKind::Timeout,
            FailureKind::MemoryPressure,
            FailureKind::Panic,
            FailureKind::CircuitOpen,
        ];
        for failed in &StrategyKind::CASCADE[..4] {
            for kind in kinds {
                for language in [Language::Go, Language::Text, Language::Unknown] {
                    let next = advise(*failed, kind, language, 10, THRESHOLD);
                    assert!(next > *failed, "{failed} --{kind:?}--> {next}");
                }
            }
        }
    }

    #[test]
    fn maps_errors() {
        assert_eq!(
            FailureKind::from_error(&ChunkerError::Timeout { elapsed_ms: 3 }),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::from_error(&ChunkerError::parse("x")),
            FailureKind::Parse
        );
        assert!(!FailureKind::CircuitOpen.counts_as_failure());
        assert!(FailureKind::Panic.counts_as_failure());
    }
}
