use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur during code chunking
///
/// Only [`ChunkerError::InvalidConfig`] is fatal and only
/// [`ChunkerError::MemoryPressure`] ever reaches a caller of the processing API.
/// Everything else is raised by a strategy and converted into a cascade
/// transition by the coordinator.
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Malformed or unsupported syntax
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Produced chunks fall outside the configured bounds
    #[error("Size violation: {0}")]
    SizeViolation(String),

    /// Invalid merged configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Host memory is above the emergency threshold
    #[error("Memory pressure: {used_percent:.1}% used")]
    MemoryPressure { used_percent: f64 },

    /// Every strategy including the terminal one failed
    #[error("All chunking strategies exhausted: {0}")]
    StrategyExhausted(String),

    /// The strategy overran its wall-clock budget
    #[error("Strategy timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The strategy produced nothing usable
    #[error("Strategy produced no chunks: {0}")]
    EmptyResult(String),

    /// Unsupported language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChunkerError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a size violation error
    pub fn size_violation(msg: impl Into<String>) -> Self {
        Self::SizeViolation(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an empty result error
    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyResult(msg.into())
    }

    /// Create an unsupported language error
    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    /// Whether a caller may retry the same request after backing off
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::MemoryPressure { .. })
    }
}
