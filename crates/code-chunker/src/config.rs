use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::MAX_COMPLEXITY_SCORE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deepest nested extraction the splitter accepts
pub const MAX_NESTING_LEVEL: usize = 16;

/// Resolved chunking options for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    /// Minimum chunk size in characters
    pub min_chunk_size: usize,

    /// Maximum chunk size in characters (hard limit)
    pub max_chunk_size: usize,

    /// Minimum chunk size in lines
    pub min_lines: usize,

    /// Maximum chunk size in lines
    pub max_lines: usize,

    /// Structural candidates scoring below this are rejected
    pub min_complexity: u32,

    /// Structural candidates scoring above this are rejected
    pub max_complexity: u32,

    /// Split oversized or deeply nested nodes into nested chunks
    pub extract_nested: bool,

    /// How deep nested extraction may go
    pub max_nesting_level: usize,

    /// Structural depth a node may hold before it is decomposed
    pub nesting_budget: usize,

    /// Never cut a structural node in the middle
    pub prefer_semantic_boundaries: bool,

    /// Emit grouped import chunks
    pub extract_imports: bool,

    /// Lines per window for line-based chunking
    pub line_window: usize,

    /// Lines repeated at the start of each following window
    pub overlap_lines: usize,

    /// Fraction of rejected chunks above which a strategy result is discarded
    pub fallback_threshold: f64,

    /// Files above this many bytes go straight to the terminal strategy on failure
    pub large_file_threshold: usize,

    /// Memoize AST results
    pub enable_cache: bool,

    /// Time-to-live for memoized results
    pub cache_ttl_ms: u64,

    /// Files processed in parallel by a batch
    pub concurrency_limit: usize,

    /// Wall-clock budget of a single strategy attempt
    pub timeout_ms: u64,

    /// Re-rank strategies per language from their failure history
    pub adaptive_selection: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            min_chunk_size: 20,
            max_chunk_size: 4000,
            min_lines: 1,
            max_lines: 200,
            min_complexity: 1,
            max_complexity: MAX_COMPLEXITY_SCORE,
            extract_nested: false,
            max_nesting_level: 2,
            nesting_budget: 1,
            prefer_semantic_boundaries: true,
            extract_imports: false,
            line_window: 50,
            overlap_lines: 0,
            fallback_threshold: 0.5,
            large_file_threshold: 1024 * 1024,
            enable_cache: true,
            cache_ttl_ms: 300_000,
            concurrency_limit: default_concurrency(),
            timeout_ms: 5_000,
            adaptive_selection: false,
        }
    }
}

impl ChunkingOptions {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(ChunkerError::invalid_config("max_chunk_size must be > 0"));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "min_chunk_size ({}) cannot exceed max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if self.max_lines == 0 {
            return Err(ChunkerError::invalid_config("max_lines must be > 0"));
        }
        if self.min_lines > self.max_lines {
            return Err(ChunkerError::invalid_config(format!(
                "min_lines ({}) cannot exceed max_lines ({})",
                self.min_lines, self.max_lines
            )));
        }
        if self.max_complexity > MAX_COMPLEXITY_SCORE {
            return Err(ChunkerError::invalid_config(format!(
                "max_complexity ({}) cannot exceed {MAX_COMPLEXITY_SCORE}",
                self.max_complexity
            )));
        }
        if self.min_complexity > self.max_complexity {
            return Err(ChunkerError::invalid_config(format!(
                "min_complexity ({}) cannot exceed max_complexity ({})",
                self.min_complexity, self.max_complexity
            )));
        }
        if !(0.0..=1.0).contains(&self.fallback_threshold) {
            return Err(ChunkerError::invalid_config(format!(
                "fallback_threshold ({}) must be within [0, 1]",
                self.fallback_threshold
            )));
        }
        if self.line_window == 0 || self.line_window > self.max_lines {
            return Err(ChunkerError::invalid_config(format!(
                "line_window ({}) must be within [1, max_lines ({})]",
                self.line_window, self.max_lines
            )));
        }
        if self.overlap_lines >= self.line_window {
            return Err(ChunkerError::invalid_config(format!(
                "overlap_lines ({}) must be smaller than line_window ({})",
                self.overlap_lines, self.line_window
            )));
        }
        if self.max_nesting_level > MAX_NESTING_LEVEL {
            return Err(ChunkerError::invalid_config(format!(
                "max_nesting_level ({}) cannot exceed {MAX_NESTING_LEVEL}",
                self.max_nesting_level
            )));
        }
        if self.concurrency_limit == 0 {
            return Err(ChunkerError::invalid_config("concurrency_limit must be >= 1"));
        }
        if self.timeout_ms == 0 {
            return Err(ChunkerError::invalid_config("timeout_ms must be > 0"));
        }
        if self.enable_cache && self.cache_ttl_ms == 0 {
            return Err(ChunkerError::invalid_config(
                "cache_ttl_ms must be > 0 when the cache is enabled",
            ));
        }
        Ok(())
    }

    /// Stable string used to separate cache entries produced under different options
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Apply an override on top of these options
    #[must_use]
    pub fn merged(mut self, over: &OptionsOverride) -> Self {
        over.apply(&mut self);
        self
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 16)
}

/// Partial options; every `Some` field replaces the layer below it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsOverride {
    pub min_chunk_size: Option<usize>,
    pub max_chunk_size: Option<usize>,
    pub min_lines: Option<usize>,
    pub max_lines: Option<usize>,
    pub min_complexity: Option<u32>,
    pub max_complexity: Option<u32>,
    pub extract_nested: Option<bool>,
    pub max_nesting_level: Option<usize>,
    pub nesting_budget: Option<usize>,
    pub prefer_semantic_boundaries: Option<bool>,
    pub extract_imports: Option<bool>,
    pub line_window: Option<usize>,
    pub overlap_lines: Option<usize>,
    pub fallback_threshold: Option<f64>,
    pub large_file_threshold: Option<usize>,
    pub enable_cache: Option<bool>,
    pub cache_ttl_ms: Option<u64>,
    pub concurrency_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub adaptive_selection: Option<bool>,
}

impl OptionsOverride {
    /// Copy every set field into `options`
    pub fn apply(&self, options: &mut ChunkingOptions) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }

        set(&mut options.min_chunk_size, &self.min_chunk_size);
        set(&mut options.max_chunk_size, &self.max_chunk_size);
        set(&mut options.min_lines, &self.min_lines);
        set(&mut options.max_lines, &self.max_lines);
        set(&mut options.min_complexity, &self.min_complexity);
        set(&mut options.max_complexity, &self.max_complexity);
        set(&mut options.extract_nested, &self.extract_nested);
        set(&mut options.max_nesting_level, &self.max_nesting_level);
        set(&mut options.nesting_budget, &self.nesting_budget);
        set(
            &mut options.prefer_semantic_boundaries,
            &self.prefer_semantic_boundaries,
        );
        set(&mut options.extract_imports, &self.extract_imports);
        set(&mut options.line_window, &self.line_window);
        set(&mut options.overlap_lines, &self.overlap_lines);
        set(&mut options.fallback_threshold, &self.fallback_threshold);
        set(&mut options.large_file_threshold, &self.large_file_threshold);
        set(&mut options.enable_cache, &self.enable_cache);
        set(&mut options.cache_ttl_ms, &self.cache_ttl_ms);
        set(&mut options.concurrency_limit, &self.concurrency_limit);
        set(&mut options.timeout_ms, &self.timeout_ms);
        set(&mut options.adaptive_selection, &self.adaptive_selection);
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Named preset applied on top of the built-in defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingMode {
    /// Built-in defaults
    #[default]
    Default,
    /// Cheaper chunking: no nested extraction, shorter timeouts, adaptive ranking
    HighPerformance,
    /// Finer chunks with nested extraction and grouped imports
    HighQuality,
    /// Defaults plus built-in per-language tuning
    LanguageSpecific,
    /// Defaults plus a user-supplied preset
    Custom,
}

impl ChunkingMode {
    /// Preset layer for this mode (the `Custom` layer is supplied by the user)
    pub fn preset(self) -> OptionsOverride {
        match self {
            Self::Default | Self::LanguageSpecific | Self::Custom => OptionsOverride::default(),
            Self::HighPerformance => OptionsOverride {
                max_chunk_size: Some(6000),
                max_lines: Some(300),
                line_window: Some(100),
                extract_nested: Some(false),
                extract_imports: Some(false),
                enable_cache: Some(true),
                timeout_ms: Some(2_000),
                adaptive_selection: Some(true),
                ..Default::default()
            },
            Self::HighQuality => OptionsOverride {
                max_chunk_size: Some(3000),
                max_lines: Some(150),
                line_window: Some(40),
                overlap_lines: Some(3),
                extract_nested: Some(true),
                max_nesting_level: Some(3),
                nesting_budget: Some(0),
                extract_imports: Some(true),
                timeout_ms: Some(10_000),
                ..Default::default()
            },
        }
    }
}

/// Built-in per-language tuning used by [`ChunkingMode::LanguageSpecific`]
pub fn language_preset(language: Language) -> OptionsOverride {
    match language {
        Language::Python | Language::Ruby => OptionsOverride {
            max_lines: Some(150),
            line_window: Some(40),
            ..Default::default()
        },
        Language::JavaScript | Language::TypeScript => OptionsOverride {
            max_lines: Some(150),
            extract_nested: Some(true),
            ..Default::default()
        },
        Language::Go | Language::Rust => OptionsOverride {
            max_chunk_size: Some(5000),
            max_lines: Some(250),
            ..Default::default()
        },
        Language::C | Language::Cpp | Language::Java | Language::CSharp => OptionsOverride {
            max_chunk_size: Some(6000),
            max_lines: Some(300),
            ..Default::default()
        },
        Language::Markdown | Language::Text => OptionsOverride {
            line_window: Some(40),
            overlap_lines: Some(2),
            ..Default::default()
        },
        _ => OptionsOverride::default(),
    }
}

/// Process-level guard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Memory usage percentage reported as `warning`
    pub memory_warning_percent: f64,
    /// Memory usage percentage above which AST parsing is skipped
    pub memory_critical_percent: f64,
    /// Memory usage percentage above which calls are rejected
    pub memory_emergency_percent: f64,
    /// Minimum interval between memory polls
    pub memory_poll_interval_ms: u64,
    /// Consecutive primary failures that trip a breaker
    pub failure_threshold: u32,
    /// Rolling failure rate that trips a breaker
    pub failure_rate_threshold: f64,
    /// Outcomes kept in the rolling window
    pub rate_window: usize,
    /// Outcomes needed before the rate is trusted
    pub min_rate_samples: usize,
    /// Time a tripped breaker stays open
    pub cooldown_ms: u64,
    /// Keep one breaker per language or a single global one
    pub per_language_breakers: bool,
    /// Failure rate that demotes a strategy under adaptive selection
    pub adaptive_failure_rate: f64,
    /// Outcomes needed before adaptive ranking applies
    pub adaptive_min_samples: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            memory_warning_percent: 70.0,
            memory_critical_percent: 85.0,
            memory_emergency_percent: 95.0,
            memory_poll_interval_ms: 1_000,
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            rate_window: 20,
            min_rate_samples: 10,
            cooldown_ms: 30_000,
            per_language_breakers: true,
            adaptive_failure_rate: 0.6,
            adaptive_min_samples: 10,
        }
    }
}

impl GuardConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let ordered = self.memory_warning_percent < self.memory_critical_percent
            && self.memory_critical_percent < self.memory_emergency_percent
            && self.memory_emergency_percent <= 100.0
            && self.memory_warning_percent >= 0.0;
        if !ordered {
            return Err(ChunkerError::invalid_config(format!(
                "memory thresholds must satisfy 0 <= warning ({}) < critical ({}) < emergency ({}) <= 100",
                self.memory_warning_percent,
                self.memory_critical_percent,
                self.memory_emergency_percent
            )));
        }
        if self.failure_threshold == 0 {
            return Err(ChunkerError::invalid_config("failure_threshold must be >= 1"));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ChunkerError::invalid_config(format!(
                "failure_rate_threshold ({}) must be within (0, 1]",
                self.failure_rate_threshold
            )));
        }
        if self.min_rate_samples == 0 || self.rate_window < self.min_rate_samples {
            return Err(ChunkerError::invalid_config(format!(
                "rate_window ({}) must be >= min_rate_samples ({}) >= 1",
                self.rate_window, self.min_rate_samples
            )));
        }
        if self.cooldown_ms == 0 {
            return Err(ChunkerError::invalid_config("cooldown_ms must be > 0"));
        }
        if !(self.adaptive_failure_rate > 0.0 && self.adaptive_failure_rate <= 1.0) {
            return Err(ChunkerError::invalid_config(format!(
                "adaptive_failure_rate ({}) must be within (0, 1]",
                self.adaptive_failure_rate
            )));
        }
        if self.adaptive_min_samples == 0 {
            return Err(ChunkerError::invalid_config("adaptive_min_samples must be >= 1"));
        }
        Ok(())
    }
}

/// TOML shape of a configuration document
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigDocument {
    mode: ChunkingMode,
    custom: Option<OptionsOverride>,
    languages: HashMap<String, OptionsOverride>,
    guard: Option<GuardConfig>,
}

/// Layered configuration: defaults → mode preset → language override → call override
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    mode: ChunkingMode,
    custom: OptionsOverride,
    language_overrides: HashMap<Language, OptionsOverride>,
    guard: GuardConfig,
}

impl ConfigManager {
    /// Create a manager for a built-in mode
    pub fn new(mode: ChunkingMode) -> Result<Self> {
        let manager = Self {
            mode,
            ..Default::default()
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Create a `Custom` mode manager from a user preset
    pub fn custom(preset: OptionsOverride) -> Result<Self> {
        let manager = Self {
            mode: ChunkingMode::Custom,
            custom: preset,
            ..Default::default()
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Parse a TOML configuration document
    ///
    /// ```toml
    /// mode = "high_quality"
    ///
    /// [languages.python]
    /// max_lines = 120
    ///
    /// [guard]
    /// failure_threshold = 3
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let doc: ConfigDocument = toml::from_str(source)
            .map_err(|e| ChunkerError::invalid_config(format!("TOML: {e}")))?;

        let mut language_overrides = HashMap::with_capacity(doc.languages.len());
        for (name, over) in doc.languages {
            let language = Language::from_name(&name).ok_or_else(|| {
                ChunkerError::invalid_config(format!("unknown language override '{name}'"))
            })?;
            language_overrides.insert(language, over);
        }

        let manager = Self {
            mode: doc.mode,
            custom: doc.custom.unwrap_or_default(),
            language_overrides,
            guard: doc.guard.unwrap_or_default(),
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Builder: add a per-language override
    pub fn with_language_override(
        mut self,
        language: Language,
        over: OptionsOverride,
    ) -> Result<Self> {
        self.language_overrides.insert(language, over);
        self.validate()?;
        Ok(self)
    }

    /// Builder: replace guard settings
    pub fn with_guard_config(mut self, guard: GuardConfig) -> Result<Self> {
        self.guard = guard;
        self.validate()?;
        Ok(self)
    }

    /// Active mode
    #[must_use]
    pub const fn mode(&self) -> ChunkingMode {
        self.mode
    }

    /// Guard settings
    #[must_use]
    pub const fn guard(&self) -> &GuardConfig {
        &self.guard
    }

    /// Options shared by every language: defaults plus the mode layer
    pub fn base_options(&self) -> ChunkingOptions {
        let mut options = ChunkingOptions::default();
        self.mode.preset().apply(&mut options);
        if self.mode == ChunkingMode::Custom {
            self.custom.apply(&mut options);
        }
        options
    }

    /// Options for a language before any call override
    pub fn language_options(&self, language: Language) -> ChunkingOptions {
        let mut options = self.base_options();
        if self.mode == ChunkingMode::LanguageSpecific {
            language_preset(language).apply(&mut options);
        }
        if let Some(over) = self.language_overrides.get(&language) {
            over.apply(&mut options);
        }
        options
    }

    /// Fully resolved options for one call
    pub fn resolve(
        &self,
        language: Language,
        call_override: Option<&OptionsOverride>,
    ) -> Result<ChunkingOptions> {
        let mut options = self.language_options(language);
        if let Some(over) = call_override {
            over.apply(&mut options);
        }
        options.validate()?;
        Ok(options)
    }

    /// Validate every layer combination that can be resolved without a call override
    pub fn validate(&self) -> Result<()> {
        self.guard.validate()?;
        self.base_options().validate()?;
        let languages: Vec<Language> = if self.mode == ChunkingMode::LanguageSpecific {
            Language::ALL.to_vec()
        } else {
            self.language_overrides.keys().copied().collect()
        };
        for language in languages {
            self.language_options(language).validate().map_err(|e| {
                ChunkerError::invalid_config(format!("{language}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_valid() {
        assert!(ChunkingOptions::default().validate().is_ok());
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_preset_configs_valid() {
        for mode in [
            ChunkingMode::Default,
            ChunkingMode::HighPerformance,
            ChunkingMode::HighQuality,
            ChunkingMode::LanguageSpecific,
            ChunkingMode::Custom,
        ] {
            assert!(ConfigManager::new(mode).is_ok(), "{mode:?} should be valid");
        }
    }

    #[test]
    fn test_config_validation() {
        let mut options = ChunkingOptions::default();

        // Invalid: min > max
        options.min_chunk_size = 5000;
        assert!(options.validate().is_err());

        // Invalid: fallback threshold out of range
        options.min_chunk_size = 20;
        options.fallback_threshold = 1.5;
        assert!(options.validate().is_err());

        // Invalid: overlap as large as the window
        options.fallback_threshold = 0.5;
        options.overlap_lines = options.line_window;
        assert!(options.validate().is_err());

        // Invalid: max = 0
        options.overlap_lines = 0;
        options.max_chunk_size = 0;
        assert!(options.validate().is_err());

        // Valid configuration
        options.max_chunk_size = 4000;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn layers_apply_in_precedence_order() {
        let manager = ConfigManager::new(ChunkingMode::HighQuality)
            .unwrap()
            .with_language_override(
                Language::Python,
                OptionsOverride {
                    max_lines: Some(120),
                    line_window: Some(30),
                    ..Default::default()
                },
            )
            .unwrap();

        let call = OptionsOverride {
            line_window: Some(20),
            ..Default::default()
        };
        let options = manager.resolve(Language::Python, Some(&call)).unwrap();

        // mode preset
        assert_eq!(options.max_chunk_size, 3000);
        assert!(options.extract_nested);
        // language override beats mode
        assert_eq!(options.max_lines, 120);
        // call override beats language override
        assert_eq!(options.line_window, 20);

        let go = manager.resolve(Language::Go, None).unwrap();
        assert_eq!(go.max_lines, 150);
        assert_eq!(go.line_window, 40);
    }

    #[test]
    fn language_specific_mode_uses_builtin_tuning() {
        let manager = ConfigManager::new(ChunkingMode::LanguageSpecific).unwrap();
        assert_eq!(manager.resolve(Language::Python, None).unwrap().max_lines, 150);
        assert_eq!(manager.resolve(Language::Go, None).unwrap().max_chunk_size, 5000);
        assert_eq!(
            manager.resolve(Language::Lua, None).unwrap(),
            manager.base_options()
        );
    }

    #[test]
    fn invalid_language_override_fails_fast() {
        let result = ConfigManager::new(ChunkingMode::Default)
            .unwrap()
            .with_language_override(
                Language::Go,
                OptionsOverride {
                    min_chunk_size: Some(10_000),
                    ..Default::default()
                },
            );
        let err = result.unwrap_err();
        assert!(matches!(err, ChunkerError::InvalidConfig(_)));
        assert!(err.to_string().contains("go"));
    }

    #[test]
    fn invalid_custom_preset_fails_fast() {
        let result = ConfigManager::custom(OptionsOverride {
            fallback_threshold: Some(-0.1),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn invalid_call_override_is_reported() {
        let manager = ConfigManager::default();
        let call = OptionsOverride {
            min_lines: Some(500),
            ..Default::default()
        };
        assert!(manager.resolve(Language::Rust, Some(&call)).is_err());
    }

    #[test]
    fn guard_thresholds_must_be_ordered() {
        let guard = GuardConfig {
            memory_critical_percent: 99.0,
            memory_emergency_percent: 90.0,
            ..Default::default()
        };
        assert!(guard.validate().is_err());
        assert!(ConfigManager::default().with_guard_config(guard).is_err());
    }

    #[test]
    fn parses_toml_document() {
        let manager = ConfigManager::from_toml_str(
            r#"
mode = "custom"

[custom]
max_chunk_size = 2500
extract_imports = true

[languages.golang]
max_lines = 80
line_window = 20

[guard]
failure_threshold = 3
cooldown_ms = 1000
"#,
        )
        .unwrap();

        assert_eq!(manager.mode(), ChunkingMode::Custom);
        assert_eq!(manager.guard().failure_threshold, 3);
        let go = manager.resolve(Language::Go, None).unwrap();
        assert_eq!(go.max_chunk_size, 2500);
        assert!(go.extract_imports);
        assert_eq!(go.max_lines, 80);
    }

    #[test]
    fn rejects_unknown_toml_keys() {
        assert!(ConfigManager::from_toml_str("mode = \"fastest\"").is_err());
        assert!(ConfigManager::from_toml_str("[languages.cobol]\nmax_lines = 1").is_err());
        assert!(ConfigManager::from_toml_str("[custom]\nmax_size = 1").is_err());
    }

    #[test]
    fn fingerprint_tracks_options() {
        let a = ChunkingOptions::default();
        let b = a.clone().merged(&OptionsOverride {
            max_chunk_size: Some(1234),
            ..Default::default()
        });
        assert_eq!(a.fingerprint(), ChunkingOptions::default().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(OptionsOverride::default().is_empty());
    }
}
