use crate::advisor::{advise, FailureKind};
use crate::ast_analyzer::AstSplitter;
use crate::breaker::BreakerSnapshot;
use crate::cache::{ChunkCache, InMemoryChunkCache};
use crate::cascade::Cascade;
use crate::checkpoint::Checkpoint;
use crate::clock::{Clock, SystemClock};
use crate::config::{ChunkingMode, ChunkingOptions, ConfigManager};
use crate::detector::{detect, Detection};
use crate::error::{ChunkerError, Result};
use crate::guard::{GuardCoordinator, GuardDecision};
use crate::language::Language;
use crate::memory::{MemoryLevel, MemoryStatus, MemoryStatusProvider, ProcMemoryProvider};
use crate::parser::{SyntaxParser, TreeSitterParser};
use crate::registry::{self, select_strategy_with, StrategyDescriptor, StrategyKind};
use crate::strategy::{full_content, StrategyExecutor};
use crate::types::{Chunk, ProcessingResult, SourceUnit};
use crate::validate::filter_chunks;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Semaphore;

/// Main entry point: guarded, cascading chunking of source files
///
/// Cloning is cheap; clones share configuration, guard state and cache.
#[derive(Debug, Clone)]
pub struct Chunker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: RwLock<ConfigManager>,
    guard: GuardCoordinator,
    parser: Arc<dyn SyntaxParser>,
    cache: Arc<dyn ChunkCache>,
    clock: Arc<dyn Clock>,
}

/// Builder for [`Chunker`] with injectable collaborators
#[derive(Debug)]
pub struct ChunkerBuilder {
    config: ConfigManager,
    parser: Arc<dyn SyntaxParser>,
    cache: Option<Arc<dyn ChunkCache>>,
    memory: Arc<dyn MemoryStatusProvider>,
    clock: Arc<dyn Clock>,
}

impl ChunkerBuilder {
    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn SyntaxParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ChunkCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn memory_provider(mut self, memory: Arc<dyn MemoryStatusProvider>) -> Self {
        self.memory = memory;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and assemble the chunker
    pub fn build(self) -> Result<Chunker> {
        self.config.validate()?;
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(InMemoryChunkCache::with_clock(
                crate::cache::DEFAULT_CACHE_CAPACITY,
                self.clock.clone(),
            ))
        });
        let guard = GuardCoordinator::new(
            self.config.guard().clone(),
            self.clock.clone(),
            self.memory,
        );
        Ok(Chunker {
            inner: Arc::new(Inner {
                config: RwLock::new(self.config),
                guard,
                parser: self.parser,
                cache,
                clock: self.clock,
            }),
        })
    }
}

/// Overall health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Details behind a [`HealthStatus`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthDetails {
    pub mode: ChunkingMode,
    pub memory: MemoryStatus,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
    pub open_breakers: usize,
    pub strategies: Vec<String>,
    pub supported_languages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: HealthDetails,
}

/// Outcome of one failed cascade step
struct StepFailure {
    kind: FailureKind,
    reason: String,
}

impl StepFailure {
    fn from_error(error: &ChunkerError) -> Self {
        Self {
            kind: FailureKind::from_error(error),
            reason: error.to_string(),
        }
    }
}

impl Chunker {
    /// Create a chunker with the default collaborators
    pub fn new(config: ConfigManager) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Start a builder with the default collaborators
    pub fn builder(config: ConfigManager) -> ChunkerBuilder {
        ChunkerBuilder {
            config,
            parser: Arc::new(TreeSitterParser),
            cache: None,
            memory: Arc::new(ProcMemoryProvider),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> ConfigManager {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration and reset guard state
    pub fn reconfigure(&self, config: ConfigManager) -> Result<()> {
        config.validate()?;
        let guard_config = config.guard().clone();
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        self.inner.guard.reconfigure(guard_config);
        log::info!("Chunker reconfigured");
        Ok(())
    }

    /// Chunk one source unit
    ///
    /// Fails only when memory is at the emergency level; every admitted request
    /// yields at least one chunk.
    pub fn process_file(&self, unit: &SourceUnit) -> Result<ProcessingResult> {
        let started_ms = self.inner.clock.now_ms();
        let detection = match unit.declared_language {
            Some(language) => Detection::declared(language),
            None => detect(&unit.path, &unit.content),
        };
        let language = detection.language;

        let mut errors = Vec::new();
        let options = self.resolve_options(language, unit, &mut errors);
        let decision = self.inner.guard.admit(language)?;

        let (strategy_used, chunks, cascade) =
            self.run_cascade(unit, language, &options, &decision);

        let elapsed_ms = self.inner.clock.now_ms().saturating_sub(started_ms);
        log::debug!(
            "Processed {} ({language}): {} chunks via {strategy_used} in {elapsed_ms}ms",
            unit.path,
            chunks.len()
        );
        Ok(ProcessingResult {
            path: unit.path.clone(),
            chunks,
            language,
            detection,
            strategy_used,
            fallback_reason: cascade.render(),
            transitions: cascade.into_transitions(),
            success: true,
            errors,
            elapsed_ms,
        })
    }

    fn resolve_options(
        &self,
        language: Language,
        unit: &SourceUnit,
        errors: &mut Vec<String>,
    ) -> ChunkingOptions {
        let config = self
            .inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match config.resolve(language, unit.options.as_ref()) {
            Ok(options) => options,
            Err(e) => {
                log::warn!("Ignoring invalid options override for {}: {e}", unit.path);
                errors.push(format!("options override ignored: {e}"));
                config.language_options(language)
            }
        }
    }

    fn run_cascade(
        &self,
        unit: &SourceUnit,
        language: Language,
        options: &ChunkingOptions,
        decision: &GuardDecision,
    ) -> (StrategyKind, Vec<Chunk>, Cascade) {
        let guard = &self.inner.guard;
        let content = unit.content.as_str();
        let file_size = content.len();

        let start = select_strategy_with(language, |strategy| {
            options.adaptive_selection && guard.is_demoted(language, strategy)
        });
        let mut cascade = Cascade::start(start);
        // Verdict for the breaker, `None` when AST never ran or failed for memory
        let mut primary: Option<bool> = None;

        let emergency = || guard.emergency_level();
        let splitter =
            AstSplitter::new(&*self.inner.parser, options).with_cache(&*self.inner.cache);

        let outcome = loop {
            let step = cascade.current();

            if step.uses_ast() {
                if let Some(kind) = decision.skip_ast {
                    log::debug!("Bypassing {step} for {}: {}", unit.path, kind.as_str());
                    let next = advise(step, kind, language, file_size, options.large_file_threshold);
                    cascade.advance(kind, "", next);
                    continue;
                }
            }

            let checkpoint = Checkpoint::new(&*self.inner.clock, options.timeout_ms)
                .with_emergency_probe(&emergency);
            let executor = StrategyExecutor::new(options, &checkpoint).with_ast(&splitter);
            let attempt = catch_unwind(AssertUnwindSafe(|| {
                executor.execute(step, content, language, &unit.path)
            }));

            let result = match attempt {
                Ok(Ok(chunks)) => accept(chunks, options),
                Ok(Err(e)) => Err(StepFailure::from_error(&e)),
                Err(payload) => Err(StepFailure {
                    kind: FailureKind::Panic,
                    reason: panic_message(payload.as_ref()),
                }),
            };

            if step.uses_ast() {
                primary = match &result {
                    Ok(_) => Some(true),
                    Err(failure) if failure.kind.counts_as_failure() => Some(false),
                    Err(_) => None,
                };
            }
            guard.record_outcome(language, step, result.is_ok());

            match result {
                Ok(chunks) => break (step, chunks),
                Err(failure) if step.is_terminal() => {
                    let error = ChunkerError::StrategyExhausted(format!(
                        "{}: {}",
                        unit.path, failure.reason
                    ));
                    log::error!("{error}");
                    break (step, vec![full_content(content, language)]);
                }
                Err(failure) => {
                    let next = advise(
                        step,
                        failure.kind,
                        language,
                        file_size,
                        options.large_file_threshold,
                    );
                    cascade.advance(failure.kind, failure.reason, next);
                }
            }
        };

        guard.record_primary(language, primary, decision.probe);

        let (strategy_used, chunks) = outcome;
        (strategy_used, chunks, cascade)
    }

    /// Chunk many units on the blocking pool; results keep the input order
    pub async fn process_files(&self, units: Vec<SourceUnit>) -> Vec<Result<ProcessingResult>> {
        let limit = self.config().base_options().concurrency_limit.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        let mut tasks = Vec::with_capacity(units.len());
        for unit in units {
            let unit = Arc::new(unit);
            let permit = semaphore.clone().acquire_owned().await.ok();
            let chunker = self.clone();
            let task_unit = unit.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                chunker.process_file(&task_unit)
            });
            tasks.push((unit, handle));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (unit, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Chunking task for {} failed: {e}", unit.path);
                    Ok(self.fallback_result(&unit, format!("worker failed: {e}")))
                }
            };
            results.push(result);
        }
        results
    }

    /// Read a file from disk and chunk it
    pub async fn process_path(&self, path: impl AsRef<Path>) -> Result<ProcessingResult> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let unit = Arc::new(SourceUnit::new(path.to_string_lossy(), content));

        let chunker = self.clone();
        let task_unit = unit.clone();
        match tokio::task::spawn_blocking(move || chunker.process_file(&task_unit)).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Chunking task for {} failed: {e}", unit.path);
                Ok(self.fallback_result(&unit, format!("worker failed: {e}")))
            }
        }
    }

    /// Whole-file result used when processing itself could not finish
    fn fallback_result(&self, unit: &SourceUnit, reason: String) -> ProcessingResult {
        let detection = match unit.declared_language {
            Some(language) => Detection::declared(language),
            None => detect(&unit.path, &unit.content),
        };
        ProcessingResult {
            path: unit.path.clone(),
            chunks: vec![full_content(&unit.content, detection.language)],
            language: detection.language,
            detection,
            strategy_used: StrategyKind::FullContent,
            fallback_reason: Some(reason.clone()),
            transitions: Vec::new(),
            success: true,
            errors: vec![reason],
            elapsed_ms: 0,
        }
    }

    /// Strategy descriptors in cascade order
    pub fn list_strategies(&self) -> Vec<StrategyDescriptor> {
        registry::list_strategies()
    }

    /// Every language the detector can report
    pub fn list_supported_languages(&self) -> Vec<Language> {
        Language::ALL.to_vec()
    }

    pub fn health_check(&self) -> HealthReport {
        let memory = self.inner.guard.memory_status();
        let snapshot = self.inner.guard.snapshot();
        let open_breakers = snapshot.open_breakers();

        let status = match memory.level {
            MemoryLevel::Emergency => HealthStatus::Unhealthy,
            MemoryLevel::Critical => HealthStatus::Degraded,
            _ if open_breakers > 0 => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };

        HealthReport {
            status,
            details: HealthDetails {
                mode: self.config().mode(),
                memory,
                breakers: snapshot.breakers,
                open_breakers,
                strategies: StrategyKind::CASCADE
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
                supported_languages: Language::ALL.len(),
            },
        }
    }

    /// Get statistics about chunking
    #[must_use]
    pub fn get_stats(chunks: &[Chunk]) -> ChunkingStats {
        let chars = || chunks.iter().map(Chunk::char_len);
        ChunkingStats {
            total_chunks: chunks.len(),
            total_lines: chunks.iter().map(Chunk::line_count).sum(),
            total_chars: chars().sum(),
            avg_chars_per_chunk: if chunks.is_empty() {
                0
            } else {
                chars().sum::<usize>() / chunks.len()
            },
            min_chars: chars().min().unwrap_or(0),
            max_chars: chars().max().unwrap_or(0),
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let config = ConfigManager::default();
        Self {
            inner: Arc::new(Inner {
                guard: GuardCoordinator::new(
                    config.guard().clone(),
                    clock.clone(),
                    Arc::new(ProcMemoryProvider),
                ),
                config: RwLock::new(config),
                parser: Arc::new(TreeSitterParser),
                cache: Arc::new(InMemoryChunkCache::with_clock(
                    crate::cache::DEFAULT_CACHE_CAPACITY,
                    clock.clone(),
                )),
                clock,
            }),
        }
    }
}

/// Filter invalid chunks and decide whether the step's output is usable
fn accept(
    chunks: Vec<Chunk>,
    options: &ChunkingOptions,
) -> std::result::Result<Vec<Chunk>, StepFailure> {
    let filtered = filter_chunks(chunks, options);
    let violation = filtered
        .first_violation
        .map(|v| v.to_string())
        .unwrap_or_default();

    if filtered.chunks.is_empty() {
        let kind = if filtered.dropped > 0 {
            FailureKind::Invalid
        } else {
            FailureKind::Empty
        };
        return Err(StepFailure {
            kind,
            reason: violation,
        });
    }
    if filtered.dropped_fraction() > options.fallback_threshold {
        return Err(StepFailure {
            kind: FailureKind::Invalid,
            reason: format!(
                "{} of {} chunks dropped ({violation})",
                filtered.dropped,
                filtered.dropped + filtered.chunks.len()
            ),
        });
    }
    if filtered.dropped > 0 {
        log::debug!("Dropped {} invalid chunks: {violation}", filtered.dropped);
    }
    Ok(filtered.chunks)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "strategy panicked".to_string()
    }
}

/// Statistics about chunking results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub total_lines: usize,
    pub total_chars: usize,
    pub avg_chars_per_chunk: usize,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl std::fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} | Lines: {} | Chars: {} | Avg: {} | Range: {}-{}",
            self.total_chunks,
            self.total_lines,
            self.total_chars,
            self.avg_chars_per_chunk,
            self.min_chars,
            self.max_chars
        )
    }
}
