use crate::advisor::FailureKind;
use crate::breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::memory::{MemoryLevel, MemoryStatus, MemoryStatusProvider};
use crate::registry::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const GLOBAL_SCOPE: &str = "global";

/// Admission verdict for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardDecision {
    pub memory: MemoryStatus,
    /// Set when the AST step must be bypassed, with the reason
    pub skip_ast: Option<FailureKind>,
    /// This call is the breaker's half-open probe
    pub probe: bool,
}

/// Health view of the guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSnapshot {
    pub memory: Option<MemoryStatus>,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
}

impl GuardSnapshot {
    pub fn open_breakers(&self) -> usize {
        self.breakers
            .values()
            .filter(|b| b.state != CircuitState::Closed)
            .count()
    }
}

#[derive(Debug, Default)]
struct GuardState {
    config: GuardConfig,
    breakers: HashMap<String, CircuitBreaker>,
    last_memory: Option<(u64, MemoryStatus)>,
    /// Rolling outcomes per strategy and language, `true` = success
    history: HashMap<(Language, StrategyKind), VecDeque<bool>>,
}

impl GuardState {
    fn scope(&self, language: Language) -> String {
        if self.config.per_language_breakers {
            language.as_str().to_string()
        } else {
            GLOBAL_SCOPE.to_string()
        }
    }
}

/// Memory admission, circuit breaking and strategy history behind one lock
#[derive(Debug)]
pub struct GuardCoordinator {
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryStatusProvider>,
    state: Mutex<GuardState>,
}

impl GuardCoordinator {
    pub fn new(
        config: GuardConfig,
        clock: Arc<dyn Clock>,
        memory: Arc<dyn MemoryStatusProvider>,
    ) -> Self {
        Self {
            clock,
            memory,
            state: Mutex::new(GuardState {
                config,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Memory reading, refreshed at most once per poll interval
    fn poll_memory(&self, state: &mut GuardState) -> MemoryStatus {
        let now = self.clock.now_ms();
        if let Some((at, status)) = state.last_memory {
            if now.saturating_sub(at) < state.config.memory_poll_interval_ms {
                return status;
            }
        }
        let status = self.memory.status(&state.config);
        if status.level >= MemoryLevel::Warning {
            log::debug!(
                "Memory at {:.1}% ({})",
                status.heap_used_percent,
                status.level.as_str()
            );
        }
        state.last_memory = Some((now, status));
        status
    }

    /// Admit a call for `language` or reject it under memory emergency
    pub fn admit(&self, language: Language) -> Result<GuardDecision> {
        let mut state = self.lock();
        let memory = self.poll_memory(&mut state);

        if memory.level == MemoryLevel::Emergency {
            log::warn!(
                "Rejecting {language} request: memory at {:.1}%",
                memory.heap_used_percent
            );
            return Err(ChunkerError::MemoryPressure {
                used_percent: memory.heap_used_percent,
            });
        }

        let mut decision = GuardDecision {
            memory,
            skip_ast: None,
            probe: false,
        };
        if !language.supports_ast() {
            return Ok(decision);
        }
        if memory.level == MemoryLevel::Critical {
            decision.skip_ast = Some(FailureKind::MemoryCritical);
            return Ok(decision);
        }

        let now = self.clock.now_ms();
        let scope = state.scope(language);
        let state = &mut *state;
        let breaker = state.breakers.entry(scope).or_default();
        let admission = breaker.admit(now, &state.config);
        if !admission.permits() {
            decision.skip_ast = Some(FailureKind::CircuitOpen);
        }
        decision.probe = admission.is_probe();
        Ok(decision)
    }

    /// Feed the breaker with the AST step's verdict
    ///
    /// `probe` is the flag from this call's [`GuardDecision`]. A probe without a
    /// verdict (`None`) releases the trial slot.
    pub fn record_primary(&self, language: Language, verdict: Option<bool>, probe: bool) {
        if verdict.is_none() && !probe {
            return;
        }
        let now = self.clock.now_ms();
        let mut state = self.lock();
        let scope = state.scope(language);
        let state = &mut *state;
        let breaker = state.breakers.entry(scope).or_default();
        match verdict {
            Some(success) => breaker.record(success, probe, now, &state.config),
            None => breaker.abandon_probe(),
        }
    }

    /// Remember how a strategy fared on `language` for adaptive selection
    pub fn record_outcome(&self, language: Language, strategy: StrategyKind, success: bool) {
        let mut state = self.lock();
        let window = state.config.rate_window.max(1);
        let history = state.history.entry((language, strategy)).or_default();
        history.push_back(success);
        while history.len() > window {
            history.pop_front();
        }
    }

    /// Whether `strategy` fails too often on `language` to be tried first
    pub fn is_demoted(&self, language: Language, strategy: StrategyKind) -> bool {
        let state = self.lock();
        let Some(history) = state.history.get(&(language, strategy)) else {
            return false;
        };
        if history.len() < state.config.adaptive_min_samples {
            return false;
        }
        let failures = history.iter().filter(|ok| !**ok).count();
        #[allow(clippy::cast_precision_loss)]
        let rate = failures as f64 / history.len() as f64;
        rate > state.config.adaptive_failure_rate
    }

    /// Used percentage when memory is at the emergency level, for in-flight checkpoints
    pub fn emergency_level(&self) -> Option<f64> {
        let mut state = self.lock();
        let status = self.poll_memory(&mut state);
        (status.level == MemoryLevel::Emergency).then_some(status.heap_used_percent)
    }

    pub fn config(&self) -> GuardConfig {
        self.lock().config.clone()
    }

    /// Forget breakers, history and the last memory reading
    pub fn reset(&self) {
        let mut state = self.lock();
        state.breakers.clear();
        state.history.clear();
        state.last_memory = None;
        log::info!("Guard state reset");
    }

    /// Swap settings and start from a clean state
    pub fn reconfigure(&self, config: GuardConfig) {
        self.lock().config = config;
        self.reset();
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let state = self.lock();
        GuardSnapshot {
            memory: state.last_memory.map(|(_, status)| status),
            breakers: state
                .breakers
                .iter()
                .map(|(scope, breaker)| (scope.clone(), breaker.snapshot()))
                .collect(),
        }
    }

    /// Current memory reading (honours the poll interval)
    pub fn memory_status(&self) -> MemoryStatus {
        let mut state = self.lock();
        self.poll_memory(&mut state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::FixedMemoryProvider;
    use pretty_assertions::assert_eq;

    fn coordinator(
        config: GuardConfig,
    ) -> (GuardCoordinator, Arc<ManualClock>, Arc<FixedMemoryProvider>) {
        let clock = Arc::new(ManualClock::new(0));
        let memory = Arc::new(FixedMemoryProvider::new(10.0));
        let guard = GuardCoordinator::new(config, clock.clone(), memory.clone());
        (guard, clock, memory)
    }

    #[test]
    fn memory_levels_shape_admission() {
        let (guard, clock, memory) = coordinator(GuardConfig::default());
        let decision = guard.admit(Language::Go).unwrap();
        assert_eq!(decision.skip_ast, None);
        assert_eq!(decision.memory.level, MemoryLevel::Normal);

        memory.set(90.0);
        clock.advance(1_000);
        let decision = guard.admit(Language::Go).unwrap();
        assert_eq!(decision.skip_ast, Some(FailureKind::MemoryCritical));

        memory.set(97.0);
        clock.advance(1_000);
        let err = guard.admit(Language::Go).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(guard.emergency_level(), Some(97.0));
    }

    #[test]
    fn memory_is_polled_on_interval() {
        let (guard, clock, memory) = coordinator(GuardConfig::default());
        assert!(guard.admit(Language::Rust).is_ok());

        memory.set(99.0);
        clock.advance(500);
        assert!(guard.admit(Language::Rust).is_ok());

        clock.advance(500);
        assert!(guard.admit(Language::Rust).is_err());
    }

    #[test]
    fn open_breaker_bypasses_ast_until_probe() {
        let config = GuardConfig {
            failure_threshold: 2,
            cooldown_ms: 100,
            ..Default::default()
        };
        let (guard, clock, _) = coordinator(config);

        guard.record_primary(Language::Go, Some(false), false);
        guard.record_primary(Language::Go, Some(false), false);
        let decision = guard.admit(Language::Go).unwrap();
        assert_eq!(decision.skip_ast, Some(FailureKind::CircuitOpen));

        // Breakers are scoped per language
        assert_eq!(guard.admit(Language::Rust).unwrap().skip_ast, None);

        clock.advance(100);
        let probe = guard.admit(Language::Go).unwrap();
        assert!(probe.probe);
        assert_eq!(probe.skip_ast, None);
        let concurrent = guard.admit(Language::Go).unwrap();
        assert_eq!(concurrent.skip_ast, Some(FailureKind::CircuitOpen));

        guard.record_primary(Language::Go, Some(true), probe.probe);
        assert_eq!(guard.admit(Language::Go).unwrap().skip_ast, None);
        assert_eq!(guard.snapshot().open_breakers(), 0);
    }

    #[test]
    fn in_flight_call_cannot_settle_the_trial_call() {
        let config = GuardConfig {
            failure_threshold: 2,
            cooldown_ms: 100,
            ..Default::default()
        };
        let (guard, clock, _) = coordinator(config);

        let early = guard.admit(Language::Go).unwrap();
        assert!(!early.probe);
        guard.record_primary(Language::Go, Some(false), false);
        guard.record_primary(Language::Go, Some(false), false);

        clock.advance(100);
        let probe = guard.admit(Language::Go).unwrap();
        assert!(probe.probe);

        // The call admitted before the trip reports late
        guard.record_primary(Language::Go, Some(true), early.probe);
        guard.record_primary(Language::Go, None, early.probe);
        assert_eq!(
            guard.snapshot().breakers["go"].state,
            CircuitState::HalfOpen
        );
        assert_eq!(
            guard.admit(Language::Go).unwrap().skip_ast,
            Some(FailureKind::CircuitOpen)
        );

        guard.record_primary(Language::Go, Some(true), probe.probe);
        assert_eq!(guard.snapshot().breakers["go"].state, CircuitState::Closed);
    }

    #[test]
    fn global_breaker_when_not_per_language() {
        let config = GuardConfig {
            failure_threshold: 1,
            per_language_breakers: false,
            ..Default::default()
        };
        let (guard, _, _) = coordinator(config);
        guard.record_primary(Language::Go, Some(false), false);
        assert_eq!(
            guard.admit(Language::Rust).unwrap().skip_ast,
            Some(FailureKind::CircuitOpen)
        );
        assert!(guard.snapshot().breakers.contains_key("global"));
    }

    #[test]
    fn languages_without_ast_skip_the_breaker() {
        let config = GuardConfig {
            failure_threshold: 1,
            per_language_breakers: false,
            ..Default::default()
        };
        let (guard, _, _) = coordinator(config);
        guard.record_primary(Language::Go, Some(false), false);
        let decision = guard.admit(Language::Text).unwrap();
        assert_eq!(decision.skip_ast, None);
        assert!(!decision.probe);
    }

    #[test]
    fn adaptive_demotion_needs_samples() {
        let config = GuardConfig {
            adaptive_min_samples: 4,
            adaptive_failure_rate: 0.5,
            ..Default::default()
        };
        let (guard, _, _) = coordinator(config);
        for _ in 0..3 {
            guard.record_outcome(Language::Go, StrategyKind::SyntaxAware, false);
        }
        assert!(!guard.is_demoted(Language::Go, StrategyKind::SyntaxAware));
        guard.record_outcome(Language::Go, StrategyKind::SyntaxAware, false);
        assert!(guard.is_demoted(Language::Go, StrategyKind::SyntaxAware));
        assert!(!guard.is_demoted(Language::Rust, StrategyKind::SyntaxAware));
    }

    #[test]
    fn reset_clears_state() {
        let config = GuardConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let (guard, _, _) = coordinator(config);
        guard.record_primary(Language::Go, Some(false), false);
        assert_eq!(guard.snapshot().open_breakers(), 1);

        guard.reconfigure(GuardConfig::default());
        assert_eq!(guard.snapshot().breakers.len(), 0);
        assert_eq!(guard.config().failure_threshold, 5);
        assert_eq!(guard.admit(Language::Go).unwrap().skip_ast, None);
    }
}
