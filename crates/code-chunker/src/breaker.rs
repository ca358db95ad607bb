use crate::config::GuardConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Whether a call may run the guarded strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single trial call after the cooldown
    Probe,
    Rejected,
}

impl Admission {
    pub const fn permits(self) -> bool {
        !matches!(self, Self::Rejected)
    }

    pub const fn is_probe(self) -> bool {
        matches!(self, Self::Probe)
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub samples: usize,
    pub failure_rate: f64,
}

/// Consecutive-failure and failure-rate breaker driven by an external clock
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    /// Rolling outcomes, `true` = failure
    window: VecDeque<bool>,
    opened_at_ms: u64,
    probe_in_flight: bool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            opened_at_ms: 0,
            probe_in_flight: false,
        }
    }

    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide whether a call may proceed at `now_ms`
    pub fn admit(&mut self, now_ms: u64, config: &GuardConfig) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if now_ms.saturating_sub(self.opened_at_ms) < config.cooldown_ms {
                    return Admission::Rejected;
                }
                log::info!("Circuit breaker cooldown elapsed, admitting a probe");
                self.state = CircuitState::HalfOpen;
                self.probe_in_flight = true;
                Admission::Probe
            }
            CircuitState::HalfOpen if self.probe_in_flight => Admission::Rejected,
            CircuitState::HalfOpen => {
                self.probe_in_flight = true;
                Admission::Probe
            }
        }
    }

    /// Record the outcome of an admitted call; `probe` marks the half-open trial call
    pub fn record(&mut self, success: bool, probe: bool, now_ms: u64, config: &GuardConfig) {
        match self.state {
            // Only the trial call settles a half-open breaker
            CircuitState::HalfOpen if !probe => {}
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                if success {
                    log::info!("Circuit breaker probe succeeded, closing");
                    self.close();
                } else {
                    log::warn!("Circuit breaker probe failed, reopening");
                    self.open(now_ms);
                }
            }
            // Late result of a call admitted before the trip
            CircuitState::Open => {}
            CircuitState::Closed => {
                self.window.push_back(!success);
                while self.window.len() > config.rate_window.max(1) {
                    self.window.pop_front();
                }
                if success {
                    self.consecutive_failures = 0;
                    return;
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);

                let rate = self.failure_rate();
                if self.consecutive_failures >= config.failure_threshold {
                    log::warn!(
                        "Circuit breaker tripped after {} consecutive failures",
                        self.consecutive_failures
                    );
                    self.open(now_ms);
                } else if self.window.len() >= config.min_rate_samples
                    && rate >= config.failure_rate_threshold
                {
                    log::warn!(
                        "Circuit breaker tripped at failure rate {:.2} over {} calls",
                        rate,
                        self.window.len()
                    );
                    self.open(now_ms);
                }
            }
        }
    }

    /// The probe ended without a verdict; let the next caller probe instead
    pub fn abandon_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
        }
    }

    /// Share of failures in the rolling window
    pub fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        #[allow(clippy::cast_precision_loss)]
        let rate = failures as f64 / self.window.len() as f64;
        rate
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            samples: self.window.len(),
            failure_rate: self.failure_rate(),
        }
    }

    fn open(&mut self, now_ms: u64) {
        self.state = CircuitState::Open;
        self.opened_at_ms = now_ms;
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.window.clear();
        self.probe_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> GuardConfig {
        GuardConfig {
            failure_threshold: 3,
            cooldown_ms: 1_000,
            rate_window: 10,
            min_rate_samples: 6,
            failure_rate_threshold: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn trips_after_consecutive_failures() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        breaker.record(false, false, 0, &cfg);
        breaker.record(false, false, 0, &cfg);
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record(false, false, 10, &cfg);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.admit(500, &cfg), Admission::Rejected);
    }

    #[test]
    fn success_resets_the_streak() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..2 {
            breaker.record(false, false, 0, &cfg);
            breaker.record(false, false, 0, &cfg);
            breaker.record(true, false, 0, &cfg);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_on_failure_rate() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        // Alternating outcomes never build a streak of three
        for i in 0..5 {
            breaker.record(i % 2 == 0, false, 0, &cfg);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record(false, false, 0, &cfg);
        assert_eq!(breaker.snapshot().samples, 6);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn single_probe_after_cooldown() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..3 {
            breaker.record(false, false, 100, &cfg);
        }

        assert_eq!(breaker.admit(1_100, &cfg), Admission::Probe);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.admit(1_100, &cfg), Admission::Rejected);

        breaker.record(true, true, 1_200, &cfg);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.admit(1_200, &cfg), Admission::Allowed);
    }

    #[test]
    fn failed_probe_reopens() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..3 {
            breaker.record(false, false, 0, &cfg);
        }
        assert_eq!(breaker.admit(1_000, &cfg), Admission::Probe);
        breaker.record(false, true, 1_050, &cfg);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.admit(1_500, &cfg), Admission::Rejected);
        assert_eq!(breaker.admit(2_050, &cfg), Admission::Probe);
    }

    #[test]
    fn abandoned_probe_frees_the_slot() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..3 {
            breaker.record(false, false, 0, &cfg);
        }
        assert_eq!(breaker.admit(1_000, &cfg), Admission::Probe);
        breaker.abandon_probe();
        assert_eq!(breaker.admit(1_000, &cfg), Admission::Probe);
    }

    #[test]
    fn late_verdicts_do_not_settle_half_open() {
        let cfg = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..3 {
            breaker.record(false, false, 0, &cfg);
        }
        assert_eq!(breaker.admit(1_000, &cfg), Admission::Probe);

        // A call admitted before the trip finishes while the trial call runs
        breaker.record(true, false, 1_010, &cfg);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record(false, false, 1_020, &cfg);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.admit(1_030, &cfg), Admission::Rejected);

        breaker.record(true, true, 1_040, &cfg);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn admission_flags() {
        assert!(Admission::Allowed.permits());
        assert!(Admission::Probe.permits());
        assert!(!Admission::Rejected.permits());
        assert!(Admission::Probe.is_probe());
        assert!(!Admission::Allowed.is_probe());
    }
}
