use crate::config::GuardConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Coarse memory pressure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl MemoryLevel {
    /// Classify a usage percentage against the guard thresholds
    pub fn classify(used_percent: f64, config: &GuardConfig) -> Self {
        if used_percent >= config.memory_emergency_percent {
            Self::Emergency
        } else if used_percent >= config.memory_critical_percent {
            Self::Critical
        } else if used_percent >= config.memory_warning_percent {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

/// One memory reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub heap_used_percent: f64,
    pub level: MemoryLevel,
}

impl MemoryStatus {
    /// Reading used when the provider has no data
    pub const UNKNOWN: Self = Self {
        heap_used_percent: 0.0,
        level: MemoryLevel::Normal,
    };
}

/// Source of memory usage readings
pub trait MemoryStatusProvider: Send + Sync + Debug {
    /// Used memory as a percentage, `None` when it cannot be determined
    fn used_percent(&self) -> Option<f64>;

    /// Classified reading
    fn status(&self, config: &GuardConfig) -> MemoryStatus {
        match self.used_percent() {
            Some(used) => {
                let used = used.clamp(0.0, 100.0);
                MemoryStatus {
                    heap_used_percent: used,
                    level: MemoryLevel::classify(used, config),
                }
            }
            None => MemoryStatus::UNKNOWN,
        }
    }
}

/// Host memory usage from `/proc/meminfo` (Linux, best effort)
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMemoryProvider;

impl MemoryStatusProvider for ProcMemoryProvider {
    fn used_percent(&self) -> Option<f64> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&contents)
    }
}

fn meminfo_kb(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let line = line.trim_start();
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse::<u64>().ok()
    })
}

fn parse_meminfo(contents: &str) -> Option<f64> {
    let total = meminfo_kb(contents, "MemTotal")?;
    if total == 0 {
        return None;
    }
    let available = meminfo_kb(contents, "MemAvailable")
        .or_else(|| meminfo_kb(contents, "MemFree"))?
        .min(total);
    #[allow(clippy::cast_precision_loss)]
    let used = (total - available) as f64 / total as f64 * 100.0;
    Some(used)
}

/// Provider returning a settable reading
#[derive(Debug)]
pub struct FixedMemoryProvider {
    bits: AtomicU64,
}

impl FixedMemoryProvider {
    pub fn new(used_percent: f64) -> Self {
        Self {
            bits: AtomicU64::new(used_percent.to_bits()),
        }
    }

    pub fn set(&self, used_percent: f64) {
        self.bits.store(used_percent.to_bits(), Ordering::SeqCst);
    }
}

impl Default for FixedMemoryProvider {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl MemoryStatusProvider for FixedMemoryProvider {
    fn used_percent(&self) -> Option<f64> {
        Some(f64::from_bits(self.bits.load(Ordering::SeqCst)))
    }
}
