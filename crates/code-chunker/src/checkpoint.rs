use crate::clock::Clock;
use crate::error::{ChunkerError, Result};
use std::cell::Cell;

/// Work units between two budget checks
pub const CHECK_INTERVAL: u32 = 256;

/// Cooperative deadline carried by one strategy attempt
///
/// Strategies call [`Checkpoint::tick`] once per unit of work (a line, a node);
/// every [`CHECK_INTERVAL`] ticks the wall clock and the emergency probe are
/// consulted.
pub struct Checkpoint<'a> {
    clock: &'a dyn Clock,
    started_ms: u64,
    deadline_ms: u64,
    emergency: Option<&'a (dyn Fn() -> Option<f64> + Sync)>,
    ticks: Cell<u32>,
}

impl<'a> Checkpoint<'a> {
    /// Deadline `timeout_ms` from now
    pub fn new(clock: &'a dyn Clock, timeout_ms: u64) -> Self {
        let started_ms = clock.now_ms();
        Self {
            clock,
            started_ms,
            deadline_ms: started_ms.saturating_add(timeout_ms),
            emergency: None,
            ticks: Cell::new(0),
        }
    }

    /// Attach a probe returning the used percentage while memory is at the emergency level
    #[must_use]
    pub fn with_emergency_probe(mut self, probe: &'a (dyn Fn() -> Option<f64> + Sync)) -> Self {
        self.emergency = Some(probe);
        self
    }

    /// Count one unit of work
    pub fn tick(&self) -> Result<()> {
        let ticks = self.ticks.get().wrapping_add(1);
        self.ticks.set(ticks);
        if ticks % CHECK_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }

    /// Check the budget now
    pub fn check(&self) -> Result<()> {
        let now = self.clock.now_ms();
        if now >= self.deadline_ms {
            return Err(ChunkerError::Timeout {
                elapsed_ms: now.saturating_sub(self.started_ms),
            });
        }
        if let Some(used_percent) = self.emergency.and_then(|probe| probe()) {
            return Err(ChunkerError::MemoryPressure { used_percent });
        }
        Ok(())
    }

    /// Milliseconds left before the deadline
    pub fn remaining_ms(&self) -> u64 {
        self.deadline_ms.saturating_sub(self.clock.now_ms())
    }
}
