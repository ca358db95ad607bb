use crate::advisor::FailureKind;
use crate::registry::StrategyKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the fallback cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: StrategyKind,
    pub kind: FailureKind,
    pub reason: String,
    pub to: StrategyKind,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({}", self.from, self.to, self.kind.as_str())?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        f.write_str(")")
    }
}

/// Fallback state machine: `current` only ever moves forward
#[derive(Debug, Clone)]
pub struct Cascade {
    current: StrategyKind,
    transitions: Vec<Transition>,
}

impl Cascade {
    pub fn start(at: StrategyKind) -> Self {
        Self {
            current: at,
            transitions: Vec::new(),
        }
    }

    pub const fn current(&self) -> StrategyKind {
        self.current
    }

    /// Leave the current step for `to`; a non-forward target is clamped to the terminal step
    pub fn advance(&mut self, kind: FailureKind, reason: impl Into<String>, to: StrategyKind) {
        let to = if to > self.current {
            to
        } else {
            StrategyKind::FullContent
        };
        let transition = Transition {
            from: self.current,
            kind,
            reason: reason.into(),
            to,
        };
        log::debug!("Cascade: {transition}");
        self.transitions.push(transition);
        self.current = to;
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Rendered log, `None` when no fallback happened
    pub fn render(&self) -> Option<String> {
        if self.transitions.is_empty() {
            return None;
        }
        Some(
            self.transitions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn into_transitions(self) -> Vec<Transition> {
        self.transitions
    }
}
