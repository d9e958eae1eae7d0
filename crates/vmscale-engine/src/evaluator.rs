//! Condition evaluation and sustained-breach tracking.

use vmscale_state::{Condition, Operator};

/// Whether `value` satisfies `condition`.
pub fn evaluate(condition: &Condition, value: f64) -> bool {
    compare(condition.operator, value, condition.threshold)
}

pub fn compare(operator: Operator, value: f64, threshold: f64) -> bool {
    match operator {
        Operator::Eq => (value - threshold).abs() <= f64::EPSILON,
        Operator::Gt => value > threshold,
        Operator::Ge => value >= threshold,
        Operator::Lt => value < threshold,
        Operator::Le => value <= threshold,
    }
}

/// Per-policy breach state: `Idle → Breaching → Triggered → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreachState {
    #[default]
    Idle,
    /// All conditions have held on every tick since `since`.
    Breaching { since: u64 },
    /// The policy fired at `at`. A breach seen on the next tick counts from
    /// `at`, so a re-fire needs another full duration.
    Triggered { at: u64 },
}

impl BreachState {
    /// Fold one tick's observation into the state.
    pub fn observe(self, breaching: bool, now: u64) -> BreachState {
        match (self, breaching) {
            (_, false) => BreachState::Idle,
            (BreachState::Idle, true) => BreachState::Breaching { since: now },
            (BreachState::Breaching { since }, true) => BreachState::Breaching { since },
            (BreachState::Triggered { at }, true) => BreachState::Breaching { since: at },
        }
    }

    /// Start of the current continuous breach, if any.
    pub fn since(&self) -> Option<u64> {
        match self {
            BreachState::Breaching { since } => Some(*since),
            _ => None,
        }
    }

    /// Whether the breach has lasted at least `duration_secs` by `now`.
    pub fn sustained(&self, duration_secs: u64, now: u64) -> bool {
        self.since()
            .is_some_and(|since| now.saturating_sub(since) >= duration_secs)
    }
}
