//! Run outcomes and the single-integer sentinel contract

use super::errors::ErrorReport;
use std::fmt;

/// Returned for any harness failure.
pub const FAILURE_SENTINEL: i32 = -1;
/// Returned by the interpreted path when the function trapped.
pub const TRAP_SENTINEL: i32 = 0xdeadbeef_u32 as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Value(i32),
    Trapped,
    Failed,
}

impl RunOutcome {
    /// Collapses the outcome to the harness integer. A computed `-1` or
    /// `0xdeadbeef` is indistinguishable from the sentinels here.
    pub fn to_sentinel(self) -> i32 {
        match self {
            RunOutcome::Value(v) => v,
            RunOutcome::Trapped => TRAP_SENTINEL,
            RunOutcome::Failed => FAILURE_SENTINEL,
        }
    }

    pub fn value(self) -> Option<i32> {
        match self {
            RunOutcome::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Value(v) => write!(f, "value {v}"),
            RunOutcome::Trapped => write!(f, "trapped"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub errors: ErrorReport,
}

impl RunReport {
    pub fn to_sentinel(&self) -> i32 {
        self.outcome.to_sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(TRAP_SENTINEL, -559038737);
        assert_eq!(RunOutcome::Value(7).to_sentinel(), 7);
        assert_eq!(RunOutcome::Trapped.to_sentinel(), TRAP_SENTINEL);
        assert_eq!(RunOutcome::Failed.to_sentinel(), -1);
        assert_eq!(RunOutcome::Value(-1).to_sentinel(), RunOutcome::Failed.to_sentinel());
        assert_eq!(RunOutcome::Trapped.value(), None);
    }
}
