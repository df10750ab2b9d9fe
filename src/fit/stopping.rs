//! Stop and rollback rules for the greedy loop.
//!
//! Rules are checked in a fixed order against the chi-square history before
//! each new slot is added; the first match wins:
//!
//! 1. iteration cap reached → stop
//! 2. last refinement made chi-square worse → roll back, stop
//! 3. chi-square is exactly zero → stop
//! 4. improvement below `min_residuum_improvement` → roll back, stop
//! 5. chi-square below `stop_error` → stop

use crate::domain::StopReason;

/// Thresholds consulted by [`check_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StopRules {
    pub max_iterations: Option<usize>,
    pub min_residuum_improvement: Option<f64>,
    pub stop_error: Option<f64>,
}

/// Outcome of one rule check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    Stop(StopReason),
    /// Remove the latest slot and chi entry, then stop.
    Rollback(StopReason),
}

pub fn check_stop(chis: &[f64], rules: &StopRules) -> StopDecision {
    if let Some(max) = rules.max_iterations {
        if chis.len() >= max {
            return StopDecision::Stop(StopReason::MaxIterations);
        }
    }

    let last = chis.last().copied();
    let previous = chis.len().checked_sub(2).map(|i| chis[i]);

    if let (Some(prev), Some(last)) = (previous, last) {
        if prev < last {
            return StopDecision::Rollback(StopReason::Worsened);
        }
    }

    if last == Some(0.0) {
        return StopDecision::Stop(StopReason::PerfectFit);
    }

    if let (Some(threshold), Some(prev), Some(last)) =
        (rules.min_residuum_improvement, previous, last)
    {
        if prev - last < threshold {
            return StopDecision::Rollback(StopReason::InsufficientImprovement);
        }
    }

    if let (Some(stop_error), Some(last)) = (rules.stop_error, last) {
        if last < stop_error {
            return StopDecision::Stop(StopReason::BelowStopError);
        }
    }

    StopDecision::Continue
}
