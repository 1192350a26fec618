use crate::config::gate::{ESCALATION_FACTOR, PRICE_CHANGE_WEIGHT, VOLUME_CHANGE_WEIGHT};
use crate::types::Report;

/// Outcome of the escalation check for one candidate market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Nothing reported for this market inside the lookback.
    FirstReport,
    /// Clears the prior maximum by the escalation factor.
    Escalated { previous_max: f64, threshold: f64 },
    /// A restatement of an already-reported move.
    Suppressed { previous_max: f64, threshold: f64 },
}

impl GateDecision {
    pub fn should_emit(&self) -> bool {
        !matches!(self, GateDecision::Suppressed { .. })
    }
}

/// Estimated noise score a past report was emitted at.
pub fn report_magnitude(report: &Report) -> f64 {
    report.price_change.abs() * PRICE_CHANGE_WEIGHT + report.volume_change.abs() * VOLUME_CHANGE_WEIGHT
}

/// Decide whether `current_score` is a new development given the market's
/// recent reports.
pub fn evaluate(current_score: f64, recent_reports: &[Report]) -> GateDecision {
    if recent_reports.is_empty() {
        return GateDecision::FirstReport;
    }

    let previous_max = recent_reports
        .iter()
        .map(report_magnitude)
        .fold(f64::NEG_INFINITY, f64::max);
    let threshold = previous_max * ESCALATION_FACTOR;

    if current_score > threshold {
        GateDecision::Escalated { previous_max, threshold }
    } else {
        GateDecision::Suppressed { previous_max, threshold }
    }
}
