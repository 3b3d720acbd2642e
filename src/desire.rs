//! Desire scores: how far a reference value clears a label's threshold.

use crate::fuzzy::FuzzyLabel;
use crate::thresholds::ThresholdTable;

/// `reference - table[label]`, with no rounding.
///
/// Recorded desires are compared against this with exact equality, so the
/// subtraction must stay the single floating-point operation here.
pub fn desire(reference: f64, label: FuzzyLabel, table: &ThresholdTable) -> f64 {
    reference - table[label]
}

/// Cooperation desire against a baseline (shared or the agent's own value).
pub fn cooperation_desire(baseline: f64, cooperation_label: FuzzyLabel, table: &ThresholdTable) -> f64 {
    desire(baseline, cooperation_label, table)
}

/// Will-to-live desire. The table is indexed by the aggression label.
pub fn will_to_live_desire(will_to_live: f64, aggression_label: FuzzyLabel, table: &ThresholdTable) -> f64 {
    desire(will_to_live, aggression_label, table)
}
