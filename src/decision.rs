//! The migrate ("jump") rule.

/// An agent jumps only when both desires are strictly positive.
pub fn should_jump(cooperation_desire: f64, will_to_live_desire: f64) -> bool {
    cooperation_desire > 0.0 && will_to_live_desire > 0.0
}
