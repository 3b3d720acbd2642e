//! Seeded generator of self-consistent traces.
//!
//! Every derived field is computed with the same classifier, tables and jump
//! rule the verifier uses, so a generated trace verifies with zero failures.
//! Traits are drawn on a 0.001 grid, which puts the bucket edges
//! (0.2, 0.4, 0.6, 0.8) in play.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decision::should_jump;
use crate::desire::{cooperation_desire, will_to_live_desire};
use crate::fuzzy::{classify, RangeError};
use crate::thresholds::ThresholdSet;

use super::record::{TraceSchema, TraitRecord};

#[derive(Debug, Clone)]
pub struct SyntheticTraceSpec {
    pub agents: usize,
    pub schema: TraceSchema,
    pub seed: u64,
    /// Shared baseline for 10-field traces; drawn from the RNG when unset.
    pub common_cooperation: Option<f64>,
}

impl Default for SyntheticTraceSpec {
    fn default() -> Self {
        Self {
            agents: 10,
            schema: TraceSchema::SharedBaseline,
            seed: 42,
            common_cooperation: None,
        }
    }
}

pub fn synthesize_trace(
    spec: &SyntheticTraceSpec,
    thresholds: &ThresholdSet,
) -> Result<Vec<TraitRecord>, RangeError> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let common = match spec.schema {
        TraceSchema::SharedBaseline => {
            Some(spec.common_cooperation.unwrap_or_else(|| grid_value(&mut rng)))
        }
        TraceSchema::Individual => None,
    };

    (0..spec.agents)
        .map(|idx| {
            let cooperation = grid_value(&mut rng);
            let aggression = grid_value(&mut rng);
            let will_to_live = grid_value(&mut rng);
            let cooperation_label = classify(cooperation)?;
            let aggression_label = classify(aggression)?;

            let baseline = common.unwrap_or(cooperation);
            let coop_desire = cooperation_desire(baseline, cooperation_label, &thresholds.cooperation);
            let wtl_desire = will_to_live_desire(will_to_live, aggression_label, &thresholds.will_to_live);

            Ok(TraitRecord {
                id: format!("p{idx}"),
                cooperation,
                aggression,
                will_to_live,
                cooperation_label,
                aggression_label,
                cooperation_desire: coop_desire,
                will_to_live_desire: wtl_desire,
                common_cooperation: common,
                jumped: should_jump(coop_desire, wtl_desire),
            })
        })
        .collect()
}

/// Newline-terminated wire form of a whole trace.
pub fn render_trace(records: &[TraitRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_line());
        out.push('\n');
    }
    out
}

fn grid_value(rng: &mut StdRng) -> f64 {
    rng.gen_range(0..1000u32) as f64 / 1000.0
}
