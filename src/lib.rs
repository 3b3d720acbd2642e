#![forbid(unsafe_code)]

//! # jump-harness
//!
//! A correctness oracle for simulator traces of migrating agents.
//!
//! Each trace record carries raw traits (cooperation, aggression, will to
//! live), the simulator's fuzzy labels for two of them, two derived "desire"
//! scores and the recorded decision to jump. The harness recomputes every
//! derived value from the raw inputs and reports exact disagreements:
//!
//! - [`fuzzy::classify`] buckets a trait into a [`FuzzyLabel`]
//! - [`thresholds`] holds the per-label threshold tables
//! - [`desire::desire`] is `reference - threshold`
//! - [`decision::should_jump`] requires both desires to be strictly positive
//! - [`verify`] drives the checks over a whole trace

pub mod decision;
pub mod desire;
pub mod fuzzy;
pub mod thresholds;
pub mod verify;

pub use decision::should_jump;
pub use desire::desire;
pub use fuzzy::{classify, FuzzyLabel, RangeError};
pub use thresholds::{
    load_thresholds_from_path, ThresholdConfigError, ThresholdRegistry, ThresholdSet,
    ThresholdTable,
};
pub use verify::{
    FailurePolicy, JsonlOutcomeSink, OutcomeSink, RecordFailure, RecordOutcome, TraceSchema,
    TraitRecord, VerificationReport, Verifier, VerifyError, VerifyOptions,
};
