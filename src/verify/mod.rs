//! Trace verification API module.
//!
//! Re-derives fuzzy labels, desires and the jump decision for every record
//! of a simulator trace and reports each divergence with:
//! - Record line and identifier
//! - Field, expected value, recorded value and numeric delta
//!
//! Two failure policies:
//! - Fail-fast: stop at the first failing record
//! - Collect-all: check everything, keep every failure

pub mod engine;
pub mod outcome_log;
pub mod record;
pub mod report;
pub mod synth;

// Re-export main entry points
pub use engine::{
    CheckedField, FailureKind, FailurePolicy, FieldValue, Mismatch, RecordFailure, RecordOutcome,
    TraitField, Verifier, VerifyError, VerifyOptions,
};
pub use outcome_log::{
    JsonlOutcomeSink, OutcomeFilter, OutcomeLogError, OutcomeLogStats, OutcomeSink, OutcomeWorker,
};
pub use record::{parse_line, ParseError, TraceSchema, TraitRecord};
pub use report::{
    render_report_markdown, render_summary_line, ReportStamp, ReportSummary, VerificationReport,
};
pub use synth::{render_trace, synthesize_trace, SyntheticTraceSpec};
