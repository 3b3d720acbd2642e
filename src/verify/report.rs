//! Report generation for verification runs.

use std::collections::BTreeMap;

use serde::Serialize;

use super::engine::{FailureKind, FailurePolicy, RecordFailure, RecordOutcome, VerifyError};
use super::record::TraceSchema;

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// blake3 digest of the trace bytes consumed by the scan.
    pub trace_hash: String,
    pub summary: ReportSummary,
    pub outcomes: Vec<RecordOutcome>,
    pub run_stamp: ReportStamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub records_checked: usize,
    pub records_passed: usize,
    pub records_failed: usize,
    pub parse_errors: usize,
    pub range_errors: usize,
    pub mismatches: usize,
    pub mismatches_by_field: BTreeMap<String, usize>,
    pub individual_records: usize,
    pub shared_baseline_records: usize,
    pub common_cooperation: Option<f64>,
    /// Line the fail-fast policy stopped at.
    pub halted_at: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportStamp {
    pub policy: FailurePolicy,
    pub thresholds: String,
    pub thresholds_description: String,
    pub parallelism: usize,
}

impl VerificationReport {
    pub fn build(
        trace_hash: String,
        outcomes: Vec<RecordOutcome>,
        halted_at: Option<usize>,
        common_cooperation: Option<f64>,
        run_stamp: ReportStamp,
    ) -> Self {
        let summary = ReportSummary::from_outcomes(&outcomes, halted_at, common_cooperation);
        Self {
            trace_hash,
            summary,
            outcomes,
            run_stamp,
        }
    }

    /// True only with zero parse errors, zero range errors and zero mismatches.
    pub fn is_success(&self) -> bool {
        self.summary.records_failed == 0
    }

    pub fn failed_records(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RecordOutcome, &RecordFailure)> {
        self.failed_records()
            .flat_map(|outcome| outcome.failures.iter().map(move |failure| (outcome, failure)))
    }

    /// Turn a failing report into an error for callers that want to raise.
    pub fn into_result(self) -> Result<Self, VerifyError> {
        let first_failure = self.failed_records().next().map(|outcome| outcome.line);
        match first_failure {
            None => Ok(self),
            Some(first_line) => Err(VerifyError::Failed {
                failed: self.summary.records_failed,
                first_line,
                report: Box::new(self),
            }),
        }
    }
}

impl ReportSummary {
    fn from_outcomes(
        outcomes: &[RecordOutcome],
        halted_at: Option<usize>,
        common_cooperation: Option<f64>,
    ) -> Self {
        let mut summary = Self {
            records_checked: outcomes.len(),
            records_passed: 0,
            records_failed: 0,
            parse_errors: 0,
            range_errors: 0,
            mismatches: 0,
            mismatches_by_field: BTreeMap::new(),
            individual_records: 0,
            shared_baseline_records: 0,
            common_cooperation,
            halted_at,
        };

        for outcome in outcomes {
            if outcome.passed {
                summary.records_passed += 1;
            } else {
                summary.records_failed += 1;
            }
            match outcome.schema {
                Some(TraceSchema::Individual) => summary.individual_records += 1,
                Some(TraceSchema::SharedBaseline) => summary.shared_baseline_records += 1,
                None => {}
            }
            for failure in &outcome.failures {
                match failure.kind() {
                    FailureKind::Parse => summary.parse_errors += 1,
                    FailureKind::Range => summary.range_errors += 1,
                    FailureKind::Mismatch => summary.mismatches += 1,
                }
                if let Some(mismatch) = failure.as_mismatch() {
                    *summary
                        .mismatches_by_field
                        .entry(mismatch.field.to_string())
                        .or_insert(0) += 1;
                }
            }
        }
        summary
    }
}

/// One-line summary printed by the CLI.
pub fn render_summary_line(report: &VerificationReport) -> String {
    let s = &report.summary;
    let verdict = if report.is_success() { "PASS" } else { "FAIL" };
    format!(
        "{verdict}: {} records, {} passed, {} failed ({} mismatches, {} parse errors, {} range errors)",
        s.records_checked, s.records_passed, s.records_failed, s.mismatches, s.parse_errors, s.range_errors
    )
}

pub fn render_report_markdown(report: &VerificationReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str("# Trace Verification Report\n\n");
    out.push_str(&format!("- Result: {}\n", render_summary_line(report)));
    out.push_str(&format!("- Trace hash: `{}`\n", report.trace_hash));
    out.push_str(&format!("- Policy: {:?}\n", report.run_stamp.policy));
    out.push_str(&format!(
        "- Thresholds: {}\n",
        report.run_stamp.thresholds_description
    ));
    out.push_str(&format!(
        "- Records (9-field/10-field): {}/{}\n",
        s.individual_records, s.shared_baseline_records
    ));
    if let Some(common) = s.common_cooperation {
        out.push_str(&format!("- Common cooperation: {}\n", common));
    }
    if let Some(line) = s.halted_at {
        out.push_str(&format!("- Halted at line: {}\n", line));
    }
    if report.run_stamp.parallelism > 1 {
        out.push_str(&format!("- Partitions: {}\n", report.run_stamp.parallelism));
    }

    if !s.mismatches_by_field.is_empty() {
        out.push_str("\n## Mismatches by Field\n\n");
        for (field, count) in &s.mismatches_by_field {
            out.push_str(&format!("- `{}`: {}\n", field, count));
        }
    }

    if !report.is_success() {
        out.push_str("\n## Failures\n\n");
        for (outcome, failure) in report.failures() {
            out.push_str(&format!(
                "- line {} (`{}`): {}\n",
                outcome.line,
                outcome.id.as_deref().unwrap_or("-"),
                failure
            ));
        }
    }

    out
}
