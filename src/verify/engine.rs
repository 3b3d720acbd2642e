//! Trace verification: re-derive every value of every record and compare.
//!
//! Checks run on recorded inputs (recorded labels feed the desire checks,
//! recorded desires feed the jump check) so one divergence is reported once
//! instead of cascading through every later check.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decision::should_jump;
use crate::desire::{cooperation_desire, will_to_live_desire};
use crate::fuzzy::{classify, FuzzyLabel};
use crate::thresholds::ThresholdSet;

use super::outcome_log::{OutcomeLogError, OutcomeSink};
use super::record::{parse_line, ParseError, TraceSchema, TraitRecord};
use super::report::{ReportStamp, VerificationReport};

/// What to do once a record fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing record and keep only its first failure.
    FailFast,
    /// Check every record and keep every failure.
    #[default]
    CollectAll,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub policy: FailurePolicy,
    /// Number of partitions checked concurrently. `1` streams the trace.
    pub parallelism: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::CollectAll,
            parallelism: 1,
        }
    }
}

/// Field of a record whose recorded value is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckedField {
    CooperationLabel,
    AggressionLabel,
    CommonCooperation,
    CooperationDesire,
    WillToLiveDesire,
    Jumped,
}

impl CheckedField {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckedField::CooperationLabel => "cooperation_label",
            CheckedField::AggressionLabel => "aggression_label",
            CheckedField::CommonCooperation => "common_cooperation",
            CheckedField::CooperationDesire => "cooperation_desire",
            CheckedField::WillToLiveDesire => "will_to_live_desire",
            CheckedField::Jumped => "jumped",
        }
    }
}

impl fmt::Display for CheckedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw trait handed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitField {
    Cooperation,
    Aggression,
}

impl fmt::Display for TraitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitField::Cooperation => f.write_str("cooperation"),
            TraitField::Aggression => f.write_str("aggression"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Label(FuzzyLabel),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Label(label) => write!(f, "{label}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Flag(flag) => write!(f, "{flag}"),
        }
    }
}

/// A recomputed value that disagrees with the recorded one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub field: CheckedField,
    pub expected: FieldValue,
    pub actual: FieldValue,
    /// `actual - expected` for numeric fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, recorded {}",
            self.field, self.expected, self.actual
        )?;
        if let Some(delta) = self.delta {
            write!(f, " (delta {delta:e})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    Range,
    Mismatch,
}

/// One problem found on one record.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordFailure {
    #[error("parse error: {0}")]
    Parse(ParseError),
    #[error("range error on {field}: value {value} is outside [0.0, 1.0)")]
    Range { field: TraitField, value: f64 },
    #[error("mismatch on {0}")]
    Mismatch(Mismatch),
}

impl RecordFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            RecordFailure::Parse(_) => FailureKind::Parse,
            RecordFailure::Range { .. } => FailureKind::Range,
            RecordFailure::Mismatch(_) => FailureKind::Mismatch,
        }
    }

    pub fn as_mismatch(&self) -> Option<&Mismatch> {
        match self {
            RecordFailure::Mismatch(mismatch) => Some(mismatch),
            _ => None,
        }
    }
}

/// Verification result for one non-blank trace line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    /// 1-based line number in the trace.
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<TraceSchema>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to open trace {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("outcome log error: {0}")]
    OutcomeLog(#[from] OutcomeLogError),
    #[error("verification worker panicked")]
    WorkerPanicked,
    #[error("trace failed verification: {failed} record(s) failed, first at line {first_line}")]
    Failed {
        failed: usize,
        first_line: usize,
        report: Box<VerificationReport>,
    },
}

/// A parsed line ready for checking, with file-order state already resolved.
#[derive(Debug, Clone)]
struct Entry {
    line: usize,
    parsed: Result<Prepared, (Option<String>, ParseError)>,
}

#[derive(Debug, Clone)]
struct Prepared {
    record: TraitRecord,
    /// Common cooperation captured from the first shared-baseline record.
    shared_baseline: Option<f64>,
}

/// File-order state: identifiers seen and the captured baseline.
struct ScanState {
    seen_ids: HashMap<String, usize>,
    common_cooperation: Option<f64>,
}

/// What a scan consumed: the outcomes, where it halted, and the state of the
/// trace up to that point.
struct Scan {
    outcomes: Vec<RecordOutcome>,
    halted_at: Option<usize>,
    trace_hash: String,
    common_cooperation: Option<f64>,
}

/// Where an entry ends in the consumed text, and the baseline known by then.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    line: usize,
    end: usize,
    common_cooperation: Option<f64>,
}

impl ScanState {
    fn new() -> Self {
        Self {
            seen_ids: HashMap::new(),
            common_cooperation: None,
        }
    }

    /// Returns `None` for blank lines.
    fn prepare(&mut self, line: usize, raw: &str) -> Option<Entry> {
        if raw.trim().is_empty() {
            debug!(line, "skipping blank trace line");
            return None;
        }

        let record = match parse_line(raw) {
            Ok(record) => record,
            Err(err) => {
                let id = raw.split_whitespace().next().map(str::to_string);
                return Some(Entry {
                    line,
                    parsed: Err((id, err)),
                });
            }
        };

        if let Some(&first_line) = self.seen_ids.get(&record.id) {
            let err = ParseError::DuplicateId {
                id: record.id.clone(),
                first_line,
            };
            return Some(Entry {
                line,
                parsed: Err((Some(record.id), err)),
            });
        }
        self.seen_ids.insert(record.id.clone(), line);

        let shared_baseline = record.common_cooperation.map(|value| {
            *self.common_cooperation.get_or_insert_with(|| {
                debug!(line, common_cooperation = value, "captured common cooperation baseline");
                value
            })
        });

        Some(Entry {
            line,
            parsed: Ok(Prepared {
                record,
                shared_baseline,
            }),
        })
    }
}

/// Checks traces against one threshold set.
#[derive(Debug, Clone)]
pub struct Verifier {
    thresholds: ThresholdSet,
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(thresholds: ThresholdSet, options: VerifyOptions) -> Self {
        Self {
            thresholds,
            options,
        }
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    pub fn verify_path(
        &self,
        path: impl AsRef<Path>,
        sink: Option<&dyn OutcomeSink>,
    ) -> Result<VerificationReport, VerifyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| VerifyError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.verify_reader(BufReader::new(file), sink)
    }

    pub fn verify_str(&self, trace: &str) -> Result<VerificationReport, VerifyError> {
        self.verify_reader(trace.as_bytes(), None)
    }

    pub fn verify_reader<R: BufRead>(
        &self,
        reader: R,
        sink: Option<&dyn OutcomeSink>,
    ) -> Result<VerificationReport, VerifyError> {
        let scan = if self.options.parallelism > 1 {
            self.scan_partitioned(reader, sink)?
        } else {
            self.scan_sequential(reader, sink)?
        };

        let stamp = ReportStamp {
            policy: self.options.policy,
            thresholds: self.thresholds.name.clone(),
            thresholds_description: self.thresholds.describe(),
            parallelism: self.options.parallelism.max(1),
        };
        let report = VerificationReport::build(
            scan.trace_hash,
            scan.outcomes,
            scan.halted_at,
            scan.common_cooperation,
            stamp,
        );
        info!(
            records = report.summary.records_checked,
            failed = report.summary.records_failed,
            mismatches = report.summary.mismatches,
            parse_errors = report.summary.parse_errors,
            range_errors = report.summary.range_errors,
            "trace verification finished"
        );
        Ok(report)
    }

    fn fail_fast(&self) -> bool {
        self.options.policy == FailurePolicy::FailFast
    }

    fn scan_sequential<R: BufRead>(
        &self,
        mut reader: R,
        sink: Option<&dyn OutcomeSink>,
    ) -> Result<Scan, VerifyError> {
        let mut state = ScanState::new();
        let mut hasher = blake3::Hasher::new();
        let mut outcomes = Vec::new();
        let mut halted_at = None;
        let mut buf = String::new();
        let mut line = 0usize;
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line += 1;
            hasher.update(buf.as_bytes());
            let Some(entry) = state.prepare(line, &buf) else {
                continue;
            };
            let outcome = self.check_entry(&entry);
            emit(&outcome, sink)?;
            let failed = !outcome.passed;
            outcomes.push(outcome);
            if failed && self.fail_fast() {
                halted_at = Some(line);
                break;
            }
        }
        Ok(Scan {
            outcomes,
            halted_at,
            trace_hash: hasher.finalize().to_hex().to_string(),
            common_cooperation: state.common_cooperation,
        })
    }

    // Parsing stays in file order (baseline capture and duplicate detection
    // depend on it); only the checks are partitioned. Lines past a fail-fast
    // halt are read ahead but never reach the digest or the baseline.
    fn scan_partitioned<R: BufRead>(
        &self,
        mut reader: R,
        sink: Option<&dyn OutcomeSink>,
    ) -> Result<Scan, VerifyError> {
        let mut state = ScanState::new();
        let mut consumed = String::new();
        let mut entries = Vec::new();
        let mut checkpoints = Vec::new();
        let mut buf = String::new();
        let mut line = 0usize;
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line += 1;
            consumed.push_str(&buf);
            if let Some(entry) = state.prepare(line, &buf) {
                checkpoints.push(Checkpoint {
                    line,
                    end: consumed.len(),
                    common_cooperation: state.common_cooperation,
                });
                let parse_failed = entry.parsed.is_err();
                entries.push(entry);
                if parse_failed && self.fail_fast() {
                    break;
                }
            }
        }

        let chunk_size = entries.len().div_ceil(self.options.parallelism).max(1);
        let chunks: Vec<Vec<RecordOutcome>> = std::thread::scope(|scope| {
            let handles: Vec<_> = entries
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.check_chunk(chunk)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| VerifyError::WorkerPanicked))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut halted_at = None;
        for outcome in chunks.into_iter().flatten() {
            emit(&outcome, sink)?;
            let failed = !outcome.passed;
            let line = outcome.line;
            outcomes.push(outcome);
            if failed && self.fail_fast() {
                halted_at = Some(line);
                break;
            }
        }

        let (end, common_cooperation) = match halted_at
            .and_then(|halt| checkpoints.iter().find(|checkpoint| checkpoint.line == halt))
        {
            Some(checkpoint) => (checkpoint.end, checkpoint.common_cooperation),
            None => (consumed.len(), state.common_cooperation),
        };
        Ok(Scan {
            outcomes,
            halted_at,
            trace_hash: blake3::hash(&consumed.as_bytes()[..end]).to_hex().to_string(),
            common_cooperation,
        })
    }

    fn check_chunk(&self, chunk: &[Entry]) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(chunk.len());
        for entry in chunk {
            let outcome = self.check_entry(entry);
            let failed = !outcome.passed;
            outcomes.push(outcome);
            if failed && self.fail_fast() {
                break;
            }
        }
        outcomes
    }

    fn check_entry(&self, entry: &Entry) -> RecordOutcome {
        let (id, schema, failures) = match &entry.parsed {
            Ok(prepared) => (
                Some(prepared.record.id.clone()),
                Some(prepared.record.schema()),
                self.check_record(&prepared.record, prepared.shared_baseline),
            ),
            Err((id, err)) => (id.clone(), None, vec![RecordFailure::Parse(err.clone())]),
        };

        if let Some(first) = failures.first() {
            warn!(
                line = entry.line,
                id = id.as_deref().unwrap_or("-"),
                failures = failures.len(),
                first = %first,
                "trace record failed verification"
            );
        }

        RecordOutcome {
            line: entry.line,
            id,
            schema,
            passed: failures.is_empty(),
            failures,
        }
    }

    /// Every check for one record, in a fixed order. Under fail-fast only the
    /// first failure is kept.
    fn check_record(&self, record: &TraitRecord, shared_baseline: Option<f64>) -> Vec<RecordFailure> {
        let tables = &self.thresholds;
        // 9-field records measure desire against their own cooperation.
        let baseline = shared_baseline
            .or(record.common_cooperation)
            .unwrap_or(record.cooperation);

        let checks: [&dyn Fn() -> Option<RecordFailure>; 6] = [
            &|| {
                check_label(
                    TraitField::Cooperation,
                    CheckedField::CooperationLabel,
                    record.cooperation,
                    record.cooperation_label,
                )
            },
            &|| {
                check_label(
                    TraitField::Aggression,
                    CheckedField::AggressionLabel,
                    record.aggression,
                    record.aggression_label,
                )
            },
            &|| match (shared_baseline, record.common_cooperation) {
                (Some(expected), Some(actual)) => {
                    check_number(CheckedField::CommonCooperation, expected, actual)
                }
                _ => None,
            },
            &|| {
                check_number(
                    CheckedField::CooperationDesire,
                    cooperation_desire(baseline, record.cooperation_label, &tables.cooperation),
                    record.cooperation_desire,
                )
            },
            &|| {
                check_number(
                    CheckedField::WillToLiveDesire,
                    will_to_live_desire(record.will_to_live, record.aggression_label, &tables.will_to_live),
                    record.will_to_live_desire,
                )
            },
            &|| {
                let expected = should_jump(record.cooperation_desire, record.will_to_live_desire);
                (expected != record.jumped).then(|| {
                    RecordFailure::Mismatch(Mismatch {
                        field: CheckedField::Jumped,
                        expected: FieldValue::Flag(expected),
                        actual: FieldValue::Flag(record.jumped),
                        delta: None,
                    })
                })
            },
        ];

        let failures = checks.iter().filter_map(|check| check());
        if self.fail_fast() {
            failures.take(1).collect()
        } else {
            failures.collect()
        }
    }
}

fn check_label(
    trait_field: TraitField,
    field: CheckedField,
    value: f64,
    recorded: FuzzyLabel,
) -> Option<RecordFailure> {
    match classify(value) {
        Err(err) => Some(RecordFailure::Range {
            field: trait_field,
            value: err.value,
        }),
        Ok(expected) if expected != recorded => Some(RecordFailure::Mismatch(Mismatch {
            field,
            expected: FieldValue::Label(expected),
            actual: FieldValue::Label(recorded),
            delta: None,
        })),
        Ok(_) => None,
    }
}

// Exact comparison: the simulator is expected to run the same arithmetic.
fn check_number(field: CheckedField, expected: f64, actual: f64) -> Option<RecordFailure> {
    if expected == actual {
        return None;
    }
    Some(RecordFailure::Mismatch(Mismatch {
        field,
        expected: FieldValue::Number(expected),
        actual: FieldValue::Number(actual),
        delta: Some(actual - expected),
    }))
}

fn emit(outcome: &RecordOutcome, sink: Option<&dyn OutcomeSink>) -> Result<(), OutcomeLogError> {
    match sink {
        Some(sink) => sink.record(outcome.clone()),
        None => Ok(()),
    }
}
