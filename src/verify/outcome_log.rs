//! JSONL log of record outcomes, written off the verification thread.
//!
//! The log is a side channel: the report stays authoritative, and the counts
//! returned by [`OutcomeWorker::join`] let callers check the two agree.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::engine::RecordOutcome;

/// Which outcomes reach the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeFilter {
    #[default]
    All,
    FailuresOnly,
}

impl OutcomeFilter {
    fn admits(self, outcome: &RecordOutcome) -> bool {
        match self {
            OutcomeFilter::All => true,
            OutcomeFilter::FailuresOnly => !outcome.passed,
        }
    }
}

#[derive(Debug, Serialize)]
struct OutcomeRow {
    logged_at_ms: i64,
    #[serde(flatten)]
    outcome: RecordOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum OutcomeLogError {
    #[error("failed to write outcome log: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode outcome for trace line {line}: {source}")]
    Encode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("outcome log writer stopped before trace line {line} was logged")]
    WriterGone { line: usize },
    #[error("outcome log writer panicked")]
    WriterPanicked,
}

/// Receives every record outcome as the verifier produces it.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: RecordOutcome) -> Result<(), OutcomeLogError>;
}

/// Rows written by a finished log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeLogStats {
    pub rows: usize,
    pub failing_rows: usize,
}

#[derive(Clone)]
pub struct JsonlOutcomeSink {
    filter: OutcomeFilter,
    rows: mpsc::Sender<RecordOutcome>,
}

/// Owns the writer thread. Drop every [`JsonlOutcomeSink`] before joining.
pub struct OutcomeWorker {
    writer: std::thread::JoinHandle<Result<OutcomeLogStats, OutcomeLogError>>,
}

impl JsonlOutcomeSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, OutcomeWorker), OutcomeLogError> {
        Self::with_filter(path, OutcomeFilter::All)
    }

    pub fn with_filter(
        path: impl AsRef<Path>,
        filter: OutcomeFilter,
    ) -> Result<(Self, OutcomeWorker), OutcomeLogError> {
        let file = File::create(path)?;
        let (rows, pending) = mpsc::channel();
        let writer = std::thread::spawn(move || drain_outcomes(BufWriter::new(file), pending));
        Ok((Self { filter, rows }, OutcomeWorker { writer }))
    }

    pub fn filter(&self) -> OutcomeFilter {
        self.filter
    }
}

impl OutcomeSink for JsonlOutcomeSink {
    fn record(&self, outcome: RecordOutcome) -> Result<(), OutcomeLogError> {
        if !self.filter.admits(&outcome) {
            return Ok(());
        }
        let line = outcome.line;
        self.rows
            .send(outcome)
            .map_err(|_| OutcomeLogError::WriterGone { line })
    }
}

impl OutcomeWorker {
    /// Blocks until every queued outcome is on disk.
    pub fn join(self) -> Result<OutcomeLogStats, OutcomeLogError> {
        self.writer
            .join()
            .map_err(|_| OutcomeLogError::WriterPanicked)?
    }
}

fn drain_outcomes<W: Write>(
    mut out: W,
    pending: mpsc::Receiver<RecordOutcome>,
) -> Result<OutcomeLogStats, OutcomeLogError> {
    let mut stats = OutcomeLogStats::default();
    for outcome in pending {
        let line = outcome.line;
        let passed = outcome.passed;
        let row = OutcomeRow {
            logged_at_ms: epoch_ms(),
            outcome,
        };
        serde_json::to_writer(&mut out, &row)
            .map_err(|source| OutcomeLogError::Encode { line, source })?;
        out.write_all(b"\n")?;
        stats.rows += 1;
        if !passed {
            stats.failing_rows += 1;
        }
    }
    out.flush()?;
    Ok(stats)
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
