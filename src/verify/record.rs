//! Trace record schema and the line parser.

use serde::{Deserialize, Serialize};

use crate::fuzzy::FuzzyLabel;

/// Trace line layout, chosen by field count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSchema {
    /// 9 fields; the cooperation desire baseline is the agent's own cooperation.
    Individual,
    /// 10 fields; a common cooperation baseline is shared by the whole trace.
    SharedBaseline,
}

impl TraceSchema {
    pub fn field_count(self) -> usize {
        match self {
            TraceSchema::Individual => 9,
            TraceSchema::SharedBaseline => 10,
        }
    }

    pub fn from_field_count(count: usize) -> Option<Self> {
        match count {
            9 => Some(TraceSchema::Individual),
            10 => Some(TraceSchema::SharedBaseline),
            _ => None,
        }
    }
}

/// One agent snapshot as recorded by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitRecord {
    pub id: String,
    pub cooperation: f64,
    pub aggression: f64,
    pub will_to_live: f64,
    pub cooperation_label: FuzzyLabel,
    pub aggression_label: FuzzyLabel,
    pub cooperation_desire: f64,
    pub will_to_live_desire: f64,
    /// Present exactly for [`TraceSchema::SharedBaseline`] records.
    pub common_cooperation: Option<f64>,
    pub jumped: bool,
}

impl TraitRecord {
    pub fn schema(&self) -> TraceSchema {
        if self.common_cooperation.is_some() {
            TraceSchema::SharedBaseline
        } else {
            TraceSchema::Individual
        }
    }

    /// Wire form of the record. Floats use the shortest round-trip formatting.
    pub fn to_line(&self) -> String {
        let mut fields = vec![
            self.id.clone(),
            self.cooperation.to_string(),
            self.aggression.to_string(),
            self.will_to_live.to_string(),
            self.cooperation_label.token().to_string(),
            self.aggression_label.token().to_string(),
            self.cooperation_desire.to_string(),
            self.will_to_live_desire.to_string(),
        ];
        if let Some(common) = self.common_cooperation {
            fields.push(common.to_string());
        }
        fields.push(self.jumped.to_string());
        fields.join(" ")
    }
}

/// A trace line that could not be turned into a [`TraitRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ParseError {
    #[error("expected 9 or 10 fields, found {found}")]
    FieldCount { found: usize },
    #[error("field '{field}' is not a number: '{raw}'")]
    Number { field: &'static str, raw: String },
    #[error("field '{field}' has unknown label token '{raw}'")]
    Label { field: &'static str, raw: String },
    #[error("field 'jumped' is not a boolean literal: '{raw}'")]
    Boolean { raw: String },
    #[error("identifier '{id}' already used on line {first_line}")]
    DuplicateId { id: String, first_line: usize },
}

/// Parse one non-blank trace line.
pub fn parse_line(line: &str) -> Result<TraitRecord, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let schema = TraceSchema::from_field_count(fields.len()).ok_or(ParseError::FieldCount {
        found: fields.len(),
    })?;

    // Columns are parsed left to right so the first bad one is reported.
    let cooperation = parse_number("cooperation", fields[1])?;
    let aggression = parse_number("aggression", fields[2])?;
    let will_to_live = parse_number("will_to_live", fields[3])?;
    let cooperation_label = parse_label("cooperation_label", fields[4])?;
    let aggression_label = parse_label("aggression_label", fields[5])?;
    let cooperation_desire = parse_number("cooperation_desire", fields[6])?;
    let will_to_live_desire = parse_number("will_to_live_desire", fields[7])?;
    let (common_cooperation, jumped_raw) = match schema {
        TraceSchema::Individual => (None, fields[8]),
        TraceSchema::SharedBaseline => (Some(parse_number("common_cooperation", fields[8])?), fields[9]),
    };

    Ok(TraitRecord {
        id: fields[0].to_string(),
        cooperation,
        aggression,
        will_to_live,
        cooperation_label,
        aggression_label,
        cooperation_desire,
        will_to_live_desire,
        common_cooperation,
        jumped: parse_jumped(schema, jumped_raw)?,
    })
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>().map_err(|_| ParseError::Number {
        field,
        raw: raw.to_string(),
    })
}

fn parse_label(field: &'static str, raw: &str) -> Result<FuzzyLabel, ParseError> {
    raw.parse::<FuzzyLabel>().map_err(|_| ParseError::Label {
        field,
        raw: raw.to_string(),
    })
}

// 9-field traces write the literal token; 10-field traces vary capitalization.
fn parse_jumped(schema: TraceSchema, raw: &str) -> Result<bool, ParseError> {
    let parsed = match schema {
        TraceSchema::Individual => match raw {
            "true" | "True" => Some(true),
            "false" | "False" => Some(false),
            _ => None,
        },
        TraceSchema::SharedBaseline => {
            if raw.eq_ignore_ascii_case("true") {
                Some(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
    };
    parsed.ok_or_else(|| ParseError::Boolean {
        raw: raw.to_string(),
    })
}
