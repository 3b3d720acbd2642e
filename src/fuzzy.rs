//! Fuzzy labels and the trait classifier.
//!
//! A trait value in `[0.0, 1.0)` falls into one of five 0.2-wide half-open
//! buckets. The lower edge of each bucket is inclusive, so `0.2` is `Low`,
//! not `VeryLow`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered fuzzy category for a continuous trait value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FuzzyLabel {
    VeryLow,
    Low,
    Mid,
    High,
    VeryHigh,
}

impl FuzzyLabel {
    /// All labels, lowest first.
    pub const ALL: [FuzzyLabel; 5] = [
        FuzzyLabel::VeryLow,
        FuzzyLabel::Low,
        FuzzyLabel::Mid,
        FuzzyLabel::High,
        FuzzyLabel::VeryHigh,
    ];

    /// Zero-based position in the ordering.
    pub fn rank(self) -> usize {
        match self {
            FuzzyLabel::VeryLow => 0,
            FuzzyLabel::Low => 1,
            FuzzyLabel::Mid => 2,
            FuzzyLabel::High => 3,
            FuzzyLabel::VeryHigh => 4,
        }
    }

    /// Token used for this label in trace files.
    pub fn token(self) -> &'static str {
        match self {
            FuzzyLabel::VeryLow => ":VLO",
            FuzzyLabel::Low => ":LO",
            FuzzyLabel::Mid => ":MID",
            FuzzyLabel::High => ":HI",
            FuzzyLabel::VeryHigh => ":VHI",
        }
    }

    /// Key used for this label in threshold config files.
    pub fn config_key(self) -> &'static str {
        match self {
            FuzzyLabel::VeryLow => "very_low",
            FuzzyLabel::Low => "low",
            FuzzyLabel::Mid => "mid",
            FuzzyLabel::High => "high",
            FuzzyLabel::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for FuzzyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fuzzy label token '{0}'")]
pub struct UnknownLabel(pub String);

impl FromStr for FuzzyLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FuzzyLabel::ALL
            .into_iter()
            .find(|label| label.token() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl Serialize for FuzzyLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for FuzzyLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A trait value the classifier refuses to bucket.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("trait value {value} is outside [0.0, 1.0)")]
pub struct RangeError {
    pub value: f64,
}

/// Bucket a trait value into its fuzzy label.
///
/// Values below zero, at or above one, and NaN are rejected; nothing is clamped.
pub fn classify(value: f64) -> Result<FuzzyLabel, RangeError> {
    if !(0.0..1.0).contains(&value) {
        return Err(RangeError { value });
    }
    let label = if value < 0.2 {
        FuzzyLabel::VeryLow
    } else if value < 0.4 {
        FuzzyLabel::Low
    } else if value < 0.6 {
        FuzzyLabel::Mid
    } else if value < 0.8 {
        FuzzyLabel::High
    } else {
        FuzzyLabel::VeryHigh
    };
    Ok(label)
}
