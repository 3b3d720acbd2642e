//! Threshold tables, named presets, and the JSON config loader.
//!
//! A table holds one threshold per [`FuzzyLabel`], so a partial table cannot
//! be built. A [`ThresholdSet`] pairs the cooperation table with the
//! will-to-live table. The will-to-live table is looked up by the
//! *aggression* label.

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fuzzy::FuzzyLabel;

/// Name of the preset used when the caller does not pick one.
pub const DEFAULT_SET: &str = "canonical";

/// Environment variable naming a threshold config used when no table is given.
pub const TABLE_CONFIG_ENV: &str = "JUMPCHECK_TABLE_CONFIG";

/// One threshold per fuzzy label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    values: [f64; 5],
}

impl ThresholdTable {
    pub const fn new(very_low: f64, low: f64, mid: f64, high: f64, very_high: f64) -> Self {
        Self {
            values: [very_low, low, mid, high, very_high],
        }
    }

    pub fn get(&self, label: FuzzyLabel) -> f64 {
        self.values[label.rank()]
    }

    /// `(label, threshold)` pairs, lowest label first.
    pub fn entries(&self) -> impl Iterator<Item = (FuzzyLabel, f64)> + '_ {
        FuzzyLabel::ALL.into_iter().map(|label| (label, self.get(label)))
    }

    /// True when thresholds strictly increase with label rank.
    pub fn is_increasing(&self) -> bool {
        self.values.windows(2).all(|w| w[0] < w[1])
    }

    /// True when thresholds strictly decrease with label rank.
    pub fn is_decreasing(&self) -> bool {
        self.values.windows(2).all(|w| w[0] > w[1])
    }

    fn from_spec(spec: &TableSpec, dimension: &'static str) -> Result<Self, ThresholdConfigError> {
        let table = Self::new(spec.very_low, spec.low, spec.mid, spec.high, spec.very_high);
        for (label, value) in table.entries() {
            if !value.is_finite() {
                return Err(ThresholdConfigError::NonFinite {
                    dimension,
                    label: label.config_key(),
                });
            }
        }
        Ok(table)
    }

    fn to_spec(self) -> TableSpec {
        TableSpec {
            very_low: self.get(FuzzyLabel::VeryLow),
            low: self.get(FuzzyLabel::Low),
            mid: self.get(FuzzyLabel::Mid),
            high: self.get(FuzzyLabel::High),
            very_high: self.get(FuzzyLabel::VeryHigh),
        }
    }
}

impl Index<FuzzyLabel> for ThresholdTable {
    type Output = f64;

    fn index(&self, label: FuzzyLabel) -> &f64 {
        &self.values[label.rank()]
    }
}

impl fmt::Display for ThresholdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .map(|(label, value)| format!("{label}={value}"))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Cooperation and will-to-live tables used together for one verification run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub name: String,
    pub cooperation: ThresholdTable,
    pub will_to_live: ThresholdTable,
}

impl ThresholdSet {
    /// Decreasing cooperation table, increasing will-to-live table.
    pub fn canonical() -> Self {
        Self {
            name: DEFAULT_SET.to_string(),
            cooperation: ThresholdTable::new(0.8, 0.7, 0.6, 0.5, 0.4),
            will_to_live: ThresholdTable::new(0.1, 0.2, 0.3, 0.4, 0.5),
        }
    }

    /// Same cooperation table, will-to-live thresholds decreasing with rank.
    pub fn inverted_will_to_live() -> Self {
        Self {
            name: "inverted_will_to_live".to_string(),
            cooperation: ThresholdTable::new(0.8, 0.7, 0.6, 0.5, 0.4),
            will_to_live: ThresholdTable::new(0.5, 0.4, 0.3, 0.2, 0.1),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "ThresholdSet(name={}, cooperation={}, will_to_live={})",
            self.name, self.cooperation, self.will_to_live
        )
    }

    pub fn to_config(&self) -> ThresholdConfig {
        ThresholdConfig {
            name: Some(self.name.clone()),
            cooperation: self.cooperation.to_spec(),
            will_to_live: self.will_to_live.to_spec(),
        }
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::canonical()
    }
}

/// On-disk form of one table. Every label key is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub very_low: f64,
    pub low: f64,
    pub mid: f64,
    pub high: f64,
    pub very_high: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub cooperation: TableSpec,
    pub will_to_live: TableSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum ThresholdConfigError {
    #[error("failed to read threshold config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse threshold config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{dimension} threshold for '{label}' must be finite")]
    NonFinite {
        dimension: &'static str,
        label: &'static str,
    },
    #[error("threshold set name must be non-empty")]
    EmptyName,
}

pub fn thresholds_from_config(config: &ThresholdConfig) -> Result<ThresholdSet, ThresholdConfigError> {
    let name = match &config.name {
        Some(name) if name.trim().is_empty() => return Err(ThresholdConfigError::EmptyName),
        Some(name) => name.clone(),
        None => "custom".to_string(),
    };
    Ok(ThresholdSet {
        name,
        cooperation: ThresholdTable::from_spec(&config.cooperation, "cooperation")?,
        will_to_live: ThresholdTable::from_spec(&config.will_to_live, "will_to_live")?,
    })
}

pub fn parse_thresholds(raw: &str) -> Result<ThresholdSet, ThresholdConfigError> {
    let config: ThresholdConfig = serde_json::from_str(raw)?;
    thresholds_from_config(&config)
}

pub fn load_thresholds_from_path(path: impl AsRef<Path>) -> Result<ThresholdSet, ThresholdConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ThresholdConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_thresholds(&raw)
}

/// Named threshold sets selectable from the CLI.
pub struct ThresholdRegistry {
    sets: HashMap<String, ThresholdSet>,
}

impl Default for ThresholdRegistry {
    fn default() -> Self {
        let mut registry = Self {
            sets: HashMap::new(),
        };
        registry.insert(ThresholdSet::canonical());
        registry.insert(ThresholdSet::inverted_will_to_live());
        registry
    }
}

impl ThresholdRegistry {
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sets.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, name: &str) -> Option<ThresholdSet> {
        self.sets.get(name).cloned()
    }

    pub fn insert(&mut self, set: ThresholdSet) {
        self.sets.insert(set.name.clone(), set);
    }
}
