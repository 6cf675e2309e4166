//! Threshold tables consulted by threshold evaluators.

use serde::{Deserialize, Serialize};

use crate::enums::Comparison;

/// Maximum number of entries in a [`ThresholdSpec`].
pub const MAX_THRESHOLDS: usize = 6;

/// Errors raised while assembling a threshold table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    /// More entries were supplied than a table can hold.
    #[error("threshold table holds at most {MAX_THRESHOLDS} entries, got {count}")]
    TooManyThresholds {
        /// Number of entries supplied.
        count: usize,
    },
}

/// One threshold and the message announced when it is the best match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    /// Threshold compared against the measured value.
    pub value: i64,
    /// Message sent to the actor, if any.
    #[serde(default)]
    pub message: Option<String>,
}

impl ThresholdEntry {
    /// Build an entry.
    pub fn new(value: i64, message: Option<&str>) -> Self {
        Self {
            value,
            message: message.map(str::to_owned),
        }
    }
}

#[derive(Deserialize)]
struct RawThresholdSpec {
    #[serde(default)]
    comparison: Comparison,
    #[serde(default)]
    compare_value: i64,
    #[serde(default)]
    thresholds: Vec<ThresholdEntry>,
}

/// Comparison, operand and an ordered threshold/message table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholdSpec")]
pub struct ThresholdSpec {
    /// Operator applied as `measured <op> operand`.
    pub comparison: Comparison,
    /// Operand for the binary branch decision.
    pub compare_value: i64,
    thresholds: Vec<ThresholdEntry>,
}

impl TryFrom<RawThresholdSpec> for ThresholdSpec {
    type Error = ThresholdError;

    fn try_from(raw: RawThresholdSpec) -> Result<Self, Self::Error> {
        Self::new(raw.comparison, raw.compare_value, raw.thresholds)
    }
}

impl ThresholdSpec {
    /// Build a spec with up to [`MAX_THRESHOLDS`] entries.
    ///
    /// # Errors
    ///
    /// Returns [`ThresholdError::TooManyThresholds`] when more are given.
    pub fn new(
        comparison: Comparison,
        compare_value: i64,
        thresholds: Vec<ThresholdEntry>,
    ) -> Result<Self, ThresholdError> {
        if thresholds.len() > MAX_THRESHOLDS {
            return Err(ThresholdError::TooManyThresholds {
                count: thresholds.len(),
            });
        }
        Ok(Self {
            comparison,
            compare_value,
            thresholds,
        })
    }

    /// A spec with no message table, only the binary decision.
    pub const fn branch(comparison: Comparison, compare_value: i64) -> Self {
        Self {
            comparison,
            compare_value,
            thresholds: Vec::new(),
        }
    }

    /// The configured threshold entries in order.
    pub fn thresholds(&self) -> &[ThresholdEntry] {
        &self.thresholds
    }

    /// Binary decision for `measured`.
    pub const fn decide(&self, measured: i64) -> bool {
        self.comparison.evaluate(measured, self.compare_value)
    }

    /// Index of the threshold that best describes `measured`.
    ///
    /// Among thresholds `t` for which `measured <op> t` holds, the one
    /// closest to `measured` wins; ties go to the earlier entry. With `Ge`
    /// and thresholds `[1, 5, 9]`, a measured 6 selects `5`.
    pub fn nearest_match(&self, measured: i64) -> Option<usize> {
        self.thresholds
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.comparison.evaluate(measured, entry.value))
            .min_by_key(|(_, entry)| measured.abs_diff(entry.value))
            .map(|(index, _)| index)
    }

    /// Message attached to the entry at `index`.
    pub fn message(&self, index: usize) -> Option<&str> {
        self.thresholds
            .get(index)
            .and_then(|entry| entry.message.as_deref())
    }
}
