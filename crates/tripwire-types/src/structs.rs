//! Small value types: counter rolls, property values and schedule windows.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive range a counter increment is rolled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRange {
    /// Lowest possible roll.
    pub min: u32,
    /// Highest possible roll.
    pub max: u32,
}

impl RollRange {
    /// A roll that always yields `value`.
    pub const fn fixed(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Build a range; bounds are normalised so `min <= max`.
    pub const fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }
}

impl Default for RollRange {
    fn default() -> Self {
        Self::fixed(1)
    }
}

/// A typed property value read from or written to a host entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Boolean flag (visibility, locked, open).
    Bool(bool),
    /// Integer quantity (z offset, hue, item id).
    Int(i64),
    /// Free text (name, label).
    Text(String),
}

impl PropValue {
    /// Parse `raw` into the same variant as `self`.
    ///
    /// Returns `None` when `raw` does not parse as that type.
    pub fn parse_like(&self, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match self {
            Self::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Self::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Self::Bool(false)),
                _ => None,
            },
            Self::Int(_) => raw.parse::<i64>().ok().map(Self::Int),
            Self::Text(_) => Some(Self::Text(raw.to_owned())),
        }
    }

    /// Integer payload, if this is an [`Int`](Self::Int).
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a [`Bool`](Self::Bool).
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl core::fmt::Display for PropValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// When a scheduled event is active.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleWindow {
    /// Always active.
    #[default]
    Always,
    /// Active from `start` (inclusive) to `end` (exclusive).
    Between {
        /// First active instant.
        start: DateTime<Utc>,
        /// First inactive instant.
        end: DateTime<Utc>,
    },
    /// Active every day between two local times.
    ///
    /// Local time is UTC shifted by `utc_offset_minutes`. A window whose end
    /// is before its start wraps past midnight; equal bounds mean all day.
    Daily {
        /// Local opening time (inclusive).
        start: NaiveTime,
        /// Local closing time (exclusive).
        end: NaiveTime,
        /// Offset of the schedule's local time from UTC.
        #[serde(default)]
        utc_offset_minutes: i32,
    },
}

impl ScheduleWindow {
    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Always => true,
            Self::Between { start, end } => *start <= now && now < *end,
            Self::Daily {
                start,
                end,
                utc_offset_minutes,
            } => {
                let local = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
                    .map_or_else(|| now.time(), |offset| now.with_timezone(&offset).time());
                if start == end {
                    true
                } else if start < end {
                    *start <= local && local < *end
                } else {
                    local >= *start || local < *end
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn roll_range_normalises_bounds() {
        let r = RollRange::new(5, 2);
        assert_eq!((r.min, r.max), (2, 5));
        assert_eq!(RollRange::fixed(3), RollRange::new(3, 3));
    }

    #[test]
    fn parse_like_follows_current_type() {
        assert_eq!(PropValue::Int(0).parse_like(" 12 "), Some(PropValue::Int(12)));
        assert_eq!(PropValue::Bool(false).parse_like("on"), Some(PropValue::Bool(true)));
        assert_eq!(PropValue::Int(0).parse_like("x"), None);
        assert_eq!(
            PropValue::Text(String::new()).parse_like("door"),
            Some(PropValue::Text("door".to_owned()))
        );
    }

    #[test]
    fn between_window_is_half_open() {
        let w = ScheduleWindow::Between {
            start: at(10, 0),
            end: at(12, 0),
        };
        assert!(w.contains(at(10, 0)));
        assert!(w.contains(at(11, 59)));
        assert!(!w.contains(at(12, 0)));
        assert!(!w.contains(at(9, 59)));
    }

    #[test]
    fn daily_window_respects_offset() {
        // 20:00-22:00 at UTC+2 is 18:00-20:00 UTC.
        let w = ScheduleWindow::Daily {
            start: time(20, 0),
            end: time(22, 0),
            utc_offset_minutes: 120,
        };
        assert!(w.contains(at(18, 30)));
        assert!(!w.contains(at(20, 30)));
    }

    #[test]
    fn daily_window_wraps_midnight() {
        let w = ScheduleWindow::Daily {
            start: time(22, 0),
            end: time(2, 0),
            utc_offset_minutes: 0,
        };
        assert!(w.contains(at(23, 0)));
        assert!(w.contains(at(1, 0)));
        assert!(!w.contains(at(12, 0)));
    }

    #[test]
    fn window_reads_from_yaml() {
        let yaml = "type: daily\nstart: \"08:00:00\"\nend: \"17:00:00\"\n";
        let w: ScheduleWindow = serde_yml::from_str(yaml).unwrap();
        assert!(w.contains(at(9, 0)));
        let always: ScheduleWindow = serde_yml::from_str("type: always").unwrap();
        assert_eq!(always, ScheduleWindow::Always);
    }
}
