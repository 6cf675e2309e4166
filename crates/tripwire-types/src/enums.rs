//! Enumeration types shared by the engine and its configuration.
//!
//! Every enum that is persisted carries a stable one-byte tag
//! ([`tag`](Comparison::tag) / [`from_tag`](Comparison::from_tag)).
//! Tags are part of the save format and must never be renumbered.

use serde::{Deserialize, Serialize};

/// Comparison operator used by threshold evaluators.
///
/// The measured value is always the left-hand side:
/// `Gt` means `measured > operand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `measured == operand`
    Eq,
    /// `measured != operand`
    Ne,
    /// `measured > operand`
    Gt,
    /// `measured >= operand`
    #[default]
    Ge,
    /// `measured < operand`
    Lt,
    /// `measured <= operand`
    Le,
}

impl Comparison {
    /// Apply the comparison with `measured` on the left.
    pub const fn evaluate(self, measured: i64, operand: i64) -> bool {
        match self {
            Self::Eq => measured == operand,
            Self::Ne => measured != operand,
            Self::Gt => measured > operand,
            Self::Ge => measured >= operand,
            Self::Lt => measured < operand,
            Self::Le => measured <= operand,
        }
    }

    /// Stable persistence tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Eq => 0,
            Self::Ne => 1,
            Self::Gt => 2,
            Self::Ge => 3,
            Self::Lt => 4,
            Self::Le => 5,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Gt),
            3 => Some(Self::Ge),
            4 => Some(Self::Lt),
            5 => Some(Self::Le),
            _ => None,
        }
    }
}

/// How many live memory records a node may hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
    /// One record per actor.
    #[default]
    PerActor,
    /// At most one live record across all actors. A write while another
    /// actor holds the slot is ignored.
    SingleSlot,
}

impl ScopePolicy {
    /// Stable persistence tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::PerActor => 0,
            Self::SingleSlot => 1,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::PerActor),
            1 => Some(Self::SingleSlot),
            _ => None,
        }
    }
}

/// The mutation a motion frame applies to its property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    /// Write the frame value.
    #[default]
    Set,
    /// Add the frame value (subtract while reversing).
    Inc,
    /// Negate a boolean property.
    Toggle,
    /// Alternate between the two halves of an `a|b` frame value.
    Flip,
}

impl MotionKind {
    /// Stable persistence tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Set => 0,
            Self::Inc => 1,
            Self::Toggle => 2,
            Self::Flip => 3,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Set),
            1 => Some(Self::Inc),
            2 => Some(Self::Toggle),
            3 => Some(Self::Flip),
            _ => None,
        }
    }
}

/// Discriminant of every node kind the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Pass-through trigger source.
    Relay,
    /// Owner of a scheduled event name.
    EventSchedule,
    /// Per-actor TTL state memory.
    StateController,
    /// Random-roll tally accumulator.
    TallyCounter,
    /// Kill tally accumulator fed by kill reports.
    KillMonitor,
    /// Binary threshold branch.
    ThresholdBranch,
    /// Threshold message table with a binary branch.
    ThresholdMessages,
    /// Frame-sequenced motion controller.
    MotionController,
}

impl NodeKind {
    /// Stable persistence tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Relay => 0,
            Self::EventSchedule => 1,
            Self::StateController => 2,
            Self::TallyCounter => 3,
            Self::KillMonitor => 4,
            Self::ThresholdBranch => 5,
            Self::ThresholdMessages => 6,
            Self::MotionController => 7,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Relay),
            1 => Some(Self::EventSchedule),
            2 => Some(Self::StateController),
            3 => Some(Self::TallyCounter),
            4 => Some(Self::KillMonitor),
            5 => Some(Self::ThresholdBranch),
            6 => Some(Self::ThresholdMessages),
            7 => Some(Self::MotionController),
            _ => None,
        }
    }

    /// Whether nodes of this kind carry actor memory a threshold can read.
    pub const fn is_memory_source(self) -> bool {
        matches!(
            self,
            Self::StateController | Self::TallyCounter | Self::KillMonitor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_uses_measured_on_the_left() {
        assert!(Comparison::Gt.evaluate(6, 5));
        assert!(!Comparison::Gt.evaluate(5, 5));
        assert!(Comparison::Ge.evaluate(5, 5));
        assert!(Comparison::Lt.evaluate(4, 5));
        assert!(Comparison::Le.evaluate(5, 5));
        assert!(Comparison::Eq.evaluate(5, 5));
        assert!(Comparison::Ne.evaluate(4, 5));
    }

    #[test]
    fn tags_are_stable() {
        for tag in 0..6 {
            let cmp = Comparison::from_tag(tag);
            assert_eq!(cmp.map(Comparison::tag), Some(tag));
        }
        assert!(Comparison::from_tag(6).is_none());
        assert_eq!(NodeKind::MotionController.tag(), 7);
        assert_eq!(NodeKind::from_tag(4), Some(NodeKind::KillMonitor));
        assert_eq!(ScopePolicy::from_tag(1), Some(ScopePolicy::SingleSlot));
        assert_eq!(MotionKind::from_tag(3), Some(MotionKind::Flip));
    }

    #[test]
    fn only_memory_kinds_are_sources() {
        assert!(NodeKind::TallyCounter.is_memory_source());
        assert!(NodeKind::StateController.is_memory_source());
        assert!(!NodeKind::ThresholdBranch.is_memory_source());
        assert!(!NodeKind::Relay.is_memory_source());
    }
}
