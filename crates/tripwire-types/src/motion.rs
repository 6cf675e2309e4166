//! Motion frames and the timeline that sequences them.

use serde::{Deserialize, Serialize};

use crate::enums::MotionKind;

/// Maximum number of frame slots in a [`Timeline`].
pub const MAX_FRAMES: usize = 6;

/// Errors raised while assembling a timeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    /// More slots were supplied than a timeline can hold.
    #[error("timeline holds at most {MAX_FRAMES} frames, got {count}")]
    TooManyFrames {
        /// Number of slots supplied.
        count: usize,
    },
}

/// One step of a motion sequence.
///
/// A frame is applied once per tick for `repeats` consecutive ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionFrame {
    /// Mutation to apply.
    #[serde(default)]
    pub kind: MotionKind,

    /// Name of the target property. Must be on the target's allow-list.
    pub property: String,

    /// Raw value; interpretation depends on [`kind`](Self::kind).
    #[serde(default)]
    pub value: String,

    /// Sound played at each target when the frame is applied.
    #[serde(default)]
    pub sound_id: Option<u32>,

    /// Number of ticks this frame occupies. Zero-repeat frames are never
    /// selected.
    #[serde(default = "default_repeats")]
    pub repeats: u32,
}

const fn default_repeats() -> u32 {
    1
}

impl MotionFrame {
    /// Build a frame occupying `repeats` ticks.
    pub fn new(kind: MotionKind, property: &str, value: &str, repeats: u32) -> Self {
        Self {
            kind,
            property: property.to_owned(),
            value: value.to_owned(),
            sound_id: None,
            repeats,
        }
    }

    /// Attach a sound to the frame.
    #[must_use]
    pub const fn with_sound(mut self, sound_id: u32) -> Self {
        self.sound_id = Some(sound_id);
        self
    }
}

/// Ordered, fixed-capacity list of frame slots. Empty slots are allowed
/// and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<MotionFrame>>", into = "Vec<Option<MotionFrame>>")]
pub struct Timeline {
    frames: Vec<Option<MotionFrame>>,
}

impl Timeline {
    /// Build a timeline from up to [`MAX_FRAMES`] slots.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::TooManyFrames`] when more slots are given.
    pub fn new(frames: Vec<Option<MotionFrame>>) -> Result<Self, TimelineError> {
        if frames.len() > MAX_FRAMES {
            return Err(TimelineError::TooManyFrames {
                count: frames.len(),
            });
        }
        Ok(Self { frames })
    }

    /// Convenience constructor for a timeline without empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError::TooManyFrames`] when more frames are given.
    pub fn from_frames(frames: Vec<MotionFrame>) -> Result<Self, TimelineError> {
        Self::new(frames.into_iter().map(Some).collect())
    }

    /// All slots, including empty ones.
    pub fn slots(&self) -> &[Option<MotionFrame>] {
        &self.frames
    }

    /// Sum of `repeats` over every populated slot.
    pub fn total_ticks(&self) -> u32 {
        self.frames
            .iter()
            .flatten()
            .fold(0_u32, |acc, frame| acc.saturating_add(frame.repeats))
    }

    /// Select the frame that covers `tick`.
    ///
    /// Repeats are consumed in order; the first frame that drives the
    /// remainder below zero wins. A zero-repeat frame can never drive it
    /// below zero, so it is never selected.
    pub fn frame_at(&self, tick: u32) -> Option<&MotionFrame> {
        let mut remaining = i64::from(tick);
        for frame in self.frames.iter().flatten() {
            remaining = remaining.saturating_sub(i64::from(frame.repeats));
            if remaining < 0 {
                return Some(frame);
            }
        }
        None
    }
}

impl TryFrom<Vec<Option<MotionFrame>>> for Timeline {
    type Error = TimelineError;

    fn try_from(frames: Vec<Option<MotionFrame>>) -> Result<Self, Self::Error> {
        Self::new(frames)
    }
}

impl From<Timeline> for Vec<Option<MotionFrame>> {
    fn from(timeline: Timeline) -> Self {
        timeline.frames
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(value: &str, repeats: u32) -> MotionFrame {
        MotionFrame::new(MotionKind::Set, "z", value, repeats)
    }

    #[test]
    fn total_ticks_sums_repeats() {
        let timeline =
            Timeline::from_frames(vec![frame("a", 2), frame("b", 1), frame("c", 3)]).unwrap();
        assert_eq!(timeline.total_ticks(), 6);
    }

    #[test]
    fn zero_repeat_frames_count_zero_and_are_skipped() {
        let timeline =
            Timeline::new(vec![Some(frame("a", 1)), Some(frame("skip", 0)), None, Some(frame("c", 2))])
                .unwrap();
        assert_eq!(timeline.total_ticks(), 3);
        assert_eq!(timeline.frame_at(0).map(|f| f.value.as_str()), Some("a"));
        assert_eq!(timeline.frame_at(1).map(|f| f.value.as_str()), Some("c"));
        assert_eq!(timeline.frame_at(2).map(|f| f.value.as_str()), Some("c"));
        assert!(timeline.frame_at(3).is_none());
    }

    #[test]
    fn frame_at_walks_repeats_in_order() {
        let timeline =
            Timeline::from_frames(vec![frame("a", 2), frame("b", 1), frame("c", 3)]).unwrap();
        let picked: Vec<&str> = (0..6)
            .filter_map(|t| timeline.frame_at(t).map(|f| f.value.as_str()))
            .collect();
        assert_eq!(picked, vec!["a", "a", "b", "c", "c", "c"]);
    }

    #[test]
    fn rejects_more_than_six_slots() {
        let slots = vec![None; MAX_FRAMES + 1];
        assert_eq!(
            Timeline::new(slots),
            Err(TimelineError::TooManyFrames { count: 7 })
        );
    }

    #[test]
    fn frames_read_from_yaml_with_defaults() {
        let yaml = "- property: z\n  value: \"1\"\n- null\n- kind: toggle\n  property: open\n  repeats: 2\n";
        let timeline: Timeline = serde_yml::from_str(yaml).unwrap();
        assert_eq!(timeline.slots().len(), 3);
        assert_eq!(timeline.total_ticks(), 3);
    }
}
