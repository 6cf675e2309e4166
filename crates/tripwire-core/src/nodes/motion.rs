//! Frame-sequenced motion controller.
//!
//! A controller walks its [`Timeline`] one tick per `interval`, applying
//! the frame under the cursor to every resolved target. The world owns the
//! timer; the controller only says when to start and stop it through the
//! [`TimerCommand`] in its [`FireOutcome`].
//!
//! # Direction
//!
//! A reversable controller remembers whether it is `raised`. Starting while
//! raised runs the timeline backwards (last tick first, `Inc` frames
//! subtracting). Every completed run of a reversable controller toggles
//! `raised`. A seesaw controller that finishes a forward run immediately
//! runs back down before forwarding to its link.

use chrono::TimeDelta;
use tracing::{debug, info};
use tripwire_types::{ActorId, EntityId, MotionFrame, MotionKind, NodeId, PropValue, Timeline};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter, decode_tag};
use crate::host::{Host, PropError};
use crate::nodes::{FireContext, FireOutcome, TimerCommand};

/// Lower bound on the tick interval.
pub const MIN_INTERVAL_MS: u64 = 1;

/// Runtime state of a motion controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    /// Whether the last completed run left the target raised.
    pub raised: bool,
    /// Whether the current run moves backwards.
    pub reversing: bool,
    /// Tick under the cursor.
    pub current_tick: u32,
    /// Whether a run is in progress.
    pub running: bool,
}

/// Drives a timeline of property mutations against a host entity or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionController {
    /// Frames to apply.
    pub timeline: Timeline,
    /// Entity (or group of entities) the frames mutate.
    pub target: Option<EntityId>,
    /// Milliseconds between ticks.
    pub interval_ms: u64,
    /// Alternate direction between runs.
    pub reversable: bool,
    /// Run back down right after a forward run.
    pub seesaw: bool,
    state: MotionState,
    actor: Option<ActorId>,
}

impl MotionController {
    /// Create an idle, lowered controller.
    pub fn new(timeline: Timeline, target: Option<EntityId>, interval_ms: u64) -> Self {
        Self {
            timeline,
            target,
            interval_ms,
            reversable: false,
            seesaw: false,
            state: MotionState::default(),
            actor: None,
        }
    }

    /// Enable reversal between runs.
    #[must_use]
    pub const fn reversable(mut self, reversable: bool) -> Self {
        self.reversable = reversable;
        self
    }

    /// Enable the seesaw return run.
    #[must_use]
    pub const fn seesaw(mut self, seesaw: bool) -> Self {
        self.seesaw = seesaw;
        self
    }

    /// Current runtime state.
    pub const fn state(&self) -> MotionState {
        self.state
    }

    /// Whether a run is in progress.
    pub const fn is_running(&self) -> bool {
        self.state.running
    }

    /// Tick interval, never shorter than [`MIN_INTERVAL_MS`].
    pub fn interval(&self) -> TimeDelta {
        let ms = self.interval_ms.max(MIN_INTERVAL_MS);
        TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    /// Why the controller cannot start, if it cannot.
    pub(crate) fn config_issue(&self) -> Option<String> {
        if self.timeline.total_ticks() == 0 {
            return Some("timeline has no ticks".to_owned());
        }
        if self.target.is_none() {
            return Some("no target entity configured".to_owned());
        }
        None
    }

    /// Start a run on behalf of `actor`.
    pub(crate) fn start(
        &mut self,
        actor: ActorId,
        link: Option<NodeId>,
        ctx: &mut FireContext<'_>,
    ) -> FireOutcome {
        let total = self.timeline.total_ticks();
        self.actor = Some(actor);
        self.state.reversing = self.state.raised && self.reversable;
        self.state.current_tick = if self.state.reversing {
            total.saturating_sub(1)
        } else {
            0
        };
        info!(
            node = %ctx.node,
            %actor,
            total,
            reversing = self.state.reversing,
            "motion started"
        );
        self.apply_current(ctx);
        if total <= 1 {
            return self.finish(link, ctx);
        }
        self.state.running = true;
        FireOutcome::timer(TimerCommand::Start(self.interval()))
    }

    /// Advance one tick. Called by the world's timer.
    pub(crate) fn tick(&mut self, link: Option<NodeId>, ctx: &mut FireContext<'_>) -> FireOutcome {
        if !self.state.running {
            return FireOutcome::timer(TimerCommand::Cancel);
        }
        let total = self.timeline.total_ticks();
        let last = total.saturating_sub(1);
        self.state.current_tick = if self.state.reversing {
            self.state.current_tick.saturating_sub(1)
        } else {
            self.state.current_tick.saturating_add(1).min(last)
        };
        self.apply_current(ctx);
        let terminal = if self.state.reversing {
            self.state.current_tick == 0
        } else {
            self.state.current_tick >= last
        };
        if terminal {
            self.finish(link, ctx)
        } else {
            FireOutcome::default()
        }
    }

    /// Cancel a run without toggling `raised` or forwarding.
    pub(crate) fn stop(&mut self) -> bool {
        let was_running = self.state.running;
        self.state.running = false;
        self.actor = None;
        was_running
    }

    fn finish(&mut self, link: Option<NodeId>, ctx: &mut FireContext<'_>) -> FireOutcome {
        self.state.running = false;
        if self.reversable {
            self.state.raised = !self.state.raised;
        }
        if self.seesaw && !self.state.reversing {
            let total = self.timeline.total_ticks();
            self.state.reversing = true;
            self.state.current_tick = total.saturating_sub(1);
            debug!(node = %ctx.node, "seesaw return");
            self.apply_current(ctx);
            if total <= 1 {
                return self.finish(link, ctx);
            }
            self.state.running = true;
            return FireOutcome::timer(TimerCommand::Start(self.interval()));
        }
        info!(node = %ctx.node, raised = self.state.raised, "motion finished");
        let actor = self.actor.take();
        FireOutcome {
            next: link.zip(actor),
            reset: None,
            timer: Some(TimerCommand::Cancel),
        }
    }

    fn apply_current(&self, ctx: &mut FireContext<'_>) {
        let Some(frame) = self.timeline.frame_at(self.state.current_tick) else {
            return;
        };
        let Some(target) = self.target else {
            return;
        };
        let targets = ctx
            .host
            .group_members(target)
            .unwrap_or_else(|| vec![target]);
        for entity in targets {
            match apply_frame(&mut *ctx.host, entity, frame, self.state.reversing) {
                Ok(true) => {
                    debug!(
                        node = %ctx.node,
                        %entity,
                        tick = self.state.current_tick,
                        property = %frame.property,
                        "frame applied"
                    );
                    if let Some(sound) = frame.sound_id {
                        ctx.host.play_sound(entity, sound);
                    }
                }
                Ok(false) => debug!(node = %ctx.node, %entity, "target gone, frame skipped"),
                Err(err) => {
                    ctx.diagnostics
                        .report(Some(ctx.node), format!("entity {entity}: {err}"));
                }
            }
        }
    }
}

/// Apply one frame to one entity. Returns `Ok(false)` if the entity is gone.
fn apply_frame(
    host: &mut dyn Host,
    entity: EntityId,
    frame: &MotionFrame,
    reversing: bool,
) -> Result<bool, PropError> {
    let Some(target) = host.entity_mut(entity) else {
        return Ok(false);
    };
    let name = frame.property.as_str();
    let mismatch = || PropError::TypeMismatch {
        name: name.to_owned(),
        raw: frame.value.clone(),
    };
    let current = target.get_prop(name)?;
    let next = match frame.kind {
        MotionKind::Set => current.parse_like(&frame.value).ok_or_else(mismatch)?,
        MotionKind::Inc => {
            let value = current.as_int().ok_or_else(mismatch)?;
            let delta: i64 = frame.value.trim().parse().ok().ok_or_else(mismatch)?;
            let moved = if reversing {
                value.checked_sub(delta)
            } else {
                value.checked_add(delta)
            };
            PropValue::Int(moved.ok_or_else(|| PropError::Overflow {
                name: name.to_owned(),
            })?)
        }
        MotionKind::Toggle => PropValue::Bool(!current.as_bool().ok_or_else(mismatch)?),
        MotionKind::Flip => {
            let (a, b) = frame.value.split_once('|').ok_or_else(mismatch)?;
            let a = current.parse_like(a).ok_or_else(mismatch)?;
            let b = current.parse_like(b).ok_or_else(mismatch)?;
            if current == a { b } else { a }
        }
    };
    target.set_prop(name, next)?;
    Ok(true)
}

fn encode_frame(frame: &MotionFrame, w: &mut SaveWriter) -> Result<(), CodecError> {
    w.write_tag(frame.kind.tag())?;
    w.put(&frame.property)?;
    w.put(&frame.value)?;
    w.put(&frame.sound_id)?;
    w.put(&frame.repeats)
}

fn decode_frame(r: &mut SaveReader<'_>) -> Result<MotionFrame, CodecError> {
    let kind = decode_tag("motion kind", r.read_tag()?, MotionKind::from_tag)?;
    Ok(MotionFrame {
        kind,
        property: r.get()?,
        value: r.get()?,
        sound_id: r.get()?,
        repeats: r.get()?,
    })
}

// Layout v2: seesaw | reversable | timeline | target | interval_ms | state | actor
// Layout v1:          reversable | timeline | target | interval_ms | state | actor
// Layout v0:                       timeline | target | interval_ms | state | actor
impl Persist for MotionController {
    const NAME: &'static str = "motion controller";
    const VERSION: u32 = 2;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.seesaw)?;
        w.put(&self.reversable)?;
        w.put(&u32::try_from(self.timeline.slots().len()).unwrap_or(u32::MAX))?;
        for slot in self.timeline.slots() {
            w.put(&slot.is_some())?;
            if let Some(frame) = slot {
                encode_frame(frame, w)?;
            }
        }
        w.write_entity(self.target)?;
        w.put(&self.interval_ms)?;
        w.put(&self.state.raised)?;
        w.put(&self.state.reversing)?;
        w.put(&self.state.current_tick)?;
        w.put(&self.state.running)?;
        w.put(&self.actor.is_some())?;
        if let Some(actor) = self.actor {
            w.write_actor(actor)?;
        }
        Ok(())
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut seesaw = false;
        let mut reversable = false;
        if version >= 2 {
            seesaw = r.get()?;
        }
        if version >= 1 {
            reversable = r.get()?;
        }
        let slot_count: u32 = r.get()?;
        let mut slots = Vec::new();
        for _ in 0..slot_count {
            let present: bool = r.get()?;
            slots.push(if present { Some(decode_frame(r)?) } else { None });
        }
        let timeline = Timeline::new(slots).map_err(|err| CodecError::Invalid {
            component: Self::NAME,
            reason: err.to_string(),
        })?;
        let target = r.read_entity()?;
        let interval_ms: u64 = r.get()?;
        let state = MotionState {
            raised: r.get()?,
            reversing: r.get()?,
            current_tick: r.get()?,
            running: r.get()?,
        };
        let has_actor: bool = r.get()?;
        let actor = if has_actor { Some(r.read_actor()?) } else { None };
        Ok(Self {
            timeline,
            target,
            interval_ms,
            reversable,
            seesaw,
            state,
            actor,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::{StubEntity, StubHost};

    fn entity() -> StubEntity {
        StubEntity::with_props([
            ("z".to_owned(), PropValue::Int(10)),
            ("open".to_owned(), PropValue::Bool(false)),
            ("hue".to_owned(), PropValue::Int(3)),
        ])
    }

    #[test]
    fn frame_kinds_mutate_properties() {
        let mut host = StubHost::new();
        let id = host.add_entity(entity());

        let inc = MotionFrame::new(MotionKind::Inc, "z", "5", 1);
        assert!(apply_frame(&mut host, id, &inc, false).unwrap());
        assert_eq!(host.entity(id).unwrap().int("z"), Some(15));
        apply_frame(&mut host, id, &inc, true).unwrap();
        assert_eq!(host.entity(id).unwrap().int("z"), Some(10));

        let toggle = MotionFrame::new(MotionKind::Toggle, "open", "", 1);
        apply_frame(&mut host, id, &toggle, false).unwrap();
        assert_eq!(host.entity(id).unwrap().flag("open"), Some(true));

        let flip = MotionFrame::new(MotionKind::Flip, "hue", "3|7", 1);
        apply_frame(&mut host, id, &flip, false).unwrap();
        assert_eq!(host.entity(id).unwrap().int("hue"), Some(7));
        apply_frame(&mut host, id, &flip, false).unwrap();
        assert_eq!(host.entity(id).unwrap().int("hue"), Some(3));

        let set = MotionFrame::new(MotionKind::Set, "z", "-2", 1);
        apply_frame(&mut host, id, &set, false).unwrap();
        assert_eq!(host.entity(id).unwrap().int("z"), Some(-2));
    }

    #[test]
    fn bad_frames_report_errors() {
        let mut host = StubHost::new();
        let id = host.add_entity(entity());
        let toggle_int = MotionFrame::new(MotionKind::Toggle, "z", "", 1);
        assert!(matches!(
            apply_frame(&mut host, id, &toggle_int, false),
            Err(PropError::TypeMismatch { .. })
        ));
        let unknown = MotionFrame::new(MotionKind::Set, "colour", "1", 1);
        assert!(matches!(
            apply_frame(&mut host, id, &unknown, false),
            Err(PropError::Unknown { .. })
        ));
        let overflow = MotionFrame::new(MotionKind::Inc, "z", &i64::MAX.to_string(), 1);
        assert!(matches!(
            apply_frame(&mut host, id, &overflow, false),
            Err(PropError::Overflow { .. })
        ));
    }

    #[test]
    fn deleted_target_is_skipped() {
        let mut host = StubHost::new();
        let id = host.add_entity(entity());
        host.delete_entity(id);
        let inc = MotionFrame::new(MotionKind::Inc, "z", "1", 1);
        assert!(!apply_frame(&mut host, id, &inc, false).unwrap());
    }

    #[test]
    fn interval_has_a_floor() {
        let controller = MotionController::new(Timeline::default(), None, 0);
        assert_eq!(controller.interval(), TimeDelta::milliseconds(1));
        assert!(controller.config_issue().is_some());
    }

    #[test]
    fn persists_running_state() {
        let frame = MotionFrame::new(MotionKind::Inc, "z", "1", 2).with_sound(9);
        let mut controller = MotionController::new(
            Timeline::new(vec![None, Some(frame)]).unwrap(),
            Some(EntityId::new()),
            250,
        )
        .reversable(true)
        .seesaw(true);
        controller.state = MotionState {
            raised: true,
            reversing: true,
            current_tick: 1,
            running: true,
        };
        controller.actor = Some(ActorId::new());

        let mut w = SaveWriter::new();
        controller.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        let decoded = MotionController::decode(&mut SaveReader::new(&bytes)).unwrap();
        assert_eq!(decoded, controller);
    }
}
