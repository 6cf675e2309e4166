//! Integration tests for timed motion sequences.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::TimeDelta;
use tripwire_core::nodes::{MotionController, MotionState, StateController};
use tripwire_core::{
    ManualClock, Node, NodeBody, NodeHeader, SeededRandom, StubEntity, StubHost, World,
};
use tripwire_types::{
    ActorId, EntityId, MotionFrame, MotionKind, NodeId, PropValue, ScopePolicy, Timeline,
};

struct Stage {
    clock: ManualClock,
    world: World<StubHost>,
    hero: ActorId,
    door: EntityId,
    done: NodeId,
}

fn stage() -> Stage {
    let mut host = StubHost::new();
    let hero = host.add_actor(None);
    let door = host.add_entity(StubEntity::with_props([
        ("z".to_owned(), PropValue::Int(0)),
        ("open".to_owned(), PropValue::Bool(false)),
        ("angle".to_owned(), PropValue::Int(0)),
    ]));
    let clock = ManualClock::at_epoch();
    let mut world = World::new(clock.clone(), SeededRandom::new(1), host);
    let done = world.insert(Node::new(
        NodeHeader::named("done"),
        StateController::new(TimeDelta::seconds(600), ScopePolicy::PerActor),
    ));
    Stage {
        clock,
        world,
        hero,
        door,
        done,
    }
}

fn inc(value: &str, repeats: u32) -> MotionFrame {
    MotionFrame::new(MotionKind::Inc, "z", value, repeats)
}

impl Stage {
    fn motion(
        &mut self,
        frames: Vec<MotionFrame>,
        configure: fn(MotionController) -> MotionController,
    ) -> NodeId {
        let timeline = Timeline::from_frames(frames).unwrap();
        let controller = configure(MotionController::new(timeline, Some(self.door), 1000));
        self.world.insert(Node::new(
            NodeHeader::named("door").with_link(self.done),
            controller,
        ))
    }

    fn z(&self) -> i64 {
        self.world.host().entity(self.door).unwrap().int("z").unwrap()
    }

    fn state(&self, node: NodeId) -> MotionState {
        match &self.world.node(node).unwrap().body {
            NodeBody::MotionController(m) => m.state(),
            other => panic!("not a motion controller: {other:?}"),
        }
    }

    fn step(&mut self, millis: i64) -> usize {
        self.clock.advance_millis(millis);
        self.world.pump()
    }

    fn finished(&self) -> bool {
        self.world.has_record(self.done, self.hero)
    }
}

#[test]
fn timeline_counts_zero_repeat_frames_as_nothing() {
    let timeline = Timeline::from_frames(vec![inc("1", 2), inc("1", 0), inc("1", 3)]).unwrap();
    assert_eq!(timeline.total_ticks(), 5);
}

#[test]
fn six_tick_run_forwards_once_at_the_end() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 2), inc("10", 1), inc("100", 3)], |m| m);

    assert!(s.world.fire(door, s.hero));
    assert_eq!(s.z(), 1);
    assert!(s.world.timer(door).is_some());

    assert_eq!(s.step(1000), 1);
    assert_eq!(s.z(), 2);
    assert_eq!(s.step(1000), 1);
    assert_eq!(s.z(), 12);
    assert_eq!(s.step(2000), 2);
    assert_eq!(s.z(), 212);
    assert!(!s.finished());

    assert_eq!(s.step(1000), 1);
    assert_eq!(s.z(), 312);
    assert!(s.finished());
    assert!(s.world.timer(door).is_none());
    assert_eq!(s.step(5000), 0);
    assert_eq!(s.z(), 312);
}

#[test]
fn late_pump_catches_up() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 2), inc("10", 1), inc("100", 3)], |m| m);
    s.world.fire(door, s.hero);
    assert_eq!(s.step(60_000), 5);
    assert_eq!(s.z(), 312);
    assert!(s.finished());
}

#[test]
fn running_motion_ignores_activation() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 3)], |m| m);
    assert!(s.world.fire(door, s.hero));
    assert!(!s.world.can_fire(door, s.hero));
    assert!(!s.world.fire(door, s.hero));
    assert_eq!(s.z(), 1);
    assert!(s.world.diagnostics().is_empty());
}

#[test]
fn reversable_motion_alternates_direction() {
    let mut s = stage();
    let door = s.motion(vec![inc("5", 2)], |m| m.reversable(true));

    s.world.fire(door, s.hero);
    s.step(1000);
    assert_eq!(s.z(), 10);
    assert!(s.state(door).raised);

    s.world.fire(door, s.hero);
    assert!(s.state(door).reversing);
    assert_eq!(s.z(), 5);
    s.step(1000);
    assert_eq!(s.z(), 0);
    assert!(!s.state(door).raised);
}

#[test]
fn seesaw_returns_before_forwarding() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 3)], |m| m.reversable(true).seesaw(true));
    let before = s.state(door).raised;

    s.world.fire(door, s.hero);
    assert_eq!(s.step(2000), 2);
    assert_eq!(s.z(), 2);
    assert!(s.state(door).running);
    assert!(!s.finished());

    assert_eq!(s.step(2000), 2);
    assert_eq!(s.z(), 0);
    assert_eq!(s.state(door).raised, before);
    assert!(s.finished());
}

#[test]
fn single_tick_motion_finishes_immediately() {
    let mut s = stage();
    let frame = MotionFrame::new(MotionKind::Toggle, "open", "", 1).with_sound(7);
    let door = s.motion(vec![frame], |m| m);

    s.world.fire(door, s.hero);
    assert!(s.finished());
    assert!(s.world.timer(door).is_none());
    let entity = s.world.host().entity(s.door).unwrap();
    assert_eq!(entity.flag("open"), Some(true));
    assert_eq!(s.world.host().sounds(), &[(s.door, 7)]);
}

#[test]
fn flip_swaps_between_two_values() {
    let mut s = stage();
    let door = s.motion(vec![MotionFrame::new(MotionKind::Flip, "angle", "0|90", 1)], |m| m);
    s.world.fire(door, s.hero);
    assert_eq!(s.world.host().entity(s.door).unwrap().int("angle"), Some(90));
    s.world.fire(door, s.hero);
    assert_eq!(s.world.host().entity(s.door).unwrap().int("angle"), Some(0));
}

#[test]
fn group_target_moves_every_member() {
    let mut s = stage();
    let other = s
        .world
        .host_mut()
        .add_entity(StubEntity::with_props([("open".to_owned(), PropValue::Bool(false))]));
    let door = s.door;
    let group = s.world.host_mut().add_group(vec![door, other]);
    let timeline =
        Timeline::from_frames(vec![MotionFrame::new(MotionKind::Set, "open", "true", 1)]).unwrap();
    let gates = s.world.insert(Node::new(
        NodeHeader::named("gates"),
        MotionController::new(timeline, Some(group), 500),
    ));

    s.world.fire(gates, s.hero);
    for entity in [door, other] {
        assert_eq!(s.world.host().entity(entity).unwrap().flag("open"), Some(true));
    }
}

#[test]
fn read_only_property_is_diagnosed() {
    let mut s = stage();
    let mut sealed = StubEntity::with_props([("z".to_owned(), PropValue::Int(0))]);
    sealed.read_only.insert("z".to_owned());
    let sealed = s.world.host_mut().add_entity(sealed);
    let timeline = Timeline::from_frames(vec![inc("1", 1)]).unwrap();
    let node = s.world.insert(Node::new(
        NodeHeader::named("sealed"),
        MotionController::new(timeline, Some(sealed), 500),
    ));

    assert!(s.world.fire(node, s.hero));
    assert_eq!(s.world.host().entity(sealed).unwrap().int("z"), Some(0));
    assert!(s.world.diagnostics().iter().any(|d| d.node == Some(node)));
}

#[test]
fn stop_cancels_without_forwarding() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 4)], |m| m.reversable(true));
    s.world.fire(door, s.hero);
    s.step(1000);

    assert!(s.world.stop_motion(door).unwrap());
    assert!(s.world.timer(door).is_none());
    assert_eq!(s.step(5000), 0);
    assert_eq!(s.z(), 2);
    assert!(!s.state(door).raised);
    assert!(!s.finished());
    assert!(!s.world.stop_motion(door).unwrap());
    assert!(s.world.stop_motion(s.done).is_err());
}

#[test]
fn removing_a_running_motion_cancels_its_timer() {
    let mut s = stage();
    let door = s.motion(vec![inc("1", 4)], |m| m);
    s.world.fire(door, s.hero);
    s.world.remove(door).unwrap();
    assert!(s.world.timer(door).is_none());
    assert_eq!(s.step(5000), 0);
    assert_eq!(s.z(), 1);
}

#[test]
fn motion_without_target_fails_closed() {
    let mut s = stage();
    let timeline = Timeline::from_frames(vec![inc("1", 2)]).unwrap();
    let node = s.world.insert(Node::new(
        NodeHeader::named("nowhere"),
        MotionController::new(timeline, None, 500),
    ));
    assert!(!s.world.fire(node, s.hero));
    assert_eq!(s.world.validate(), 1);
}
