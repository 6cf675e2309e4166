//! Integration tests for world saves and blueprint-built worlds.

#![allow(clippy::unwrap_used)]

use chrono::TimeDelta;
use tripwire_core::nodes::{MotionController, StateController, TallyCounter};
use tripwire_core::{
    Blueprint, BuildDefaults, Clock, ManualClock, Node, NodeHeader, SandboxConfig, SeededRandom,
    StubEntity, StubHost, World,
};
use tripwire_types::{MotionFrame, MotionKind, PropValue, RollRange, ScopePolicy, Timeline};

#[test]
fn running_motion_resumes_after_load() {
    let mut host = StubHost::new();
    let hero = host.add_actor(None);
    let lift = host.add_entity(StubEntity::with_props([("z".to_owned(), PropValue::Int(0))]));
    let clock = ManualClock::at_epoch();
    let mut world = World::new(clock.clone(), SeededRandom::new(5), host);
    let done = world.insert(Node::new(
        NodeHeader::named("done"),
        StateController::new(TimeDelta::seconds(60), ScopePolicy::PerActor),
    ));
    let timeline =
        Timeline::from_frames(vec![MotionFrame::new(MotionKind::Inc, "z", "1", 3)]).unwrap();
    let motion = world.insert(Node::new(
        NodeHeader::named("lift").with_link(done),
        MotionController::new(timeline, Some(lift), 1000),
    ));

    world.fire(motion, hero);
    clock.advance_millis(1000);
    world.pump();
    let bytes = world.to_bytes().unwrap();

    let resumed_clock = ManualClock::new(clock.now());
    let mut loaded = World::from_bytes(
        &bytes,
        resumed_clock.clone(),
        SeededRandom::new(5),
        world.host().clone(),
    )
    .unwrap();
    assert!(loaded.timer(motion).is_some());
    assert!(!loaded.has_record(done, hero));

    resumed_clock.advance_millis(1000);
    assert_eq!(loaded.pump(), 1);
    assert_eq!(loaded.host().entity(lift).unwrap().int("z"), Some(3));
    assert!(loaded.has_record(done, hero));
}

#[test]
fn memory_and_tallies_survive_a_file_round_trip() {
    let mut host = StubHost::new();
    let hero = host.add_actor(None);
    let clock = ManualClock::at_epoch();
    let mut world = World::new(clock.clone(), SeededRandom::new(5), host);
    let state = world.insert(Node::new(
        NodeHeader::named("seen"),
        StateController::new(TimeDelta::seconds(30), ScopePolicy::PerActor),
    ));
    let tally = world.insert(Node::new(
        NodeHeader::named("tally"),
        TallyCounter::new(RollRange::fixed(4), TimeDelta::seconds(30), ScopePolicy::PerActor),
    ));
    world.fire(state, hero);
    world.fire(tally, hero);
    world.fire(tally, hero);

    let path = std::env::temp_dir().join(format!("tripwire-{}.trip", uuid::Uuid::new_v4()));
    world.save_to_file(&path).unwrap();
    let loaded =
        World::load_from_file(&path, clock.clone(), SeededRandom::new(5), world.host().clone())
            .unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(loaded.has_record(state, hero));
    assert_eq!(loaded.measure(tally, hero, None), Some(8));
    assert_eq!(loaded.node(tally).unwrap().header.name, "tally");

    clock.advance_millis(30_000);
    assert!(!loaded.has_record(state, hero));
}

#[test]
fn blueprint_world_runs_end_to_end() {
    let sandbox: SandboxConfig = serde_yml::from_str(
        r"
actors:
  - { name: hero, region: yard }
entities:
  - name: bell
    props: { rung: false }
",
    )
    .unwrap();
    let blueprint: Blueprint = serde_yml::from_str(
        r"
nodes:
  - name: kills
    kind: kill_monitor
    tracked: [rat]
    link: check
  - name: check
    kind: threshold_messages
    source: kills
    counter_key: rat
    comparison: ge
    compare_value: 3
    thresholds:
      - { value: 1, message: 'a start' }
      - { value: 3, message: 'pest control' }
    link: ring
  - name: ring
    kind: motion_controller
    target: bell
    frames:
      - { kind: toggle, property: rung }
",
    )
    .unwrap();

    let sandbox = sandbox.build().unwrap();
    let hero = sandbox.actor("hero").unwrap();
    let bell = sandbox.entity("bell").unwrap();
    let mut world = World::new(
        ManualClock::at_epoch(),
        SeededRandom::new(1),
        sandbox.host.clone(),
    );
    let ids = blueprint
        .build(&mut world, &BuildDefaults::default(), &sandbox.entities)
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert!(world.diagnostics().is_empty());

    for _ in 0..3 {
        world.report_kill(hero, "rat");
    }
    assert_eq!(world.host().messages_for(hero), vec!["a start", "pest control"]);
    assert_eq!(world.host().entity(bell).unwrap().flag("rung"), Some(true));
}
