//! Declarative trigger graphs and the sandbox they run against.
//!
//! A [`Blueprint`] lists nodes that refer to each other, to sandbox
//! entities and to sandbox actors by name. [`Blueprint::build`] inserts the
//! nodes into a world in two passes (create every node, then wire links,
//! else-links and sources), so declaration order does not matter.
//!
//! A [`SandboxConfig`] describes the actors, entities and groups of a
//! [`StubHost`] so a blueprint can be exercised without a real game.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use serde::Deserialize;
use tracing::info;
use tripwire_types::{
    ActorId, Comparison, EntityId, MotionFrame, NodeId, PropValue, RollRange, ScheduleWindow,
    ScopePolicy, ThresholdEntry, ThresholdSpec, Timeline,
};

use crate::error::GraphError;
use crate::host::{Host, StubEntity, StubHost};
use crate::nodes::{
    EventSchedule, KillMonitor, MotionController, Node, NodeBody, NodeHeader, Relay,
    StateController, TallyCounter, Threshold, ThresholdBranch, ThresholdMessages,
};
use crate::world::World;

// ---------------------------------------------------------------------------
// Node definitions
// ---------------------------------------------------------------------------

/// A node graph plus the stimuli the engine binary replays against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Blueprint {
    /// Node definitions.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    /// Scripted activations.
    #[serde(default)]
    pub stimuli: Vec<StimulusSpec>,
}

/// One node definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeSpec {
    /// Unique authoring name.
    pub name: String,

    /// Event gate.
    #[serde(default)]
    pub event: Option<String>,

    /// Name of the next node.
    #[serde(default)]
    pub link: Option<String>,

    /// Kind and kind-specific settings.
    #[serde(flatten)]
    pub kind: NodeSpecKind,
}

/// Kind-specific node settings, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpecKind {
    /// Pass-through.
    Relay,

    /// Owner of the node's event name.
    EventSchedule {
        /// When the event is active.
        #[serde(default)]
        window: ScheduleWindow,
    },

    /// Per-actor TTL state.
    StateController {
        /// Record lifetime; the memory default when unset.
        #[serde(default)]
        ttl_secs: Option<u64>,
        /// Scope policy.
        #[serde(default)]
        scope: ScopePolicy,
        /// Region actors must stay in.
        #[serde(default)]
        presence_region: Option<String>,
    },

    /// Random-roll tally.
    TallyCounter {
        /// Roll per firing.
        #[serde(default)]
        increment: RollRange,
        /// Tally lifetime; the memory default when unset.
        #[serde(default)]
        ttl_secs: Option<u64>,
        /// One shared, non-expiring tally.
        #[serde(default)]
        global: bool,
        /// Scope policy.
        #[serde(default)]
        scope: ScopePolicy,
    },

    /// Kill tally.
    KillMonitor {
        /// Victim kinds to count; all kinds when empty.
        #[serde(default)]
        tracked: Vec<String>,
        /// Roll per kill.
        #[serde(default)]
        increment: RollRange,
        /// Counter lifetime; the memory default when unset.
        #[serde(default)]
        ttl_secs: Option<u64>,
        /// Scope policy.
        #[serde(default)]
        scope: ScopePolicy,
    },

    /// Binary threshold branch.
    ThresholdBranch {
        /// Shared evaluator settings.
        #[serde(flatten)]
        threshold: ThresholdSettings,
    },

    /// Threshold message table.
    ThresholdMessages {
        /// Shared evaluator settings.
        #[serde(flatten)]
        threshold: ThresholdSettings,
        /// Message table.
        #[serde(default)]
        thresholds: Vec<ThresholdEntry>,
        /// Debounce lifetime; the memory default when unset.
        #[serde(default)]
        debounce_secs: Option<u64>,
    },

    /// Motion controller.
    MotionController {
        /// Sandbox entity or group name.
        #[serde(default)]
        target: Option<String>,
        /// Milliseconds between ticks.
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        /// Alternate direction between runs.
        #[serde(default)]
        reversable: bool,
        /// Run back down after a forward run.
        #[serde(default)]
        seesaw: bool,
        /// Up to six frame slots; `null` leaves a slot empty.
        #[serde(default)]
        frames: Vec<Option<MotionFrame>>,
    },
}

/// Settings shared by both threshold kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ThresholdSettings {
    /// Name of the memory node to measure.
    #[serde(default)]
    pub source: Option<String>,
    /// Comparison operator.
    #[serde(default)]
    pub comparison: Comparison,
    /// Operand for the branch decision.
    #[serde(default)]
    pub compare_value: i64,
    /// Counter read on kill-monitor sources.
    #[serde(default)]
    pub counter_key: Option<String>,
    /// Clear the source record after a successful decision.
    #[serde(default)]
    pub reset_on_success: bool,
    /// Name of the node taken when the decision fails.
    #[serde(default, rename = "else")]
    pub else_link: Option<String>,
}

const fn default_interval_ms() -> u64 {
    1000
}

/// Values applied where a node definition leaves a setting unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildDefaults {
    /// Memory lifetime.
    pub ttl: TimeDelta,
    /// Message debounce lifetime.
    pub debounce: TimeDelta,
    /// Offset given to daily windows that do not set their own.
    pub utc_offset_minutes: i32,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::seconds(60),
            debounce: TimeDelta::seconds(300),
            utc_offset_minutes: 0,
        }
    }
}

fn secs_or(secs: Option<u64>, fallback: TimeDelta) -> TimeDelta {
    secs.and_then(|s| i64::try_from(s).ok())
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(fallback)
}

// ---------------------------------------------------------------------------
// Stimuli
// ---------------------------------------------------------------------------

/// A scripted activation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StimulusSpec {
    /// Runner tick at which to apply the stimulus.
    pub at_tick: u64,
    /// Sandbox actor name.
    pub actor: String,
    /// What happens.
    #[serde(flatten)]
    pub action: StimulusAction,
}

/// What a stimulus does, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StimulusAction {
    /// Fire a node.
    Fire {
        /// Node name.
        node: String,
    },
    /// Report a kill.
    Kill {
        /// Victim kind.
        victim: String,
    },
    /// Move the actor to another region.
    Move {
        /// Destination region; `None` leaves every region.
        #[serde(default)]
        region: Option<String>,
    },
}

/// A stimulus with every name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stimulus {
    /// Runner tick at which to apply it.
    pub at_tick: u64,
    /// The actor.
    pub actor: ActorId,
    /// What happens.
    pub action: Action,
}

/// Resolved stimulus action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fire this node.
    Fire(NodeId),
    /// Report a kill of this victim kind.
    Kill(String),
    /// Move the actor.
    Move(Option<String>),
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// Actors, entities and groups for a [`StubHost`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SandboxConfig {
    /// Actors.
    #[serde(default)]
    pub actors: Vec<SandboxActor>,
    /// Entities.
    #[serde(default)]
    pub entities: Vec<SandboxEntity>,
    /// Groups of entities.
    #[serde(default)]
    pub groups: Vec<SandboxGroup>,
}

/// A sandbox actor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxActor {
    /// Name stimuli refer to.
    pub name: String,
    /// Starting region.
    #[serde(default)]
    pub region: Option<String>,
}

/// A sandbox entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxEntity {
    /// Name motion controllers refer to.
    pub name: String,
    /// Initial property values.
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
    /// Properties motion frames may not write.
    #[serde(default)]
    pub read_only: Vec<String>,
}

/// A sandbox group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxGroup {
    /// Name motion controllers refer to.
    pub name: String,
    /// Member entity names.
    #[serde(default)]
    pub members: Vec<String>,
}

/// A populated [`StubHost`] and the ids behind sandbox names.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    /// The host.
    pub host: StubHost,
    /// Actor ids by name.
    pub actors: BTreeMap<String, ActorId>,
    /// Entity and group ids by name.
    pub entities: BTreeMap<String, EntityId>,
}

impl SandboxConfig {
    /// Populate a [`StubHost`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownReference`] when a group lists an
    /// undeclared entity.
    pub fn build(&self) -> Result<Sandbox, GraphError> {
        let mut sandbox = Sandbox::default();
        for actor in &self.actors {
            let id = sandbox.host.add_actor(actor.region.as_deref());
            sandbox.actors.insert(actor.name.clone(), id);
        }
        for entity in &self.entities {
            let mut stub = StubEntity::with_props(entity.props.clone());
            stub.read_only = entity.read_only.iter().cloned().collect();
            let id = sandbox.host.add_entity(stub);
            sandbox.entities.insert(entity.name.clone(), id);
        }
        for group in &self.groups {
            let members = group
                .members
                .iter()
                .map(|name| sandbox.entity(name))
                .collect::<Result<Vec<_>, _>>()?;
            let id = sandbox.host.add_group(members);
            sandbox.entities.insert(group.name.clone(), id);
        }
        Ok(sandbox)
    }
}

impl Sandbox {
    /// Id of a named entity or group.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownReference`] for unknown names.
    pub fn entity(&self, name: &str) -> Result<EntityId, GraphError> {
        self.entities
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownReference {
                what: "entity",
                name: name.to_owned(),
            })
    }

    /// Id of a named actor.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownReference`] for unknown names.
    pub fn actor(&self, name: &str) -> Result<ActorId, GraphError> {
        self.actors
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownReference {
                what: "actor",
                name: name.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

impl Blueprint {
    /// Insert every node into `world` and wire them together.
    ///
    /// Returns node ids by name. After wiring, the world is checked for
    /// cycles and misconfigured nodes; both only produce diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNodeName`],
    /// [`GraphError::UnknownNodeName`], [`GraphError::UnknownReference`] or
    /// [`GraphError::InvalidNode`]. Nodes inserted before the error stay in
    /// the world.
    pub fn build<H: Host>(
        &self,
        world: &mut World<H>,
        defaults: &BuildDefaults,
        entities: &BTreeMap<String, EntityId>,
    ) -> Result<BTreeMap<String, NodeId>, GraphError> {
        let mut ids = BTreeMap::new();
        for spec in &self.nodes {
            if ids.contains_key(&spec.name) {
                return Err(GraphError::DuplicateNodeName(spec.name.clone()));
            }
            let node = spec.to_node(defaults, entities)?;
            ids.insert(spec.name.clone(), world.insert(node));
        }

        let resolve = |name: Option<&String>, owner: &str| -> Result<Option<NodeId>, GraphError> {
            name.map(|n| {
                    ids.get(n).copied().ok_or_else(|| GraphError::UnknownNodeName {
                        name: n.clone(),
                        referenced_by: owner.to_owned(),
                    })
                })
                .transpose()
        };
        for spec in &self.nodes {
            let Some(&id) = ids.get(&spec.name) else {
                continue;
            };
            world.set_link(id, resolve(spec.link.as_ref(), &spec.name)?)?;
            if let Some(settings) = spec.kind.threshold_settings() {
                world.set_else(id, resolve(settings.else_link.as_ref(), &spec.name)?)?;
                world.set_source(id, resolve(settings.source.as_ref(), &spec.name)?)?;
            }
        }

        let cycles = world.find_cycles().len();
        let misconfigured = world.validate();
        info!(nodes = ids.len(), cycles, misconfigured, "blueprint built");
        Ok(ids)
    }

    /// Resolve scripted stimuli against built node ids and a sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownReference`] for unknown actors and
    /// [`GraphError::UnknownNodeName`] for unknown nodes.
    pub fn stimuli(
        &self,
        nodes: &BTreeMap<String, NodeId>,
        sandbox: &Sandbox,
    ) -> Result<Vec<Stimulus>, GraphError> {
        let mut stimuli = self
            .stimuli
            .iter()
            .map(|spec| {
                let actor = sandbox.actor(&spec.actor)?;
                let action = match &spec.action {
                    StimulusAction::Fire { node } => {
                        Action::Fire(nodes.get(node).copied().ok_or_else(|| {
                            GraphError::UnknownNodeName {
                                name: node.clone(),
                                referenced_by: format!("stimulus at tick {}", spec.at_tick),
                            }
                        })?)
                    }
                    StimulusAction::Kill { victim } => Action::Kill(victim.clone()),
                    StimulusAction::Move { region } => Action::Move(region.clone()),
                };
                Ok(Stimulus {
                    at_tick: spec.at_tick,
                    actor,
                    action,
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;
        stimuli.sort_by_key(|s| s.at_tick);
        Ok(stimuli)
    }
}

impl NodeSpecKind {
    const fn threshold_settings(&self) -> Option<&ThresholdSettings> {
        match self {
            Self::ThresholdBranch { threshold } | Self::ThresholdMessages { threshold, .. } => {
                Some(threshold)
            }
            _ => None,
        }
    }
}

impl NodeSpec {
    /// Build the unwired node. Links, else-links and sources are set later.
    fn to_node(
        &self,
        defaults: &BuildDefaults,
        entities: &BTreeMap<String, EntityId>,
    ) -> Result<Node, GraphError> {
        let header = NodeHeader {
            name: self.name.clone(),
            event_name: self.event.clone(),
            link: None,
        };
        let invalid = |reason: String| GraphError::InvalidNode {
            name: self.name.clone(),
            reason,
        };
        let body: NodeBody = match &self.kind {
            NodeSpecKind::Relay => Relay.into(),
            NodeSpecKind::EventSchedule { window } => {
                EventSchedule::new(localize(window, defaults.utc_offset_minutes)).into()
            }
            NodeSpecKind::StateController {
                ttl_secs,
                scope,
                presence_region,
            } => StateController::new(secs_or(*ttl_secs, defaults.ttl), *scope)
                .with_presence_region(presence_region.clone())
                .into(),
            NodeSpecKind::TallyCounter {
                increment,
                ttl_secs,
                global,
                scope,
            } => {
                let tally = TallyCounter::new(*increment, secs_or(*ttl_secs, defaults.ttl), *scope);
                let tally = if *global { tally.global() } else { tally };
                tally.into()
            }
            NodeSpecKind::KillMonitor {
                tracked,
                increment,
                ttl_secs,
                scope,
            } => KillMonitor::new(tracked.iter().cloned(), secs_or(*ttl_secs, defaults.ttl), *scope)
                .with_increment(*increment)
                .into(),
            NodeSpecKind::ThresholdBranch { threshold } => {
                ThresholdBranch::new(unwired(threshold, ThresholdSpec::branch(
                    threshold.comparison,
                    threshold.compare_value,
                )))
                .into()
            }
            NodeSpecKind::ThresholdMessages {
                threshold,
                thresholds,
                debounce_secs,
            } => {
                let spec = ThresholdSpec::new(
                    threshold.comparison,
                    threshold.compare_value,
                    thresholds.clone(),
                )
                .map_err(|err| invalid(err.to_string()))?;
                ThresholdMessages::new(unwired(threshold, spec))
                    .with_debounce(secs_or(*debounce_secs, defaults.debounce))
                    .into()
            }
            NodeSpecKind::MotionController {
                target,
                interval_ms,
                reversable,
                seesaw,
                frames,
            } => {
                let timeline =
                    Timeline::new(frames.clone()).map_err(|err| invalid(err.to_string()))?;
                let target = target
                    .as_ref()
                    .map(|name| {
                        entities
                            .get(name)
                            .copied()
                            .ok_or_else(|| GraphError::UnknownReference {
                                what: "entity",
                                name: name.clone(),
                            })
                    })
                    .transpose()?;
                MotionController::new(timeline, target, *interval_ms)
                    .reversable(*reversable)
                    .seesaw(*seesaw)
                    .into()
            }
        };
        Ok(Node { header, body })
    }
}

/// Threshold core with every node reference left for the wiring pass.
fn unwired(settings: &ThresholdSettings, spec: ThresholdSpec) -> Threshold {
    let mut threshold = Threshold::new(None, spec);
    threshold.counter_key = settings.counter_key.clone();
    threshold.reset_on_success = settings.reset_on_success;
    threshold
}

/// Give a daily window without its own offset the engine-wide one.
fn localize(window: &ScheduleWindow, utc_offset_minutes: i32) -> ScheduleWindow {
    match window {
        ScheduleWindow::Daily {
            start,
            end,
            utc_offset_minutes: 0,
        } => ScheduleWindow::Daily {
            start: *start,
            end: *end,
            utc_offset_minutes,
        },
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::random::SeededRandom;
    use tripwire_types::NodeKind;

    const YAML: &str = r"
nodes:
  - name: check
    kind: threshold_branch
    source: kills
    comparison: ge
    compare_value: 2
    else: grumble
    link: door
  - name: plate
    kind: relay
    link: kills
  - name: kills
    kind: kill_monitor
    tracked: [wolf]
    link: check
  - name: grumble
    kind: relay
  - name: door
    kind: motion_controller
    target: portcullis
    interval_ms: 250
    reversable: true
    frames:
      - { kind: inc, property: z, value: '5', repeats: 2 }
      - null
stimuli:
  - { at_tick: 3, actor: hero, action: kill, victim: wolf }
  - { at_tick: 1, actor: hero, action: fire, node: plate }
";

    fn sandbox() -> Sandbox {
        let yaml = r"
actors:
  - { name: hero, region: gate }
entities:
  - name: portcullis
    props: { z: 0, open: false }
";
        let config: SandboxConfig = serde_yml::from_str(yaml).unwrap();
        config.build().unwrap()
    }

    fn world(host: StubHost) -> World<StubHost> {
        World::new(ManualClock::at_epoch(), SeededRandom::new(3), host)
    }

    #[test]
    fn builds_and_wires_by_name() {
        let blueprint: Blueprint = serde_yml::from_str(YAML).unwrap();
        let sandbox = sandbox();
        let mut world = world(sandbox.host.clone());
        let ids = blueprint
            .build(&mut world, &BuildDefaults::default(), &sandbox.entities)
            .unwrap();

        let check = world.node(ids["check"]).unwrap();
        assert_eq!(check.kind(), NodeKind::ThresholdBranch);
        assert_eq!(check.header.link, Some(ids["door"]));
        let threshold = check.threshold().unwrap();
        assert_eq!(threshold.source, Some(ids["kills"]));
        assert_eq!(threshold.else_link, Some(ids["grumble"]));
        assert_eq!(world.registry().kill_sinks(), vec![ids["kills"]]);
        assert!(world.diagnostics().is_empty());

        let stimuli = blueprint.stimuli(&ids, &sandbox).unwrap();
        assert_eq!(stimuli.first().unwrap().action, Action::Fire(ids["plate"]));
        assert_eq!(stimuli.get(1).unwrap().action, Action::Kill("wolf".to_owned()));
    }

    #[test]
    fn unknown_link_is_an_error() {
        let yaml = "nodes:\n  - { name: a, kind: relay, link: nowhere }\n";
        let blueprint: Blueprint = serde_yml::from_str(yaml).unwrap();
        let mut world = world(StubHost::new());
        let err = blueprint
            .build(&mut world, &BuildDefaults::default(), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNodeName { name, .. } if name == "nowhere"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = "nodes:\n  - { name: a, kind: relay }\n  - { name: a, kind: relay }\n";
        let blueprint: Blueprint = serde_yml::from_str(yaml).unwrap();
        let mut world = world(StubHost::new());
        assert!(matches!(
            blueprint.build(&mut world, &BuildDefaults::default(), &BTreeMap::new()),
            Err(GraphError::DuplicateNodeName(_))
        ));
    }

    #[test]
    fn unknown_motion_target_is_an_error() {
        let yaml = "nodes:\n  - { name: m, kind: motion_controller, target: ghost }\n";
        let blueprint: Blueprint = serde_yml::from_str(yaml).unwrap();
        let mut world = world(StubHost::new());
        assert!(matches!(
            blueprint.build(&mut world, &BuildDefaults::default(), &BTreeMap::new()),
            Err(GraphError::UnknownReference { what: "entity", .. })
        ));
    }

    #[test]
    fn daily_windows_take_engine_offset() {
        let window = ScheduleWindow::Daily {
            start: chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            end: chrono::NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            utc_offset_minutes: 0,
        };
        assert!(matches!(
            localize(&window, 120),
            ScheduleWindow::Daily { utc_offset_minutes: 120, .. }
        ));
    }
}
