//! Trigger nodes.
//!
//! A [`Node`] is a shared [`NodeHeader`] (name, event gate, outgoing link)
//! plus a kind-specific [`NodeBody`]. Nodes never call each other: firing a
//! node returns a [`FireOutcome`] naming the next hop, and the world drives
//! propagation. That keeps every node's mutation self-contained and lets
//! the world hold the only mutable borrow of the arena.
//!
//! # Modules
//!
//! - [`relay`] -- Pass-through trigger source
//! - [`schedule`] -- Event-name owner with a schedule window
//! - [`state`] -- Per-actor TTL state
//! - [`tally`] -- Random-roll tally
//! - [`kill`] -- Kill tally fed by kill reports
//! - [`threshold`] -- Binary branch and message-table evaluators
//! - [`motion`] -- Frame-sequenced motion controller

pub mod kill;
pub mod motion;
pub mod relay;
pub mod schedule;
pub mod state;
pub mod tally;
pub mod threshold;

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tripwire_types::{ActorId, NodeId, NodeKind};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter, decode_tag};
use crate::diagnostic::Diagnostics;
use crate::gate::Registry;
use crate::host::Host;
use crate::memory::ActorMemory;
use crate::random::RandomSource;

pub use kill::KillMonitor;
pub use motion::{MotionController, MotionState};
pub use relay::Relay;
pub use schedule::EventSchedule;
pub use state::StateController;
pub use tally::TallyCounter;
pub use threshold::{Threshold, ThresholdBranch, ThresholdMessages};

// ---------------------------------------------------------------------------
// Contexts and outcomes
// ---------------------------------------------------------------------------

/// Read-only view of a world used to answer "may this node fire?".
pub struct QueryContext<'a> {
    /// Current instant.
    pub now: DateTime<Utc>,
    /// The host world.
    pub host: &'a dyn Host,
    /// Event gates.
    pub registry: &'a Registry,
    /// Every node in the world, for source lookups.
    pub nodes: &'a BTreeMap<NodeId, Node>,
}

/// Everything a node may touch while firing.
pub struct FireContext<'a> {
    /// The node being fired.
    pub node: NodeId,
    /// Logical instant of the firing.
    pub now: DateTime<Utc>,
    /// The host world.
    pub host: &'a mut dyn Host,
    /// Roll source for counters.
    pub rng: &'a mut dyn RandomSource,
    /// Authoring diagnostics sink.
    pub diagnostics: &'a mut Diagnostics,
}

/// What the world should do with a node's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Arm (or re-arm) a periodic timer.
    Start(TimeDelta),
    /// Disarm the timer.
    Cancel,
}

/// Result of firing a node or ticking its timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireOutcome {
    /// Next hop and the actor to fire it for.
    pub next: Option<(NodeId, ActorId)>,
    /// Record to clear on a source node before propagating.
    pub reset: Option<(NodeId, ActorId)>,
    /// Timer change for the fired node.
    pub timer: Option<TimerCommand>,
}

impl FireOutcome {
    /// Forward to `link`, if there is one.
    pub fn forward(link: Option<NodeId>, actor: ActorId) -> Self {
        Self {
            next: link.map(|node| (node, actor)),
            ..Self::default()
        }
    }

    /// Only change the timer.
    pub fn timer(command: TimerCommand) -> Self {
        Self {
            timer: Some(command),
            ..Self::default()
        }
    }
}

/// Clamp a counter into the signed range thresholds compare against.
pub(crate) fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Fields every node carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeHeader {
    /// Authoring name; unique within a blueprint.
    pub name: String,
    /// Event gate consulted before anything else.
    pub event_name: Option<String>,
    /// Next hop on success.
    pub link: Option<NodeId>,
}

impl NodeHeader {
    /// A header with only a name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            event_name: None,
            link: None,
        }
    }

    /// Gate the node on `event`.
    #[must_use]
    pub fn with_event(mut self, event: &str) -> Self {
        self.event_name = Some(event.to_owned());
        self
    }

    /// Link the node to `next`.
    #[must_use]
    pub const fn with_link(mut self, next: NodeId) -> Self {
        self.link = Some(next);
        self
    }
}

// Layout v1: name | event_name | link
// Layout v0:        event_name | link
impl Persist for NodeHeader {
    const NAME: &'static str = "node header";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.name)?;
        w.put(&self.event_name)?;
        w.write_node(self.link)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut name = String::new();
        if version >= 1 {
            name = r.get()?;
        }
        Ok(Self {
            name,
            event_name: r.get()?,
            link: r.read_node()?,
        })
    }
}

/// Kind-specific node state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    /// See [`Relay`].
    Relay(Relay),
    /// See [`EventSchedule`].
    EventSchedule(EventSchedule),
    /// See [`StateController`].
    StateController(StateController),
    /// See [`TallyCounter`].
    TallyCounter(TallyCounter),
    /// See [`KillMonitor`].
    KillMonitor(KillMonitor),
    /// See [`ThresholdBranch`].
    ThresholdBranch(ThresholdBranch),
    /// See [`ThresholdMessages`].
    ThresholdMessages(ThresholdMessages),
    /// See [`MotionController`].
    MotionController(MotionController),
}

macro_rules! body_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for NodeBody {
                fn from(body: $variant) -> Self {
                    Self::$variant(body)
                }
            }
        )*
    };
}

body_from!(
    Relay,
    EventSchedule,
    StateController,
    TallyCounter,
    KillMonitor,
    ThresholdBranch,
    ThresholdMessages,
    MotionController,
);

/// A trigger node: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Shared fields.
    pub header: NodeHeader,
    /// Kind-specific state.
    pub body: NodeBody,
}

impl Node {
    /// Assemble a node.
    pub fn new(header: NodeHeader, body: impl Into<NodeBody>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// The node's kind.
    pub const fn kind(&self) -> NodeKind {
        match &self.body {
            NodeBody::Relay(_) => NodeKind::Relay,
            NodeBody::EventSchedule(_) => NodeKind::EventSchedule,
            NodeBody::StateController(_) => NodeKind::StateController,
            NodeBody::TallyCounter(_) => NodeKind::TallyCounter,
            NodeBody::KillMonitor(_) => NodeKind::KillMonitor,
            NodeBody::ThresholdBranch(_) => NodeKind::ThresholdBranch,
            NodeBody::ThresholdMessages(_) => NodeKind::ThresholdMessages,
            NodeBody::MotionController(_) => NodeKind::MotionController,
        }
    }

    /// The threshold core of an evaluator node.
    pub const fn threshold(&self) -> Option<&Threshold> {
        match &self.body {
            NodeBody::ThresholdBranch(b) => Some(&b.threshold),
            NodeBody::ThresholdMessages(m) => Some(&m.threshold),
            _ => None,
        }
    }

    pub(crate) const fn threshold_mut(&mut self) -> Option<&mut Threshold> {
        match &mut self.body {
            NodeBody::ThresholdBranch(b) => Some(&mut b.threshold),
            NodeBody::ThresholdMessages(m) => Some(&mut m.threshold),
            _ => None,
        }
    }

    /// The node's actor memory, if it keeps one.
    pub const fn memory(&self) -> Option<&ActorMemory> {
        match &self.body {
            NodeBody::StateController(s) => Some(s.memory()),
            NodeBody::TallyCounter(t) => Some(t.memory()),
            NodeBody::KillMonitor(k) => Some(k.memory()),
            NodeBody::ThresholdMessages(m) => Some(m.memory()),
            _ => None,
        }
    }

    /// Whether the node is mid-sequence and ignores activation.
    pub const fn is_busy(&self) -> bool {
        matches!(&self.body, NodeBody::MotionController(m) if m.is_running())
    }

    /// Configuration problem that makes the node fail closed, if any.
    pub fn config_issue(&self, ctx: &QueryContext<'_>) -> Option<String> {
        match &self.body {
            NodeBody::EventSchedule(_) if self.header.event_name.is_none() => {
                Some("event schedule has no event name".to_owned())
            }
            NodeBody::ThresholdBranch(b) => b.threshold.source_issue(ctx),
            NodeBody::ThresholdMessages(m) => m.threshold.source_issue(ctx).or_else(|| {
                m.threshold
                    .spec
                    .thresholds()
                    .is_empty()
                    .then(|| "no thresholds configured".to_owned())
            }),
            NodeBody::MotionController(m) => m.config_issue(),
            _ => None,
        }
    }

    /// Whether firing is legal right now. Has no side effects.
    pub fn can_fire(&self, ctx: &QueryContext<'_>) -> bool {
        ctx.registry
            .is_open(self.header.event_name.as_deref(), ctx.now)
            && !self.is_busy()
            && self.config_issue(ctx).is_none()
    }

    /// Value a threshold reading this node would see for `actor`, or
    /// `None` if the node holds no actor memory.
    pub fn measure(
        &self,
        actor: ActorId,
        key: Option<&str>,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> Option<i64> {
        match &self.body {
            NodeBody::StateController(s) => Some(s.measure(actor, now, host)),
            NodeBody::TallyCounter(t) => Some(t.measure(actor, now, host)),
            NodeBody::KillMonitor(k) => Some(k.measure(actor, key, now, host)),
            _ => None,
        }
    }

    /// Perform the node's effect. The caller has already checked
    /// [`can_fire`](Self::can_fire) and measured the threshold source.
    pub(crate) fn fire(
        &mut self,
        actor: ActorId,
        measured: Option<i64>,
        ctx: &mut FireContext<'_>,
    ) -> FireOutcome {
        let link = self.header.link;
        match &mut self.body {
            NodeBody::Relay(_) | NodeBody::EventSchedule(_) | NodeBody::KillMonitor(_) => {
                FireOutcome::forward(link, actor)
            }
            NodeBody::StateController(s) => {
                s.fire(actor, ctx);
                FireOutcome::forward(link, actor)
            }
            NodeBody::TallyCounter(t) => {
                t.fire(actor, ctx);
                FireOutcome::forward(link, actor)
            }
            NodeBody::ThresholdBranch(b) => b.fire(actor, measured.unwrap_or(0), link, ctx),
            NodeBody::ThresholdMessages(m) => m.fire(actor, measured.unwrap_or(0), link, ctx),
            NodeBody::MotionController(m) => m.start(actor, link, ctx),
        }
    }

    /// Clear one actor's records, or all records when `actor` is `None`.
    ///
    /// Returns `None` for nodes without memory, otherwise how many records
    /// were removed.
    pub(crate) fn clear_records(&mut self, actor: Option<ActorId>) -> Option<usize> {
        let memory = match &mut self.body {
            NodeBody::TallyCounter(t) => return Some(t.clear(actor)),
            NodeBody::StateController(s) => s.memory_mut(),
            NodeBody::KillMonitor(k) => k.memory_mut(),
            NodeBody::ThresholdMessages(m) => m.memory_mut(),
            _ => return None,
        };
        Some(match actor {
            Some(actor) => usize::from(memory.clear_record(actor)),
            None => memory.clear_all(),
        })
    }

    /// Outgoing propagation edges: `link`, then `else`.
    pub fn edges(&self) -> impl Iterator<Item = NodeId> {
        let else_link = self.threshold().and_then(|t| t.else_link);
        self.header.link.into_iter().chain(else_link)
    }

    /// Null every reference to a node for which `exists` is false.
    /// Returns the names of the cleared fields.
    pub(crate) fn drop_references(
        &mut self,
        mut exists: impl FnMut(NodeId) -> bool,
    ) -> Vec<&'static str> {
        let mut cleared = Vec::new();
        if self.header.link.is_some_and(|id| !exists(id)) {
            self.header.link = None;
            cleared.push("link");
        }
        if let Some(threshold) = self.threshold_mut() {
            if threshold.else_link.is_some_and(|id| !exists(id)) {
                threshold.else_link = None;
                cleared.push("else");
            }
            if threshold.source.is_some_and(|id| !exists(id)) {
                threshold.source = None;
                cleared.push("source");
            }
        }
        cleared
    }

    /// Write kind tag, header and body.
    pub(crate) fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_tag(self.kind().tag())?;
        self.header.encode(w)?;
        match &self.body {
            NodeBody::Relay(b) => b.encode(w),
            NodeBody::EventSchedule(b) => b.encode(w),
            NodeBody::StateController(b) => b.encode(w),
            NodeBody::TallyCounter(b) => b.encode(w),
            NodeBody::KillMonitor(b) => b.encode(w),
            NodeBody::ThresholdBranch(b) => b.encode(w),
            NodeBody::ThresholdMessages(b) => b.encode(w),
            NodeBody::MotionController(b) => b.encode(w),
        }
    }

    /// Inverse of [`encode`](Self::encode).
    pub(crate) fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let kind = decode_tag("node kind", r.read_tag()?, NodeKind::from_tag)?;
        let header = NodeHeader::decode(r)?;
        let body = match kind {
            NodeKind::Relay => NodeBody::Relay(Relay::decode(r)?),
            NodeKind::EventSchedule => NodeBody::EventSchedule(EventSchedule::decode(r)?),
            NodeKind::StateController => NodeBody::StateController(StateController::decode(r)?),
            NodeKind::TallyCounter => NodeBody::TallyCounter(TallyCounter::decode(r)?),
            NodeKind::KillMonitor => NodeBody::KillMonitor(KillMonitor::decode(r)?),
            NodeKind::ThresholdBranch => NodeBody::ThresholdBranch(ThresholdBranch::decode(r)?),
            NodeKind::ThresholdMessages => {
                NodeBody::ThresholdMessages(ThresholdMessages::decode(r)?)
            }
            NodeKind::MotionController => {
                NodeBody::MotionController(MotionController::decode(r)?)
            }
        };
        Ok(Self { header, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tripwire_types::{Comparison, ScopePolicy, ThresholdSpec};

    use super::*;
    use crate::host::StubHost;

    fn branch(source: Option<NodeId>) -> Node {
        let mut threshold = Threshold::new(source, ThresholdSpec::branch(Comparison::Ge, 1));
        threshold.else_link = Some(NodeId(9));
        Node::new(
            NodeHeader::named("branch").with_link(NodeId(8)),
            ThresholdBranch::new(threshold),
        )
    }

    #[test]
    fn edges_list_link_then_else() {
        let node = branch(None);
        assert_eq!(node.edges().collect::<Vec<_>>(), vec![NodeId(8), NodeId(9)]);
    }

    #[test]
    fn threshold_needs_memory_source() {
        let host = StubHost::new();
        let registry = Registry::new();
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId(1), Node::new(NodeHeader::named("relay"), Relay));
        nodes.insert(
            NodeId(2),
            Node::new(
                NodeHeader::named("state"),
                StateController::new(TimeDelta::seconds(5), ScopePolicy::PerActor),
            ),
        );
        let ctx = QueryContext {
            now: DateTime::from_timestamp(0, 0).unwrap(),
            host: &host,
            registry: &registry,
            nodes: &nodes,
        };
        assert!(branch(None).config_issue(&ctx).is_some());
        assert!(branch(Some(NodeId(1))).config_issue(&ctx).is_some());
        assert!(branch(Some(NodeId(7))).config_issue(&ctx).is_some());
        assert!(branch(Some(NodeId(2))).can_fire(&ctx));
    }

    #[test]
    fn dropping_references_reports_fields() {
        let mut node = branch(Some(NodeId(2)));
        let cleared = node.drop_references(|id| id == NodeId(8));
        assert_eq!(cleared, vec!["else", "source"]);
        assert_eq!(node.header.link, Some(NodeId(8)));
        assert!(node.threshold().unwrap().source.is_none());
    }

    #[test]
    fn node_survives_persistence() {
        let node = branch(Some(NodeId(2)));
        let mut w = SaveWriter::new();
        node.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(Node::decode(&mut SaveReader::new(&bytes)).unwrap(), node);
    }
}
