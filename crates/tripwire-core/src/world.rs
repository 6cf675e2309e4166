//! The world: node arena, propagation, kill broadcast and timers.
//!
//! A [`World`] owns every node, the [`Registry`] of event gates and kill
//! sinks, the motion timers, and the clock, random source and host it was
//! built with. All activation goes through it.
//!
//! # Propagation
//!
//! [`World::fire`] checks the node can fire, measures its threshold source
//! (if any), fires it, then applies the returned [`FireOutcome`] in order:
//!
//! 1. timer change for the fired node
//! 2. source reset (after the decision, before anything downstream)
//! 3. next hop, which is itself checked and fired the same way
//!
//! Hops are followed in a loop, not by recursion. Propagation is not
//! depth-limited; cyclic graphs are reported by [`World::find_cycles`]
//! at authoring time instead.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use tripwire_types::{ActorId, NodeId, NodeKind};

use crate::clock::{self, Clock};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::error::GraphError;
use crate::gate::Registry;
use crate::host::Host;
use crate::nodes::{FireContext, FireOutcome, Node, NodeBody, QueryContext, TimerCommand};
use crate::random::RandomSource;
use crate::timer::{Timer, TimerQueue};

/// A trigger graph bound to a host world.
pub struct World<H: Host> {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) next_id: u64,
    pub(crate) registry: Registry,
    pub(crate) timers: TimerQueue,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) rng: Box<dyn RandomSource>,
    pub(crate) host: H,
    pub(crate) diagnostics: Diagnostics,
}

impl<H: Host> core::fmt::Debug for World<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("World")
            .field("nodes", &self.nodes.len())
            .field("next_id", &self.next_id)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl<H: Host> World<H> {
    /// Create an empty world.
    pub fn new(
        clock: impl Clock + 'static,
        rng: impl RandomSource + 'static,
        host: H,
    ) -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
            registry: Registry::new(),
            timers: TimerQueue::new(),
            clock: Box::new(clock),
            rng: Box::new(rng),
            host,
            diagnostics: Diagnostics::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current instant according to the world's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The host world.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host world.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Event gates and kill sinks.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Every node in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// First node with the given authoring name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.header.name == name)
            .map(|(id, _)| *id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the world has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `node`'s armed timer, if any.
    pub fn timer(&self, node: NodeId) -> Option<Timer> {
        self.timers.get(node)
    }

    /// Diagnostics collected so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }

    /// Remove and return the collected diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    // -----------------------------------------------------------------------
    // Graph editing
    // -----------------------------------------------------------------------

    /// Add a node and return its id.
    ///
    /// Event schedules claim their event name; a name already owned by
    /// another node leaves a diagnostic and the new schedule unregistered.
    /// Kill monitors subscribe to kill reports.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        info!(node = %id, kind = ?node.kind(), name = %node.header.name, "node inserted");
        self.nodes.insert(id, node);
        self.attach(id);
        id
    }

    /// Register a node's event name or kill subscription.
    pub(crate) fn attach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.body {
            NodeBody::EventSchedule(schedule) => {
                let Some(name) = node.header.event_name.as_deref() else {
                    self.diagnostics
                        .report(Some(id), "event schedule has no event name");
                    return;
                };
                if let Err(err) = self
                    .registry
                    .register_event(name, id, schedule.window.clone())
                {
                    self.diagnostics.report(Some(id), err.to_string());
                }
            }
            NodeBody::KillMonitor(_) => self.registry.add_kill_sink(id),
            _ => {}
        }
    }

    /// Remove a node.
    ///
    /// Cancels its timer, releases its event name and kill subscription,
    /// and clears every reference other nodes hold to it. A released event
    /// name passes to the lowest-id schedule that was refused it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if the node does not exist.
    pub fn remove(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;
        self.timers.cancel(id);
        if let (NodeKind::EventSchedule, Some(name)) = (node.kind(), &node.header.event_name) {
            if self.registry.unregister_event(name, id) {
                self.promote_schedule(name);
            }
        }
        self.registry.remove_kill_sink(id);
        for (other, entry) in &mut self.nodes {
            let cleared = entry.drop_references(|target| target != id);
            if !cleared.is_empty() {
                debug!(node = %other, removed = %id, ?cleared, "reference cleared");
            }
        }
        info!(node = %id, kind = ?node.kind(), "node removed");
        Ok(node)
    }

    /// Hand a released event name to the next schedule waiting for it.
    fn promote_schedule(&mut self, name: &str) {
        let waiting = self
            .nodes
            .iter()
            .find(|(_, node)| {
                node.kind() == NodeKind::EventSchedule
                    && node.header.event_name.as_deref() == Some(name)
            })
            .map(|(id, _)| *id);
        if let Some(next) = waiting {
            info!(node = %next, event = name, "event name handed over");
            self.attach(next);
        }
    }

    fn require(&self, id: NodeId) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound(id))
        }
    }

    /// Point `node`'s link at `target` (or clear it).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if either node does not exist.
    pub fn set_link(&mut self, node: NodeId, target: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(target) = target {
            self.require(target)?;
        }
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?;
        entry.header.link = target;
        Ok(())
    }

    /// Point a threshold node's else-link at `target` (or clear it).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if either node does not exist
    /// and [`GraphError::Unsupported`] if `node` is not a threshold node.
    pub fn set_else(&mut self, node: NodeId, target: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(target) = target {
            self.require(target)?;
        }
        let threshold = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?
            .threshold_mut()
            .ok_or(GraphError::Unsupported {
                node,
                operation: "else link",
            })?;
        threshold.else_link = target;
        Ok(())
    }

    /// Point a threshold node at the memory node it measures.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if either node does not exist
    /// and [`GraphError::Unsupported`] if `node` is not a threshold node.
    pub fn set_source(&mut self, node: NodeId, source: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(source) = source {
            self.require(source)?;
        }
        let threshold = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?
            .threshold_mut()
            .ok_or(GraphError::Unsupported {
                node,
                operation: "threshold source",
            })?;
        threshold.source = source;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    fn query_context(&self, now: DateTime<Utc>) -> QueryContext<'_> {
        QueryContext {
            now,
            host: &self.host,
            registry: &self.registry,
            nodes: &self.nodes,
        }
    }

    /// Whether `node` may fire for `actor` right now. Has no side effects.
    pub fn can_fire(&self, node: NodeId, actor: ActorId) -> bool {
        let now = self.clock.now();
        let ctx = self.query_context(now);
        let allowed = self.nodes.get(&node).is_some_and(|n| n.can_fire(&ctx));
        debug!(%node, %actor, allowed, "can fire");
        allowed
    }

    /// Fire `node` for `actor` and follow the chain it starts.
    ///
    /// Returns `false` (and does nothing) if the node cannot fire. A
    /// misconfigured node also leaves a diagnostic.
    pub fn fire(&mut self, node: NodeId, actor: ActorId) -> bool {
        let now = self.clock.now();
        let Some(outcome) = self.fire_one(node, actor, now) else {
            return false;
        };
        let next = self.settle(node, now, outcome, None);
        self.propagate(next, now);
        true
    }

    /// Check, measure and fire a single node without following its link.
    fn fire_one(&mut self, node: NodeId, actor: ActorId, now: DateTime<Utc>) -> Option<FireOutcome> {
        if !self.check(node, actor, now) {
            return None;
        }
        let measured = self.measure_source(node, actor, now);
        let entry = self.nodes.get_mut(&node)?;
        let mut ctx = FireContext {
            node,
            now,
            host: &mut self.host,
            rng: self.rng.as_mut(),
            diagnostics: &mut self.diagnostics,
        };
        let outcome = entry.fire(actor, measured, &mut ctx);
        debug!(%node, %actor, kind = ?entry.kind(), ?measured, "fired");
        Some(outcome)
    }

    /// `can_fire`, recording a diagnostic when configuration is the reason.
    fn check(&mut self, node: NodeId, actor: ActorId, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.nodes.get(&node) else {
            debug!(%node, %actor, "fire on unknown node ignored");
            return false;
        };
        let ctx = QueryContext {
            now,
            host: &self.host,
            registry: &self.registry,
            nodes: &self.nodes,
        };
        if entry.can_fire(&ctx) {
            return true;
        }
        if let Some(issue) = entry.config_issue(&ctx) {
            self.diagnostics.report(Some(node), issue);
        }
        debug!(%node, %actor, "cannot fire");
        false
    }

    /// Value `node`'s threshold source reports for `actor`.
    fn measure_source(&self, node: NodeId, actor: ActorId, now: DateTime<Utc>) -> Option<i64> {
        let threshold = self.nodes.get(&node)?.threshold()?;
        let source = self.nodes.get(&threshold.source?)?;
        source.measure(actor, threshold.counter_key.as_deref(), now, &self.host)
    }

    /// Apply an outcome's timer change and source reset; return the next hop.
    ///
    /// `keep` re-arms a popped periodic timer when the outcome says nothing
    /// about it.
    fn settle(
        &mut self,
        node: NodeId,
        at: DateTime<Utc>,
        outcome: FireOutcome,
        keep: Option<TimeDelta>,
    ) -> Option<(NodeId, ActorId)> {
        let rearm = match outcome.timer {
            Some(TimerCommand::Start(interval)) => Some(interval),
            Some(TimerCommand::Cancel) => {
                self.timers.cancel(node);
                None
            }
            None => keep,
        };
        if let Some(interval) = rearm {
            let due = clock::saturating_add(at, interval);
            if due > at {
                self.timers.schedule(node, due, interval);
            } else {
                self.timers.cancel(node);
            }
        }
        if let Some((source, actor)) = outcome.reset {
            let cleared = self
                .nodes
                .get_mut(&source)
                .and_then(|n| n.clear_records(Some(actor)));
            debug!(node = %node, %source, %actor, ?cleared, "source reset");
        }
        outcome.next
    }

    /// Follow a chain of hops until one terminates or cannot fire.
    fn propagate(&mut self, mut hop: Option<(NodeId, ActorId)>, now: DateTime<Utc>) {
        while let Some((node, actor)) = hop {
            debug!(%node, %actor, "propagating");
            hop = self
                .fire_one(node, actor, now)
                .and_then(|outcome| self.settle(node, now, outcome, None));
        }
    }

    /// Broadcast a kill by `actor` of a `victim` kind to every kill monitor.
    ///
    /// Monitors behind a closed gate ignore the report entirely. Every other
    /// monitor tracking the kind counts it and propagates to its link.
    /// Returns how many monitors counted.
    pub fn report_kill(&mut self, actor: ActorId, victim: &str) -> usize {
        let now = self.clock.now();
        let mut counted = 0_usize;
        for sink in self.registry.kill_sinks() {
            let Some(entry) = self.nodes.get_mut(&sink) else {
                continue;
            };
            if !self
                .registry
                .is_open(entry.header.event_name.as_deref(), now)
            {
                debug!(node = %sink, %actor, victim, "kill ignored, gate closed");
                continue;
            }
            let link = entry.header.link;
            let NodeBody::KillMonitor(monitor) = &mut entry.body else {
                continue;
            };
            if monitor
                .record_kill(actor, victim, now, &self.host, self.rng.as_mut())
                .is_none()
            {
                continue;
            }
            counted = counted.saturating_add(1);
            self.propagate(link.map(|next| (next, actor)), now);
        }
        debug!(%actor, victim, counted, "kill reported");
        counted
    }

    /// Run every timer due at or before now, catching up on missed ticks.
    ///
    /// Each tick runs at its own due instant, so a late pump replays the
    /// ticks it missed in order. Returns the number of ticks run.
    pub fn pump(&mut self) -> usize {
        let now = self.clock.now();
        let mut ticks = 0_usize;
        while let Some((node, timer)) = self.timers.pop_due(now) {
            let at = timer.due;
            let Some(entry) = self.nodes.get_mut(&node) else {
                continue;
            };
            let link = entry.header.link;
            let NodeBody::MotionController(motion) = &mut entry.body else {
                continue;
            };
            ticks = ticks.saturating_add(1);
            let mut ctx = FireContext {
                node,
                now: at,
                host: &mut self.host,
                rng: self.rng.as_mut(),
                diagnostics: &mut self.diagnostics,
            };
            let outcome = motion.tick(link, &mut ctx);
            let next = self.settle(node, at, outcome, Some(timer.interval));
            self.propagate(next, at);
        }
        ticks
    }

    /// Cancel a running motion without toggling it or forwarding.
    /// Returns whether it was running.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] or, for other node kinds,
    /// [`GraphError::Unsupported`].
    pub fn stop_motion(&mut self, node: NodeId) -> Result<bool, GraphError> {
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?;
        let NodeBody::MotionController(motion) = &mut entry.body else {
            return Err(GraphError::Unsupported {
                node,
                operation: "stop motion",
            });
        };
        let was_running = motion.stop();
        self.timers.cancel(node);
        info!(%node, was_running, "motion stopped");
        Ok(was_running)
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Clear `actor`'s records on a memory node, or all of them.
    /// Returns how many records were removed.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] or, for nodes without memory,
    /// [`GraphError::Unsupported`].
    pub fn clear_records(
        &mut self,
        node: NodeId,
        actor: Option<ActorId>,
    ) -> Result<usize, GraphError> {
        let cleared = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?
            .clear_records(actor)
            .ok_or(GraphError::Unsupported {
                node,
                operation: "clear records",
            })?;
        info!(%node, ?actor, cleared, "records cleared");
        Ok(cleared)
    }

    /// Whether `actor` holds a live record on `node`.
    pub fn has_record(&self, node: NodeId, actor: ActorId) -> bool {
        let now = self.clock.now();
        self.nodes
            .get(&node)
            .and_then(Node::memory)
            .is_some_and(|memory| memory.is_recorded(actor, now, &self.host))
    }

    /// The value a threshold would measure on `node` for `actor`.
    pub fn measure(&self, node: NodeId, actor: ActorId, key: Option<&str>) -> Option<i64> {
        let now = self.clock.now();
        self.nodes
            .get(&node)?
            .measure(actor, key, now, &self.host)
    }

    // -----------------------------------------------------------------------
    // Authoring checks
    // -----------------------------------------------------------------------

    /// Report every node's configuration problem as a diagnostic.
    /// Returns how many nodes are misconfigured.
    pub fn validate(&mut self) -> usize {
        let now = self.clock.now();
        let ctx = QueryContext {
            now,
            host: &self.host,
            registry: &self.registry,
            nodes: &self.nodes,
        };
        let issues: Vec<(NodeId, String)> = self
            .nodes
            .iter()
            .filter_map(|(id, node)| node.config_issue(&ctx).map(|issue| (*id, issue)))
            .collect();
        for (id, issue) in &issues {
            self.diagnostics.report(Some(*id), issue.clone());
        }
        issues.len()
    }

    /// Find every cycle in the link graph and report each as a diagnostic.
    ///
    /// Each cycle is returned as the path from its first node back to
    /// itself, e.g. `[#1, #2, #1]`.
    pub fn find_cycles(&mut self) -> Vec<Vec<NodeId>> {
        let cycles = detect_cycles(&self.nodes);
        for cycle in &cycles {
            let path = cycle
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            self.diagnostics
                .report(cycle.first().copied(), format!("propagation cycle: {path}"));
        }
        cycles
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Depth-first search over `link`/`else` edges, in id order.
fn detect_cycles(nodes: &BTreeMap<NodeId, Node>) -> Vec<Vec<NodeId>> {
    let edges_of = |id: NodeId| {
        nodes
            .get(&id)
            .map(|node| node.edges().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    };
    let mut marks: BTreeMap<NodeId, Mark> = BTreeMap::new();
    let mut cycles = Vec::new();
    for &root in nodes.keys() {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root, Mark::Active);
        let mut path = vec![root];
        let mut stack = vec![edges_of(root)];
        while let Some(pending) = stack.last_mut() {
            if let Some(next) = pending.next() {
                match marks.get(&next).copied() {
                    None if nodes.contains_key(&next) => {
                        marks.insert(next, Mark::Active);
                        path.push(next);
                        stack.push(edges_of(next));
                    }
                    Some(Mark::Active) => {
                        if let Some(start) = path.iter().position(|n| *n == next) {
                            let mut cycle = path.get(start..).unwrap_or_default().to_vec();
                            cycle.push(next);
                            cycles.push(cycle);
                        }
                    }
                    _ => {}
                }
            } else {
                stack.pop();
                if let Some(done) = path.pop() {
                    marks.insert(done, Mark::Done);
                }
            }
        }
    }
    cycles
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::StubHost;
    use crate::nodes::{NodeHeader, Relay};
    use crate::random::SeededRandom;

    fn world() -> World<StubHost> {
        World::new(ManualClock::at_epoch(), SeededRandom::new(7), StubHost::new())
    }

    fn relay(world: &mut World<StubHost>, name: &str) -> NodeId {
        world.insert(Node::new(NodeHeader::named(name), Relay))
    }

    #[test]
    fn ids_are_sequential_and_names_resolve() {
        let mut world = world();
        let a = relay(&mut world, "a");
        let b = relay(&mut world, "b");
        assert_eq!((a, b), (NodeId(1), NodeId(2)));
        assert_eq!(world.find_by_name("b"), Some(b));
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn set_link_rejects_missing_nodes() {
        let mut world = world();
        let a = relay(&mut world, "a");
        assert!(matches!(
            world.set_link(a, Some(NodeId(40))),
            Err(GraphError::NodeNotFound(id)) if id == NodeId(40)
        ));
        assert!(matches!(
            world.set_else(a, None),
            Err(GraphError::Unsupported { .. })
        ));
    }

    #[test]
    fn remove_clears_incoming_links() {
        let mut world = world();
        let a = relay(&mut world, "a");
        let b = relay(&mut world, "b");
        world.set_link(a, Some(b)).unwrap();
        world.remove(b).unwrap();
        assert_eq!(world.node(a).unwrap().header.link, None);
        assert!(matches!(world.remove(b), Err(GraphError::NodeNotFound(_))));
    }

    #[test]
    fn cycles_are_detected_once() {
        let mut world = world();
        let a = relay(&mut world, "a");
        let b = relay(&mut world, "b");
        let c = relay(&mut world, "c");
        let d = relay(&mut world, "d");
        world.set_link(a, Some(b)).unwrap();
        world.set_link(b, Some(c)).unwrap();
        world.set_link(c, Some(a)).unwrap();
        world.set_link(d, Some(d)).unwrap();

        let cycles = world.find_cycles();
        assert_eq!(cycles, vec![vec![a, b, c, a], vec![d, d]]);
        assert_eq!(world.diagnostics().len(), 2);
    }

    #[test]
    fn acyclic_graph_reports_nothing() {
        let mut world = world();
        let a = relay(&mut world, "a");
        let b = relay(&mut world, "b");
        let c = relay(&mut world, "c");
        world.set_link(a, Some(c)).unwrap();
        world.set_link(b, Some(c)).unwrap();
        assert!(world.find_cycles().is_empty());
    }
}
