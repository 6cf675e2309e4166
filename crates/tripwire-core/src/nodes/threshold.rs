//! Threshold evaluators: a binary branch and a message table.
//!
//! Both read a value measured from a memory-bearing source node, decide
//! `measured <op> compare_value`, and route to `link` on success or
//! `else_link` on failure. The decision is taken before anything else
//! happens; `reset_on_success` clears the actor's record on the source
//! afterwards, before propagation continues.

use chrono::TimeDelta;
use tracing::debug;
use tripwire_types::{ActorId, Comparison, NodeId, ScopePolicy, ThresholdEntry, ThresholdSpec};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter, decode_tag};
use crate::memory::ActorMemory;
use crate::nodes::{FireContext, FireOutcome, QueryContext};

/// Counter key the message table stores the last announced entry under.
const LAST_MESSAGE_KEY: &str = "last_message";

/// Default lifetime of the per-actor message debounce.
pub const DEFAULT_DEBOUNCE_SECS: i64 = 300;

/// Fields shared by both evaluator kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Threshold {
    /// Memory node the value is measured from.
    pub source: Option<NodeId>,
    /// Comparison, operand and message table.
    pub spec: ThresholdSpec,
    /// Counter to read on kill-monitor sources; all counters when unset.
    pub counter_key: Option<String>,
    /// Clear the actor's record on the source after a successful decision.
    pub reset_on_success: bool,
    /// Target taken when the decision fails.
    pub else_link: Option<NodeId>,
}

impl Threshold {
    /// Create an evaluator core reading from `source`.
    pub const fn new(source: Option<NodeId>, spec: ThresholdSpec) -> Self {
        Self {
            source,
            spec,
            counter_key: None,
            reset_on_success: false,
            else_link: None,
        }
    }

    /// Why the evaluator cannot run, if it cannot.
    pub(crate) fn source_issue(&self, ctx: &QueryContext<'_>) -> Option<String> {
        let Some(source) = self.source else {
            return Some("no source node configured".to_owned());
        };
        match ctx.nodes.get(&source) {
            None => Some(format!("source {source} does not exist")),
            Some(node) if !node.kind().is_memory_source() => Some(format!(
                "source {source} is a {:?} and holds no actor memory",
                node.kind()
            )),
            Some(_) => None,
        }
    }

    /// Decide and build the routing outcome.
    fn route(
        &self,
        actor: ActorId,
        measured: i64,
        link: Option<NodeId>,
        ctx: &FireContext<'_>,
    ) -> FireOutcome {
        let passed = self.spec.decide(measured);
        debug!(
            node = %ctx.node,
            %actor,
            measured,
            comparison = ?self.spec.comparison,
            operand = self.spec.compare_value,
            passed,
            "threshold decision"
        );
        let reset = if passed && self.reset_on_success {
            self.source.map(|source| (source, actor))
        } else {
            None
        };
        let next = if passed { link } else { self.else_link };
        FireOutcome {
            next: next.map(|node| (node, actor)),
            reset,
            timer: None,
        }
    }

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_node(self.source)?;
        w.write_tag(self.spec.comparison.tag())?;
        w.put(&self.spec.compare_value)?;
        let entries: Vec<(i64, Option<String>)> = self
            .spec
            .thresholds()
            .iter()
            .map(|e| (e.value, e.message.clone()))
            .collect();
        w.put(&entries)?;
        w.put(&self.reset_on_success)?;
        w.write_node(self.else_link)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let source = r.read_node()?;
        let comparison = decode_tag("comparison", r.read_tag()?, Comparison::from_tag)?;
        let compare_value: i64 = r.get()?;
        let entries: Vec<(i64, Option<String>)> = r.get()?;
        let thresholds = entries
            .into_iter()
            .map(|(value, message)| ThresholdEntry { value, message })
            .collect();
        let spec = ThresholdSpec::new(comparison, compare_value, thresholds).map_err(|err| {
            CodecError::Invalid {
                component: "threshold table",
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            source,
            spec,
            counter_key: None,
            reset_on_success: r.get()?,
            else_link: r.read_node()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Binary branch
// ---------------------------------------------------------------------------

/// Routes to `link` or `else_link` on a single comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdBranch {
    /// Evaluator configuration.
    pub threshold: Threshold,
}

impl ThresholdBranch {
    /// Create a branch.
    pub const fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    pub(crate) fn fire(
        &self,
        actor: ActorId,
        measured: i64,
        link: Option<NodeId>,
        ctx: &FireContext<'_>,
    ) -> FireOutcome {
        self.threshold.route(actor, measured, link, ctx)
    }
}

// Layout v1: counter_key | threshold
// Layout v0:               threshold
impl Persist for ThresholdBranch {
    const NAME: &'static str = "threshold branch";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.threshold.counter_key)?;
        self.threshold.encode(w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut counter_key = None;
        if version >= 1 {
            counter_key = r.get()?;
        }
        let mut threshold = Threshold::decode(r)?;
        threshold.counter_key = counter_key;
        Ok(Self { threshold })
    }
}

// ---------------------------------------------------------------------------
// Message table
// ---------------------------------------------------------------------------

/// Announces the nearest matching threshold's message, then branches.
///
/// A message is sent to an actor only when the matched entry differs from
/// the last one announced to that actor. The debounce lives in the node's
/// own actor memory and expires after `debounce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdMessages {
    /// Evaluator configuration; the message table must not be empty.
    pub threshold: Threshold,
    /// Lifetime of the per-actor debounce.
    pub debounce: TimeDelta,
    memory: ActorMemory,
}

impl ThresholdMessages {
    /// Create a message table with the default debounce lifetime.
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            debounce: TimeDelta::seconds(DEFAULT_DEBOUNCE_SECS),
            memory: ActorMemory::new(ScopePolicy::PerActor),
        }
    }

    /// Override the debounce lifetime.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: TimeDelta) -> Self {
        self.debounce = debounce;
        self
    }

    /// The debounce memory.
    pub const fn memory(&self) -> &ActorMemory {
        &self.memory
    }

    pub(crate) const fn memory_mut(&mut self) -> &mut ActorMemory {
        &mut self.memory
    }

    pub(crate) fn fire(
        &mut self,
        actor: ActorId,
        measured: i64,
        link: Option<NodeId>,
        ctx: &mut FireContext<'_>,
    ) -> FireOutcome {
        // Decide before announcing so the message cannot affect routing.
        let outcome = self.threshold.route(actor, measured, link, ctx);
        self.announce(actor, measured, ctx);
        outcome
    }

    fn announce(&mut self, actor: ActorId, measured: i64, ctx: &mut FireContext<'_>) {
        let Some(index) = self.threshold.spec.nearest_match(measured) else {
            return;
        };
        // Stored one-based so a missing counter means "nothing announced".
        let marker = u64::try_from(index).unwrap_or(u64::MAX).saturating_add(1);
        let last = self
            .memory
            .counter(actor, LAST_MESSAGE_KEY, ctx.now, &*ctx.host);
        if last == marker {
            return;
        }
        if !self.memory.set_record(actor, self.debounce, ctx.now, &*ctx.host) {
            return;
        }
        self.memory.put_counter(actor, LAST_MESSAGE_KEY, marker);
        if let Some(text) = self.threshold.spec.message(index) {
            debug!(node = %ctx.node, %actor, index, "threshold message");
            ctx.host.send_message(actor, text);
        }
    }
}

// Layout v1: counter_key | debounce_ms | memory | threshold
// Layout v0:                                      threshold   (5 min debounce)
impl Persist for ThresholdMessages {
    const NAME: &'static str = "threshold messages";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.threshold.counter_key)?;
        w.put(&self.debounce.num_milliseconds())?;
        self.memory.encode(w)?;
        self.threshold.encode(w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut counter_key = None;
        let mut debounce = TimeDelta::seconds(DEFAULT_DEBOUNCE_SECS);
        let mut memory = ActorMemory::new(ScopePolicy::PerActor);
        if version >= 1 {
            counter_key = r.get()?;
            debounce = TimeDelta::milliseconds(r.get()?);
            memory = ActorMemory::decode(r)?;
        }
        let mut threshold = Threshold::decode(r)?;
        threshold.counter_key = counter_key;
        Ok(Self {
            threshold,
            debounce,
            memory,
        })
    }
}
