//! Kill tally fed by kill reports.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use tripwire_types::{ActorId, RollRange, ScopePolicy};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter};
use crate::host::Host;
use crate::memory::ActorMemory;
use crate::nodes::saturating_i64;
use crate::random::RandomSource;

/// Counts kills per actor and victim kind.
///
/// Kill monitors do not count when fired; firing only forwards. The world
/// broadcasts every kill report to all monitors, and each monitor that
/// tracks the victim kind adds a roll to the killer's counter for that
/// kind. An empty `tracked` set counts every kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillMonitor {
    /// Victim kinds counted by this monitor.
    pub tracked: BTreeSet<String>,
    /// Roll added per kill.
    pub increment: RollRange,
    /// Lifetime of a killer's counters after the last kill.
    pub ttl: TimeDelta,
    memory: ActorMemory,
}

impl KillMonitor {
    /// Create a monitor counting the given victim kinds.
    pub fn new<I, S>(tracked: I, ttl: TimeDelta, scope: ScopePolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tracked: tracked.into_iter().map(Into::into).collect(),
            increment: RollRange::fixed(1),
            ttl,
            memory: ActorMemory::new(scope),
        }
    }

    /// Roll `increment` per kill instead of counting one.
    #[must_use]
    pub const fn with_increment(mut self, increment: RollRange) -> Self {
        self.increment = increment;
        self
    }

    /// The node's memory.
    pub const fn memory(&self) -> &ActorMemory {
        &self.memory
    }

    pub(crate) const fn memory_mut(&mut self) -> &mut ActorMemory {
        &mut self.memory
    }

    /// Whether kills of `victim` are counted.
    pub fn tracks(&self, victim: &str) -> bool {
        self.tracked.is_empty() || self.tracked.contains(victim)
    }

    /// Count a kill. Returns the new counter value, or `None` if the kind
    /// is not tracked or a single-slot memory is held by someone else.
    pub(crate) fn record_kill(
        &mut self,
        actor: ActorId,
        victim: &str,
        now: DateTime<Utc>,
        host: &dyn Host,
        rng: &mut dyn RandomSource,
    ) -> Option<u64> {
        if !self.tracks(victim) {
            return None;
        }
        let roll = u64::from(rng.roll_range(self.increment));
        let count = self
            .memory
            .add_to_counter(actor, victim, roll, self.ttl, now, host);
        debug!(%actor, victim, roll, ?count, "kill counted");
        count
    }

    /// The actor's count for `key`, or the sum over every kind when no key
    /// is given.
    pub fn measure(
        &self,
        actor: ActorId,
        key: Option<&str>,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> i64 {
        let value = match key {
            Some(key) => self.memory.counter(actor, key, now, host),
            None => self.memory.counter_total(actor, now, host),
        };
        saturating_i64(value)
    }
}

// Layout v1: increment | tracked | ttl_ms | memory
// Layout v0:             tracked | ttl_ms | memory   (increment 1)
impl Persist for KillMonitor {
    const NAME: &'static str = "kill monitor";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.increment.min)?;
        w.put(&self.increment.max)?;
        w.put(&self.tracked)?;
        w.put(&self.ttl.num_milliseconds())?;
        self.memory.encode(w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut increment = RollRange::fixed(1);
        if version >= 1 {
            let min: u32 = r.get()?;
            let max: u32 = r.get()?;
            increment = RollRange::new(min, max);
        }
        let tracked: BTreeSet<String> = r.get()?;
        let ttl = TimeDelta::milliseconds(r.get()?);
        Ok(Self {
            tracked,
            increment,
            ttl,
            memory: ActorMemory::decode(r)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::StubHost;
    use crate::random::SeededRandom;

    #[test]
    fn counts_only_tracked_kinds() {
        let mut host = StubHost::new();
        let a = host.add_actor(None);
        let mut rng = SeededRandom::new(1);
        let now = DateTime::from_timestamp(0, 0).unwrap();
        let mut monitor = KillMonitor::new(["wolf", "bear"], TimeDelta::seconds(60), ScopePolicy::PerActor);

        assert_eq!(monitor.record_kill(a, "wolf", now, &host, &mut rng), Some(1));
        assert_eq!(monitor.record_kill(a, "wolf", now, &host, &mut rng), Some(2));
        assert_eq!(monitor.record_kill(a, "bear", now, &host, &mut rng), Some(1));
        assert_eq!(monitor.record_kill(a, "rat", now, &host, &mut rng), None);

        assert_eq!(monitor.measure(a, Some("wolf"), now, &host), 2);
        assert_eq!(monitor.measure(a, None, now, &host), 3);
        host.set_alive(a, false);
        assert_eq!(monitor.measure(a, None, now, &host), 0);
    }

    #[test]
    fn empty_filter_counts_everything() {
        let monitor = KillMonitor::new(Vec::<String>::new(), TimeDelta::seconds(1), ScopePolicy::PerActor);
        assert!(monitor.tracks("anything"));
    }
}
