//! Per-actor memory with expiry and named counters.
//!
//! Every memory-bearing node (state controller, tally counter, kill
//! monitor, and the message debounce of a threshold-messages node) owns an
//! [`ActorMemory`]. A record is *live* while all of the following hold:
//!
//! - `now < expiry`
//! - the host still reports the actor as available
//! - the actor stands in the presence region, if one is configured
//!
//! Read paths used while deciding whether a node may fire
//! ([`is_recorded`](ActorMemory::is_recorded), [`counter`](ActorMemory::counter))
//! skip dead records without touching the map. Write paths defragment
//! first, physically dropping every dead record.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tripwire_types::{ActorId, ScopePolicy};

use crate::clock;
use crate::codec::{CodecError, Persist, SaveReader, SaveWriter, decode_tag};
use crate::host::Host;

/// One actor's entry in a node's memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    /// Instant at which the record stops being live.
    pub expiry: DateTime<Utc>,
    /// Named accumulators. Missing keys read as zero.
    pub counters: BTreeMap<String, u64>,
}

impl MemoryRecord {
    /// A record with no counters.
    pub const fn new(expiry: DateTime<Utc>) -> Self {
        Self {
            expiry,
            counters: BTreeMap::new(),
        }
    }

    /// Sum of every counter.
    pub fn total(&self) -> u64 {
        self.counters
            .values()
            .fold(0_u64, |acc, v| acc.saturating_add(*v))
    }
}

/// Expiring per-actor records owned by a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorMemory {
    scope: ScopePolicy,
    presence_region: Option<String>,
    records: BTreeMap<ActorId, MemoryRecord>,
}

impl ActorMemory {
    /// Create an empty memory with the given scope policy.
    pub fn new(scope: ScopePolicy) -> Self {
        Self {
            scope,
            presence_region: None,
            records: BTreeMap::new(),
        }
    }

    /// Require actors to stand in `region` for their records to stay live.
    #[must_use]
    pub fn with_presence_region(mut self, region: Option<String>) -> Self {
        self.presence_region = region;
        self
    }

    /// The scope policy.
    pub const fn scope(&self) -> ScopePolicy {
        self.scope
    }

    /// The presence region, if any.
    pub fn presence_region(&self) -> Option<&str> {
        self.presence_region.as_deref()
    }

    fn live(
        &self,
        actor: ActorId,
        record: &MemoryRecord,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> bool {
        now < record.expiry
            && host.is_actor_available(actor)
            && self
                .presence_region
                .as_deref()
                .is_none_or(|region| host.actor_region(actor).as_deref() == Some(region))
    }

    /// Drop every dead record. Returns how many were removed.
    pub fn defrag(&mut self, now: DateTime<Utc>, host: &dyn Host) -> usize {
        let before = self.records.len();
        let dead: Vec<ActorId> = self
            .records
            .iter()
            .filter(|(actor, record)| !self.live(**actor, record, now, host))
            .map(|(actor, _)| *actor)
            .collect();
        for actor in dead {
            self.records.remove(&actor);
        }
        before.saturating_sub(self.records.len())
    }

    /// Whether a single-slot memory is held by someone other than `actor`.
    /// Call after [`defrag`](Self::defrag).
    fn slot_taken(&self, actor: ActorId) -> bool {
        self.scope == ScopePolicy::SingleSlot && self.records.keys().any(|held| *held != actor)
    }

    /// Create or refresh `actor`'s record to expire at `now + ttl`.
    ///
    /// Existing counters are kept. Under [`ScopePolicy::SingleSlot`] the
    /// write is a no-op while another actor holds a live record. Returns
    /// whether the record was written.
    pub fn set_record(
        &mut self,
        actor: ActorId,
        ttl: TimeDelta,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> bool {
        self.defrag(now, host);
        if self.slot_taken(actor) {
            return false;
        }
        let expiry = clock::saturating_add(now, ttl);
        self.records
            .entry(actor)
            .and_modify(|r| r.expiry = expiry)
            .or_insert_with(|| MemoryRecord::new(expiry));
        true
    }

    /// Add `amount` to `actor`'s counter `key`, creating or refreshing the
    /// record with expiry `now + ttl`.
    ///
    /// Returns the new counter value, or `None` if a single-slot memory is
    /// held by another actor.
    pub fn add_to_counter(
        &mut self,
        actor: ActorId,
        key: &str,
        amount: u64,
        ttl: TimeDelta,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> Option<u64> {
        if !self.set_record(actor, ttl, now, host) {
            return None;
        }
        let record = self.records.get_mut(&actor)?;
        let slot = record.counters.entry(key.to_owned()).or_insert(0);
        *slot = slot.saturating_add(amount);
        Some(*slot)
    }

    /// Overwrite `actor`'s counter `key` without touching expiry. Returns
    /// `false` if the actor has no record.
    pub fn put_counter(&mut self, actor: ActorId, key: &str, value: u64) -> bool {
        self.records.get_mut(&actor).is_some_and(|record| {
            record.counters.insert(key.to_owned(), value);
            true
        })
    }

    /// Defragment, then report whether `actor` has a record.
    pub fn has_record(&mut self, actor: ActorId, now: DateTime<Utc>, host: &dyn Host) -> bool {
        self.defrag(now, host);
        self.records.contains_key(&actor)
    }

    /// Whether `actor` has a live record. Does not modify the memory.
    pub fn is_recorded(&self, actor: ActorId, now: DateTime<Utc>, host: &dyn Host) -> bool {
        self.records
            .get(&actor)
            .is_some_and(|record| self.live(actor, record, now, host))
    }

    /// Live value of `actor`'s counter `key`; zero if absent or dead.
    pub fn counter(&self, actor: ActorId, key: &str, now: DateTime<Utc>, host: &dyn Host) -> u64 {
        self.live_record(actor, now, host)
            .and_then(|record| record.counters.get(key).copied())
            .unwrap_or(0)
    }

    /// Live sum of all of `actor`'s counters; zero if absent or dead.
    pub fn counter_total(&self, actor: ActorId, now: DateTime<Utc>, host: &dyn Host) -> u64 {
        self.live_record(actor, now, host)
            .map_or(0, MemoryRecord::total)
    }

    fn live_record(
        &self,
        actor: ActorId,
        now: DateTime<Utc>,
        host: &dyn Host,
    ) -> Option<&MemoryRecord> {
        self.records
            .get(&actor)
            .filter(|record| self.live(actor, record, now, host))
    }

    /// Number of live records.
    pub fn live_count(&self, now: DateTime<Utc>, host: &dyn Host) -> usize {
        self.records
            .iter()
            .filter(|(actor, record)| self.live(**actor, record, now, host))
            .count()
    }

    /// Remove `actor`'s record. Returns whether one existed.
    pub fn clear_record(&mut self, actor: ActorId) -> bool {
        self.records.remove(&actor).is_some()
    }

    /// Remove every record. Returns how many existed.
    pub fn clear_all(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    /// Stored records, live or not, in actor order.
    pub fn records(&self) -> impl Iterator<Item = (&ActorId, &MemoryRecord)> {
        self.records.iter()
    }
}

// Layout v1: presence_region | scope | records
// Layout v0:                   scope | records
impl Persist for ActorMemory {
    const NAME: &'static str = "memory";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.presence_region)?;
        w.write_tag(self.scope.tag())?;
        w.put(&u64::try_from(self.records.len()).unwrap_or(u64::MAX))?;
        for (actor, record) in &self.records {
            w.write_actor(*actor)?;
            w.write_time(record.expiry)?;
            w.put(&record.counters)?;
        }
        Ok(())
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut presence_region = None;
        if version >= 1 {
            presence_region = r.get::<Option<String>>()?;
        }
        let scope = decode_tag("scope policy", r.read_tag()?, ScopePolicy::from_tag)?;
        let count: u64 = r.get()?;
        let mut records = BTreeMap::new();
        for _ in 0..count {
            let actor = r.read_actor()?;
            let expiry = r.read_time()?;
            let counters: BTreeMap<String, u64> = r.get()?;
            records.insert(actor, MemoryRecord { expiry, counters });
        }
        Ok(Self {
            scope,
            presence_region,
            records,
        })
    }
}
