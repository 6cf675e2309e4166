//! Random-roll tally accumulator.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use tripwire_types::{ActorId, RollRange, ScopePolicy};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter};
use crate::host::Host;
use crate::memory::ActorMemory;
use crate::nodes::{FireContext, saturating_i64};

/// Counter key tallies are stored under in actor memory.
pub const TALLY_KEY: &str = "tally";

/// Adds a random roll to a tally every time it fires.
///
/// In per-actor mode each actor has a tally that expires with its record.
/// In global mode one tally is shared by everyone and never expires; it
/// only drops back to zero when cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyCounter {
    /// Roll added per firing.
    pub increment: RollRange,
    /// Lifetime of a per-actor tally after its last increment.
    pub ttl: TimeDelta,
    /// Share one tally across all actors.
    pub global: bool,
    global_tally: u64,
    memory: ActorMemory,
}

impl TallyCounter {
    /// Create a per-actor tally.
    pub fn new(increment: RollRange, ttl: TimeDelta, scope: ScopePolicy) -> Self {
        Self {
            increment,
            ttl,
            global: false,
            global_tally: 0,
            memory: ActorMemory::new(scope),
        }
    }

    /// Switch to a single shared tally.
    #[must_use]
    pub const fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// The node's memory.
    pub const fn memory(&self) -> &ActorMemory {
        &self.memory
    }

    /// Current shared tally (global mode).
    pub const fn global_tally(&self) -> u64 {
        self.global_tally
    }

    /// The actor's tally, or the shared tally in global mode.
    pub fn measure(&self, actor: ActorId, now: DateTime<Utc>, host: &dyn Host) -> i64 {
        if self.global {
            return saturating_i64(self.global_tally);
        }
        saturating_i64(self.memory.counter(actor, TALLY_KEY, now, host))
    }

    /// Clear one actor's tally (or, in global mode, the shared one), or
    /// everything when `actor` is `None`.
    pub(crate) fn clear(&mut self, actor: Option<ActorId>) -> usize {
        match actor {
            Some(_) if self.global => {
                let had = usize::from(self.global_tally > 0);
                self.global_tally = 0;
                had
            }
            Some(actor) => usize::from(self.memory.clear_record(actor)),
            None => {
                self.global_tally = 0;
                self.memory.clear_all()
            }
        }
    }

    pub(crate) fn fire(&mut self, actor: ActorId, ctx: &mut FireContext<'_>) {
        let roll = u64::from(ctx.rng.roll_range(self.increment));
        let tally = if self.global {
            self.global_tally = self.global_tally.saturating_add(roll);
            Some(self.global_tally)
        } else {
            self.memory
                .add_to_counter(actor, TALLY_KEY, roll, self.ttl, ctx.now, &*ctx.host)
        };
        debug!(node = %ctx.node, %actor, roll, ?tally, "tally");
    }
}

// Layout v2: global | global_tally | increment | ttl_ms | memory
// Layout v1:                         increment | ttl_ms | memory
// Layout v0:                                     ttl_ms | memory   (increment 1)
impl Persist for TallyCounter {
    const NAME: &'static str = "tally counter";
    const VERSION: u32 = 2;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.global)?;
        w.put(&self.global_tally)?;
        w.put(&self.increment.min)?;
        w.put(&self.increment.max)?;
        w.put(&self.ttl.num_milliseconds())?;
        self.memory.encode(w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut global = false;
        let mut global_tally = 0;
        let mut increment = RollRange::fixed(1);
        if version >= 2 {
            global = r.get()?;
            global_tally = r.get()?;
        }
        if version >= 1 {
            let min: u32 = r.get()?;
            let max: u32 = r.get()?;
            increment = RollRange::new(min, max);
        }
        let ttl = TimeDelta::milliseconds(r.get()?);
        Ok(Self {
            increment,
            ttl,
            global,
            global_tally,
            memory: ActorMemory::decode(r)?,
        })
    }
}
