//! Per-actor TTL state.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use tripwire_types::{ActorId, ScopePolicy};

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter};
use crate::host::Host;
use crate::memory::ActorMemory;
use crate::nodes::FireContext;

/// TTL used by saves written before the TTL was configurable.
const LEGACY_TTL_SECS: i64 = 60;

/// Remembers which actors passed through it, for `ttl`.
///
/// Firing writes a record for the actor (subject to the scope policy) and
/// forwards. As a threshold source it measures `1` while the actor holds a
/// live record and `0` otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateController {
    /// How long a record stays live after the last write.
    pub ttl: TimeDelta,
    memory: ActorMemory,
}

impl StateController {
    /// Create a controller.
    pub fn new(ttl: TimeDelta, scope: ScopePolicy) -> Self {
        Self {
            ttl,
            memory: ActorMemory::new(scope),
        }
    }

    /// Require actors to stay in `region` for their records to stay live.
    #[must_use]
    pub fn with_presence_region(mut self, region: Option<String>) -> Self {
        self.memory = self.memory.with_presence_region(region);
        self
    }

    /// The node's memory.
    pub const fn memory(&self) -> &ActorMemory {
        &self.memory
    }

    pub(crate) const fn memory_mut(&mut self) -> &mut ActorMemory {
        &mut self.memory
    }

    /// `1` if `actor` holds a live record, else `0`.
    pub fn measure(&self, actor: ActorId, now: DateTime<Utc>, host: &dyn Host) -> i64 {
        i64::from(self.memory.is_recorded(actor, now, host))
    }

    pub(crate) fn fire(&mut self, actor: ActorId, ctx: &mut FireContext<'_>) {
        let written = self.memory.set_record(actor, self.ttl, ctx.now, &*ctx.host);
        debug!(node = %ctx.node, %actor, written, "state record");
    }
}

// Layout v1: ttl_ms | memory
// Layout v0:          memory   (fixed 60 s TTL)
impl Persist for StateController {
    const NAME: &'static str = "state controller";
    const VERSION: u32 = 1;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)?;
        w.put(&self.ttl.num_milliseconds())?;
        self.memory.encode(w)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_version(Self::NAME, Self::VERSION)?;
        let mut ttl = TimeDelta::seconds(LEGACY_TTL_SECS);
        if version >= 1 {
            ttl = TimeDelta::milliseconds(r.get()?);
        }
        Ok(Self {
            ttl,
            memory: ActorMemory::decode(r)?,
        })
    }
}
