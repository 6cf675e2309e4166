//! Pass-through trigger source.

use crate::codec::{CodecError, Persist, SaveReader, SaveWriter};

/// A node whose only effect is forwarding to its link.
///
/// Relays are the entry points stimuli usually hit: a pressure plate, a
/// lever, a region an actor walks into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relay;

// Layout v0: (no fields)
impl Persist for Relay {
    const NAME: &'static str = "relay";
    const VERSION: u32 = 0;

    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError> {
        w.write_version(Self::VERSION)
    }

    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError> {
        r.read_version(Self::NAME, Self::VERSION)?;
        Ok(Self)
    }
}
