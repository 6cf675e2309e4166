//! Saving and loading whole worlds.
//!
//! # Envelope
//!
//! ```text
//! "TRIP" | envelope version u32 | payload length u64 | crc32 u32 | payload
//! ```
//!
//! The payload is the world layout: its version, the node count, each node
//! as `(id, kind tag, header, body)`, then the next-id counter. Nodes keep
//! their ids, so `link`/`else`/`source` references need no fix-up.
//!
//! # After loading
//!
//! - event schedules re-register their names and kill monitors resubscribe
//! - references to nodes missing from the save are cleared with a diagnostic
//! - running motion controllers re-arm their timers from the load instant
//! - the link graph is checked for cycles

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::info;
use tripwire_types::NodeId;

use crate::clock::{self, Clock};
use crate::codec::{CodecError, SaveReader, SaveWriter};
use crate::host::Host;
use crate::nodes::{Node, NodeBody};
use crate::random::RandomSource;
use crate::world::World;

/// File magic.
pub const MAGIC: [u8; 4] = *b"TRIP";

/// Envelope layout version.
pub const ENVELOPE_VERSION: u32 = 1;

/// World payload layout version.
const WORLD_VERSION: u32 = 0;

/// Errors that can occur when saving or loading a world file.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// The file could not be read or written.
    #[error("failed to access save file {path}: {source}")]
    Io {
        /// The save file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file contents could not be encoded or decoded.
    #[error("save codec error: {source}")]
    Codec {
        /// The underlying codec error.
        #[from]
        source: CodecError,
    },
}

impl<H: Host> World<H> {
    /// Serialize every node into a checksummed save.
    ///
    /// Timers are not saved; running motions re-arm on load.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a value cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = SaveWriter::new();
        payload.write_version(WORLD_VERSION)?;
        payload.put(&u64::try_from(self.nodes.len()).unwrap_or(u64::MAX))?;
        for (id, node) in &self.nodes {
            payload.put(&id.get())?;
            node.encode(&mut payload)?;
        }
        payload.put(&self.next_id)?;
        let payload = payload.into_bytes();

        let mut envelope = SaveWriter::new();
        envelope.put(&MAGIC)?;
        envelope.write_version(ENVELOPE_VERSION)?;
        envelope.put(&u64::try_from(payload.len()).unwrap_or(u64::MAX))?;
        envelope.put(&crc32fast::hash(&payload))?;
        let mut bytes = envelope.into_bytes();
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Rebuild a world from a save produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for a bad magic, checksum or layout.
    pub fn from_bytes(
        bytes: &[u8],
        clock: impl Clock + 'static,
        rng: impl RandomSource + 'static,
        host: H,
    ) -> Result<Self, CodecError> {
        let mut envelope = SaveReader::new(bytes);
        if envelope.read_raw(MAGIC.len())? != MAGIC {
            return Err(CodecError::BadMagic);
        }
        envelope.read_version("envelope", ENVELOPE_VERSION)?;
        let declared: u64 = envelope.get()?;
        let expected_crc: u32 = envelope.get()?;
        let payload = envelope.read_raw(usize::try_from(declared).unwrap_or(usize::MAX))?;
        ensure_consumed(&envelope, "envelope")?;
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(CodecError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let mut r = SaveReader::new(payload);
        r.read_version("world", WORLD_VERSION)?;
        let count: u64 = r.get()?;
        let mut nodes = BTreeMap::new();
        for _ in 0..count {
            let id = NodeId(r.get()?);
            nodes.insert(id, Node::decode(&mut r)?);
        }
        let next_id: u64 = r.get()?;
        ensure_consumed(&r, "world")?;

        let mut world = Self::new(clock, rng, host);
        let highest = nodes.keys().next_back().map_or(0, |id| id.get());
        world.next_id = next_id.max(highest.saturating_add(1));
        world.nodes = nodes;
        world.restore_links();
        Ok(world)
    }

    /// Re-establish registrations, references and timers after a load.
    fn restore_links(&mut self) {
        let ids: BTreeSet<NodeId> = self.nodes.keys().copied().collect();
        for id in &ids {
            self.attach(*id);
        }
        for (id, node) in &mut self.nodes {
            for field in node.drop_references(|target| ids.contains(&target)) {
                self.diagnostics
                    .report(Some(*id), format!("dangling {field} reference cleared on load"));
            }
        }
        let now = self.clock.now();
        for (id, node) in &self.nodes {
            if let NodeBody::MotionController(motion) = &node.body {
                if motion.is_running() {
                    let interval = motion.interval();
                    self.timers
                        .schedule(*id, clock::saturating_add(now, interval), interval);
                }
            }
        }
        self.find_cycles();
        info!(
            nodes = self.nodes.len(),
            timers = self.timers.len(),
            "world loaded"
        );
    }

    /// Write the world to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError`] if encoding or writing fails.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SaveError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "world saved");
        Ok(())
    }

    /// Read a world from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError`] if reading or decoding fails.
    pub fn load_from_file(
        path: &Path,
        clock: impl Clock + 'static,
        rng: impl RandomSource + 'static,
        host: H,
    ) -> Result<Self, SaveError> {
        let bytes = std::fs::read(path).map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(&bytes, clock, rng, host)?)
    }
}

fn ensure_consumed(reader: &SaveReader<'_>, component: &'static str) -> Result<(), CodecError> {
    match reader.remaining() {
        0 => Ok(()),
        count => Err(CodecError::TrailingBytes { component, count }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::StubHost;
    use crate::nodes::{NodeHeader, Relay};
    use crate::random::SeededRandom;

    fn sample() -> World<StubHost> {
        let mut world = World::new(ManualClock::at_epoch(), SeededRandom::new(1), StubHost::new());
        let a = world.insert(Node::new(NodeHeader::named("a"), Relay));
        let b = world.insert(Node::new(NodeHeader::named("b"), Relay));
        world.set_link(a, Some(b)).unwrap();
        world
    }

    fn load(bytes: &[u8]) -> Result<World<StubHost>, CodecError> {
        World::from_bytes(bytes, ManualClock::at_epoch(), SeededRandom::new(1), StubHost::new())
    }

    #[test]
    fn round_trip_keeps_ids_and_links() {
        let bytes = sample().to_bytes().unwrap();
        let mut world = load(&bytes).unwrap();
        assert_eq!(world.len(), 2);
        assert_eq!(world.node(NodeId(1)).unwrap().header.link, Some(NodeId(2)));
        let c = world.insert(Node::new(NodeHeader::named("c"), Relay));
        assert_eq!(c, NodeId(3));
    }

    #[test]
    fn dangling_links_are_cleared_with_diagnostic() {
        let mut world = sample();
        if let Some(node) = world.nodes.get_mut(&NodeId(2)) {
            node.header.link = Some(NodeId(99));
        }
        let bytes = world.to_bytes().unwrap();
        let loaded = load(&bytes).unwrap();
        assert_eq!(loaded.node(NodeId(2)).unwrap().header.link, None);
        assert!(
            loaded
                .diagnostics()
                .iter()
                .any(|d| d.node == Some(NodeId(2)) && d.message.contains("dangling link"))
        );
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = sample().to_bytes().unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        assert!(matches!(load(&bytes), Err(CodecError::ChecksumMismatch { .. })));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        if let Some(first) = bytes.first_mut() {
            *first = b'X';
        }
        assert!(matches!(load(&bytes), Err(CodecError::BadMagic)));
    }

    #[test]
    fn truncated_save_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        let cut = bytes.get(..bytes.len().saturating_sub(3)).unwrap();
        assert!(matches!(load(cut), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            load(&bytes),
            Err(CodecError::TrailingBytes { component: "envelope", count: 2 })
        ));
    }
}
