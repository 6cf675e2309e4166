//! Binary primitives for the versioned save format.
//!
//! [`SaveWriter`] and [`SaveReader`] move one primitive at a time through
//! `bincode` (fixed-width little-endian integers, length-prefixed strings).
//! Components implement [`Persist`] on top of them.
//!
//! # Versioning rules
//!
//! Every component writes its own `u32` version first, then its fields,
//! newest-version fields first. Readers mirror the layout with descending
//! `if version >= N` blocks, so an old save simply skips the newer blocks
//! and falls through to the shared older ones:
//!
//! ```text
//! version 2 -> [fields added in v2] [fields added in v1] [v0 fields]
//! version 1 ->                      [fields added in v1] [v0 fields]
//! version 0 ->                                           [v0 fields]
//! ```
//!
//! A new field is only ever added in a new top block; existing blocks are
//! never edited, otherwise old saves would silently lose fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tripwire_types::{ActorId, EntityId, NodeId};
use uuid::Uuid;

use crate::clock::{self, ClockError};

/// Errors that can occur while encoding or decoding saved state.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A primitive could not be encoded or decoded.
    #[error("primitive codec error: {source}")]
    Bincode {
        /// The underlying bincode error.
        #[from]
        source: bincode::Error,
    },

    /// The data was written by a newer version of a component.
    #[error("{component} version {version} is newer than supported version {newest}")]
    UnsupportedVersion {
        /// Component name.
        component: &'static str,
        /// Version found in the data.
        version: u32,
        /// Newest version this build understands.
        newest: u32,
    },

    /// An enum tag does not map to any known variant.
    #[error("unknown {component} tag {tag}")]
    UnknownTag {
        /// Component name.
        component: &'static str,
        /// Tag found in the data.
        tag: u8,
    },

    /// The data does not start with the save-file magic.
    #[error("not a tripwire save (bad magic)")]
    BadMagic,

    /// The payload checksum does not match.
    #[error("checksum mismatch: expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the envelope.
        expected: u32,
        /// Checksum of the payload as read.
        actual: u32,
    },

    /// The payload is shorter than the envelope claims.
    #[error("truncated payload: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Declared length.
        expected: u64,
        /// Available length.
        actual: u64,
    },

    /// Bytes are left over after the last field.
    #[error("{count} unexpected trailing bytes after {component}")]
    TrailingBytes {
        /// What was being read.
        component: &'static str,
        /// How many bytes were left.
        count: usize,
    },

    /// A persisted timestamp is out of range.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Decoded values violate a component invariant.
    #[error("invalid {component}: {reason}")]
    Invalid {
        /// Component name.
        component: &'static str,
        /// What is wrong.
        reason: String,
    },
}

/// A component with a versioned binary layout.
pub trait Persist: Sized {
    /// Component name used in error messages.
    const NAME: &'static str;

    /// Newest layout version this build writes.
    const VERSION: u32;

    /// Write the version tag and every field.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if a primitive cannot be encoded.
    fn encode(&self, w: &mut SaveWriter) -> Result<(), CodecError>;

    /// Read a value written by any version up to [`VERSION`](Self::VERSION).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for truncated data, unknown versions or tags.
    fn decode(r: &mut SaveReader<'_>) -> Result<Self, CodecError>;
}

/// Append-only byte sink for one save.
#[derive(Debug, Default)]
pub struct SaveWriter {
    buf: Vec<u8>,
}

impl SaveWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode any serde value with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        bincode::serialize_into(&mut self.buf, value)?;
        Ok(())
    }

    /// Write a component version tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_version(&mut self, version: u32) -> Result<(), CodecError> {
        self.put(&version)
    }

    /// Write an enum tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_tag(&mut self, tag: u8) -> Result<(), CodecError> {
        self.put(&tag)
    }

    /// Write an actor id as its 128-bit value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_actor(&mut self, actor: ActorId) -> Result<(), CodecError> {
        self.put(&actor.into_inner().as_u128())
    }

    /// Write an optional entity id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_entity(&mut self, entity: Option<EntityId>) -> Result<(), CodecError> {
        self.put(&entity.map(|e| e.into_inner().as_u128()))
    }

    /// Write an optional node reference.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_node(&mut self, node: Option<NodeId>) -> Result<(), CodecError> {
        self.put(&node.map(NodeId::get))
    }

    /// Write an instant as Unix milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if encoding fails.
    pub fn write_time(&mut self, instant: DateTime<Utc>) -> Result<(), CodecError> {
        self.put(&clock::to_millis(instant))
    }

    /// Finish and return the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over saved bytes.
#[derive(Debug)]
pub struct SaveReader<'a> {
    rest: &'a [u8],
}

impl<'a> SaveReader<'a> {
    /// Start reading `bytes` from the beginning.
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    /// Decode any serde value with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if the data is truncated or malformed.
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        Ok(bincode::deserialize_from(&mut self.rest)?)
    }

    /// Read a component version tag, rejecting versions newer than `newest`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedVersion`] for future versions.
    pub fn read_version(
        &mut self,
        component: &'static str,
        newest: u32,
    ) -> Result<u32, CodecError> {
        let version: u32 = self.get()?;
        if version > newest {
            return Err(CodecError::UnsupportedVersion {
                component,
                version,
                newest,
            });
        }
        Ok(version)
    }

    /// Read an enum tag.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if the data is truncated.
    pub fn read_tag(&mut self) -> Result<u8, CodecError> {
        self.get()
    }

    /// Read an actor id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if the data is truncated.
    pub fn read_actor(&mut self) -> Result<ActorId, CodecError> {
        let raw: u128 = self.get()?;
        Ok(ActorId(Uuid::from_u128(raw)))
    }

    /// Read an optional entity id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if the data is truncated.
    pub fn read_entity(&mut self) -> Result<Option<EntityId>, CodecError> {
        let raw: Option<u128> = self.get()?;
        Ok(raw.map(|v| EntityId(Uuid::from_u128(v))))
    }

    /// Read an optional node reference.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Bincode`] if the data is truncated.
    pub fn read_node(&mut self) -> Result<Option<NodeId>, CodecError> {
        let raw: Option<u64> = self.get()?;
        Ok(raw.map(NodeId))
    }

    /// Read an instant stored as Unix milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Clock`] if the instant is out of range.
    pub fn read_time(&mut self) -> Result<DateTime<Utc>, CodecError> {
        let millis: i64 = self.get()?;
        Ok(clock::from_millis(millis)?)
    }

    /// Read exactly `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if fewer bytes remain.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.rest.len() < len {
            return Err(CodecError::Truncated {
                expected: u64::try_from(len).unwrap_or(u64::MAX),
                actual: u64::try_from(self.rest.len()).unwrap_or(u64::MAX),
            });
        }
        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Ok(head)
    }

    /// Bytes not yet consumed.
    pub const fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Map a persisted tag through `lookup`, reporting unknown values.
///
/// # Errors
///
/// Returns [`CodecError::UnknownTag`] when `lookup` yields `None`.
pub fn decode_tag<T>(
    component: &'static str,
    tag: u8,
    lookup: impl FnOnce(u8) -> Option<T>,
) -> Result<T, CodecError> {
    lookup(tag).ok_or(CodecError::UnknownTag { component, tag })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn primitives_read_back_in_order() {
        let actor = ActorId::new();
        let mut w = SaveWriter::new();
        w.write_version(3).unwrap();
        w.put("lever").unwrap();
        w.write_node(Some(NodeId(9))).unwrap();
        w.write_node(None).unwrap();
        w.write_actor(actor).unwrap();
        w.put(&true).unwrap();
        let bytes = w.into_bytes();

        let mut r = SaveReader::new(&bytes);
        assert_eq!(r.read_version("test", 3).unwrap(), 3);
        assert_eq!(r.get::<String>().unwrap(), "lever");
        assert_eq!(r.read_node().unwrap(), Some(NodeId(9)));
        assert_eq!(r.read_node().unwrap(), None);
        assert_eq!(r.read_actor().unwrap(), actor);
        assert!(r.get::<bool>().unwrap());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut w = SaveWriter::new();
        w.write_version(5).unwrap();
        let bytes = w.into_bytes();
        let mut r = SaveReader::new(&bytes);
        assert!(matches!(
            r.read_version("motion", 2),
            Err(CodecError::UnsupportedVersion { version: 5, newest: 2, .. })
        ));
    }

    #[test]
    fn truncated_reads_fail() {
        let bytes = [1_u8, 2];
        let mut r = SaveReader::new(&bytes);
        assert!(r.get::<u32>().is_err());
        let mut r = SaveReader::new(&bytes);
        assert!(matches!(r.read_raw(3), Err(CodecError::Truncated { .. })));
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn unknown_tags_are_reported() {
        let result = decode_tag("comparison", 42, tripwire_types::Comparison::from_tag);
        assert!(matches!(result, Err(CodecError::UnknownTag { tag: 42, .. })));
    }
}
