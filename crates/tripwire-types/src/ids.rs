//! Type-safe identifiers for everything the engine references.
//!
//! Actors and entities belong to the host world and are identified by
//! [`Uuid`] wrappers (UUID v7, time-ordered). Graph nodes live in the
//! engine's own arena and use a stable serial number instead, so links
//! survive a save/load cycle without pointer fix-ups.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identity of the player or creature a stimulus originates from.
    ///
    /// Memory records are keyed on this value. The engine never owns the
    /// actor; liveness is checked through the host.
    ActorId
}

define_id! {
    /// Identity of a host-world entity (a door, a platform, a spawner group)
    /// that a motion sequence mutates.
    EntityId
}

/// Arena index of a trigger node inside a world.
///
/// Node ids are assigned sequentially by the world and persisted verbatim,
/// so `Link`, `Else` and `Source` references are plain integers that are
/// resolved back to live nodes after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Return the raw serial number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = ActorId::new();
        let b = ActorId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = EntityId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn node_id_display_is_prefixed() {
        assert_eq!(NodeId(7).to_string(), "#7");
        assert_eq!(NodeId::from(3).get(), 3);
    }

    #[test]
    fn actor_id_reads_from_plain_uuid_string() {
        let yaml = "\"0190f5a2-7c3b-7d41-9a55-2a3c0c4d9e10\"";
        let parsed: Result<ActorId, _> = serde_yml::from_str(yaml);
        assert!(parsed.is_ok());
    }
}
