//! Host-world interfaces the engine consumes, and an in-memory stub.
//!
//! The engine does not model actors, items or geometry. It asks the host a
//! handful of narrow questions through [`Host`]: is this actor still
//! available, where is it, which entities belong to a group, and give me a
//! mutable handle on an entity's named properties.
//!
//! Property mutation goes through [`PropertyTarget`], an explicit
//! get/set capability with an allow-list, rather than reflection.
//!
//! [`StubHost`] is a complete in-memory host used by the tests and by the
//! engine binary's sandbox.

use std::collections::{BTreeMap, BTreeSet};

use tripwire_types::{ActorId, EntityId, PropValue};

/// Errors raised by property access on a host entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropError {
    /// The property exists but is not on the entity's allow-list.
    #[error("property `{name}` is not mutable")]
    NotAllowed {
        /// Property name.
        name: String,
    },

    /// The entity has no property by that name.
    #[error("unknown property `{name}`")]
    Unknown {
        /// Property name.
        name: String,
    },

    /// The raw frame value does not parse as the property's type, or the
    /// motion kind does not apply to it.
    #[error("value `{raw}` does not fit property `{name}`")]
    TypeMismatch {
        /// Property name.
        name: String,
        /// The offending raw value.
        raw: String,
    },

    /// An increment would overflow the property.
    #[error("increment overflows property `{name}`")]
    Overflow {
        /// Property name.
        name: String,
    },
}

/// Named, typed property access on a host entity.
pub trait PropertyTarget {
    /// Whether `name` may be written by motion frames.
    fn is_mutable(&self, name: &str) -> bool;

    /// Read a property.
    ///
    /// # Errors
    ///
    /// Returns [`PropError::Unknown`] if the property does not exist.
    fn get_prop(&self, name: &str) -> Result<PropValue, PropError>;

    /// Write a property.
    ///
    /// # Errors
    ///
    /// Returns [`PropError::NotAllowed`] for properties off the allow-list
    /// and [`PropError::TypeMismatch`] when the value has the wrong type.
    fn set_prop(&mut self, name: &str, value: PropValue) -> Result<(), PropError>;
}

/// Everything the engine needs from the surrounding world.
pub trait Host: Send {
    /// Whether the actor still exists and is alive.
    fn is_actor_available(&self, actor: ActorId) -> bool;

    /// The region the actor currently stands in, if known.
    fn actor_region(&self, actor: ActorId) -> Option<String>;

    /// Live members of a spawner/group entity, or `None` if `group` is a
    /// plain entity.
    fn group_members(&self, group: EntityId) -> Option<Vec<EntityId>>;

    /// Mutable property access to an entity, or `None` if it is gone.
    fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn PropertyTarget>;

    /// Play a sound effect at an entity.
    fn play_sound(&mut self, at: EntityId, sound_id: u32);

    /// Deliver a text message to an actor.
    fn send_message(&mut self, actor: ActorId, text: &str);
}

// ---------------------------------------------------------------------------
// Stub host
// ---------------------------------------------------------------------------

/// An actor tracked by [`StubHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubActor {
    /// Whether the actor is alive.
    pub alive: bool,
    /// Region the actor stands in.
    pub region: Option<String>,
}

/// An entity tracked by [`StubHost`]. Every property is mutable unless
/// listed in `read_only`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubEntity {
    /// Current property values.
    pub props: BTreeMap<String, PropValue>,
    /// Properties excluded from the allow-list.
    pub read_only: BTreeSet<String>,
    /// Deleted entities stay in the map but are skipped.
    pub deleted: bool,
}

impl StubEntity {
    /// Build an entity from `(name, value)` pairs.
    pub fn with_props<I>(props: I) -> Self
    where
        I: IntoIterator<Item = (String, PropValue)>,
    {
        Self {
            props: props.into_iter().collect(),
            read_only: BTreeSet::new(),
            deleted: false,
        }
    }

    /// Shortcut for reading an integer property.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.props.get(name).and_then(PropValue::as_int)
    }

    /// Shortcut for reading a boolean property.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.props.get(name).and_then(PropValue::as_bool)
    }
}

impl PropertyTarget for StubEntity {
    fn is_mutable(&self, name: &str) -> bool {
        self.props.contains_key(name) && !self.read_only.contains(name)
    }

    fn get_prop(&self, name: &str) -> Result<PropValue, PropError> {
        self.props.get(name).cloned().ok_or_else(|| PropError::Unknown {
            name: name.to_owned(),
        })
    }

    fn set_prop(&mut self, name: &str, value: PropValue) -> Result<(), PropError> {
        if !self.is_mutable(name) {
            return Err(if self.props.contains_key(name) {
                PropError::NotAllowed {
                    name: name.to_owned(),
                }
            } else {
                PropError::Unknown {
                    name: name.to_owned(),
                }
            });
        }
        let slot = self
            .props
            .get_mut(name)
            .ok_or_else(|| PropError::Unknown {
                name: name.to_owned(),
            })?;
        if core::mem::discriminant(slot) != core::mem::discriminant(&value) {
            return Err(PropError::TypeMismatch {
                name: name.to_owned(),
                raw: value.to_string(),
            });
        }
        *slot = value;
        Ok(())
    }
}

/// In-memory [`Host`] that records every sound and message it is asked to
/// deliver.
#[derive(Debug, Clone, Default)]
pub struct StubHost {
    actors: BTreeMap<ActorId, StubActor>,
    entities: BTreeMap<EntityId, StubEntity>,
    groups: BTreeMap<EntityId, Vec<EntityId>>,
    sounds: Vec<(EntityId, u32)>,
    messages: Vec<(ActorId, String)>,
}

impl StubHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live actor standing in `region`.
    pub fn add_actor(&mut self, region: Option<&str>) -> ActorId {
        let id = ActorId::new();
        self.insert_actor(id, region);
        id
    }

    /// Add a live actor with a known id.
    pub fn insert_actor(&mut self, id: ActorId, region: Option<&str>) {
        self.actors.insert(
            id,
            StubActor {
                alive: true,
                region: region.map(str::to_owned),
            },
        );
    }

    /// Kill or revive an actor.
    pub fn set_alive(&mut self, actor: ActorId, alive: bool) {
        if let Some(entry) = self.actors.get_mut(&actor) {
            entry.alive = alive;
        }
    }

    /// Move an actor to another region.
    pub fn move_actor(&mut self, actor: ActorId, region: Option<&str>) {
        if let Some(entry) = self.actors.get_mut(&actor) {
            entry.region = region.map(str::to_owned);
        }
    }

    /// Forget an actor entirely.
    pub fn remove_actor(&mut self, actor: ActorId) {
        self.actors.remove(&actor);
    }

    /// Add an entity and return its id.
    pub fn add_entity(&mut self, entity: StubEntity) -> EntityId {
        let id = EntityId::new();
        self.entities.insert(id, entity);
        id
    }

    /// Add an entity with a known id.
    pub fn insert_entity(&mut self, id: EntityId, entity: StubEntity) {
        self.entities.insert(id, entity);
    }

    /// Register a group entity whose members are `members`.
    pub fn add_group(&mut self, members: Vec<EntityId>) -> EntityId {
        let id = EntityId::new();
        self.groups.insert(id, members);
        id
    }

    /// Register a group with a known id.
    pub fn insert_group(&mut self, id: EntityId, members: Vec<EntityId>) {
        self.groups.insert(id, members);
    }

    /// Mark an entity deleted; groups stop listing it.
    pub fn delete_entity(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.deleted = true;
        }
    }

    /// Read access to an entity.
    pub fn entity(&self, id: EntityId) -> Option<&StubEntity> {
        self.entities.get(&id)
    }

    /// Sounds played so far, in order.
    pub fn sounds(&self) -> &[(EntityId, u32)] {
        &self.sounds
    }

    /// Messages delivered so far, in order.
    pub fn messages(&self) -> &[(ActorId, String)] {
        &self.messages
    }

    /// Messages delivered to one actor.
    pub fn messages_for(&self, actor: ActorId) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|(to, _)| *to == actor)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

impl Host for StubHost {
    fn is_actor_available(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|a| a.alive)
    }

    fn actor_region(&self, actor: ActorId) -> Option<String> {
        self.actors.get(&actor).and_then(|a| a.region.clone())
    }

    fn group_members(&self, group: EntityId) -> Option<Vec<EntityId>> {
        self.groups.get(&group).map(|members| {
            members
                .iter()
                .copied()
                .filter(|id| self.entities.get(id).is_some_and(|e| !e.deleted))
                .collect()
        })
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn PropertyTarget> {
        self.entities
            .get_mut(&id)
            .filter(|e| !e.deleted)
            .map(|e| e as &mut dyn PropertyTarget)
    }

    fn play_sound(&mut self, at: EntityId, sound_id: u32) {
        self.sounds.push((at, sound_id));
    }

    fn send_message(&mut self, actor: ActorId, text: &str) {
        self.messages.push((actor, text.to_owned()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn door() -> StubEntity {
        StubEntity::with_props([
            ("z".to_owned(), PropValue::Int(0)),
            ("open".to_owned(), PropValue::Bool(false)),
        ])
    }

    #[test]
    fn actors_report_liveness_and_region() {
        let mut host = StubHost::new();
        let a = host.add_actor(Some("crypt"));
        assert!(host.is_actor_available(a));
        assert_eq!(host.actor_region(a).as_deref(), Some("crypt"));
        host.set_alive(a, false);
        assert!(!host.is_actor_available(a));
        assert!(!host.is_actor_available(ActorId::new()));
    }

    #[test]
    fn set_prop_enforces_allow_list_and_type() {
        let mut entity = door();
        entity.read_only.insert("open".to_owned());
        assert_eq!(
            entity.set_prop("open", PropValue::Bool(true)),
            Err(PropError::NotAllowed {
                name: "open".to_owned()
            })
        );
        assert!(matches!(
            entity.set_prop("z", PropValue::Bool(true)),
            Err(PropError::TypeMismatch { .. })
        ));
        assert!(matches!(
            entity.set_prop("hue", PropValue::Int(1)),
            Err(PropError::Unknown { .. })
        ));
        assert!(entity.set_prop("z", PropValue::Int(4)).is_ok());
        assert_eq!(entity.int("z"), Some(4));
    }

    #[test]
    fn groups_list_only_live_members() {
        let mut host = StubHost::new();
        let a = host.add_entity(door());
        let b = host.add_entity(door());
        let group = host.add_group(vec![a, b]);
        host.delete_entity(b);
        assert_eq!(host.group_members(group), Some(vec![a]));
        assert!(host.group_members(a).is_none());
        assert!(host.entity_mut(b).is_none());
    }
}
