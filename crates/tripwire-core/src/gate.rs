//! Event gate and broadcast registries.
//!
//! The [`Registry`] is the one place process-wide lookup tables live. A
//! world owns exactly one; nothing here is static.
//!
//! - **Event names**: an event-schedule node registers itself as the unique
//!   owner of a name together with its [`ScheduleWindow`]. Every node
//!   consults [`Registry::is_open`] with its own event name before doing
//!   anything else. Unregistered names are always open.
//! - **Kill sinks**: kill monitors register to receive kill reports
//!   broadcast by the world.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tripwire_types::{NodeId, ScheduleWindow};

use crate::error::GraphError;

/// An owned event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistration {
    /// The node that owns the name.
    pub owner: NodeId,
    /// When the event is active.
    pub window: ScheduleWindow,
}

/// Event-name table and broadcast sink lists for one world.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    events: BTreeMap<String, EventRegistration>,
    kill_sinks: BTreeSet<NodeId>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `owner`.
    ///
    /// Re-registering by the current owner replaces the window.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EventNameTaken`] if another node owns the name.
    pub fn register_event(
        &mut self,
        name: &str,
        owner: NodeId,
        window: ScheduleWindow,
    ) -> Result<(), GraphError> {
        if let Some(existing) = self.events.get(name) {
            if existing.owner != owner {
                return Err(GraphError::EventNameTaken {
                    name: name.to_owned(),
                    owner: existing.owner,
                });
            }
        }
        self.events
            .insert(name.to_owned(), EventRegistration { owner, window });
        Ok(())
    }

    /// Release `name` if `owner` holds it. Returns whether anything changed.
    pub fn unregister_event(&mut self, name: &str, owner: NodeId) -> bool {
        let owned = self.events.get(name).is_some_and(|r| r.owner == owner);
        if owned {
            self.events.remove(name);
        }
        owned
    }

    /// The registration for `name`, if any.
    pub fn event(&self, name: &str) -> Option<&EventRegistration> {
        self.events.get(name)
    }

    /// Whether the gate for `name` is open at `now`.
    ///
    /// Nodes without an event name, and names nobody registered, are always
    /// open. Never fails.
    pub fn is_open(&self, name: Option<&str>, now: DateTime<Utc>) -> bool {
        name.and_then(|n| self.events.get(n))
            .is_none_or(|registration| registration.window.contains(now))
    }

    /// Subscribe a node to kill reports.
    pub fn add_kill_sink(&mut self, node: NodeId) {
        self.kill_sinks.insert(node);
    }

    /// Unsubscribe a node from kill reports.
    pub fn remove_kill_sink(&mut self, node: NodeId) {
        self.kill_sinks.remove(&node);
    }

    /// Current kill sinks in id order.
    pub fn kill_sinks(&self) -> Vec<NodeId> {
        self.kill_sinks.iter().copied().collect()
    }
}
