//! Trigger propagation and stateful automation for the Tripwire engine.
//!
//! A [`World`] owns a graph of trigger nodes. Firing a node for an actor
//! runs its kind-specific behaviour and forwards the activation along its
//! link; memory nodes remember actors with expiring records, threshold
//! evaluators branch on what those memories measure, and motion
//! controllers drive timed property changes on host entities.
//!
//! # Modules
//!
//! - [`blueprint`] -- Declarative node graphs, stimuli and the sandbox host
//! - [`clock`] -- Wall and manual clocks, millisecond conversions
//! - [`codec`] -- Versioned binary encoding shared by every persisted type
//! - [`config`] -- Configuration loading from `tripwire-config.yaml`
//! - [`diagnostic`] -- Deduplicated configuration warnings
//! - [`error`] -- [`GraphError`] for graph construction and editing
//! - [`gate`] -- Event-name registry and kill subscriptions
//! - [`host`] -- The [`Host`] boundary and an in-memory [`StubHost`]
//! - [`memory`] -- Per-actor expiring records with named counters
//! - [`nodes`] -- The eight node kinds and their firing rules
//! - [`persist`] -- Checksummed world save files
//! - [`random`] -- Counter rolls
//! - [`timer`] -- Motion tick scheduling
//! - [`world`] -- The node arena and propagation driver

pub mod blueprint;
pub mod clock;
pub mod codec;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod gate;
pub mod host;
pub mod memory;
pub mod nodes;
pub mod persist;
pub mod random;
pub mod timer;
pub mod world;

pub use blueprint::{Action, Blueprint, BuildDefaults, Sandbox, SandboxConfig, Stimulus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, TripwireConfig};
pub use diagnostic::Diagnostic;
pub use error::GraphError;
pub use host::{Host, PropError, PropertyTarget, StubEntity, StubHost};
pub use memory::ActorMemory;
pub use nodes::{Node, NodeBody, NodeHeader};
pub use persist::SaveError;
pub use random::{RandomSource, SeededRandom};
pub use world::World;
