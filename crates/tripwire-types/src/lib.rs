//! Shared type definitions for the Tripwire automation engine.
//!
//! This crate is the single source of truth for the plain data the engine,
//! its configuration and its save files agree on. It holds no behaviour
//! beyond pure helpers on those values.
//!
//! # Modules
//!
//! - [`ids`] -- Identifiers for actors, entities and graph nodes
//! - [`enums`] -- Comparison operators, scope policies, motion kinds, node kinds
//! - [`motion`] -- Motion frames and the [`Timeline`] that sequences them
//! - [`threshold`] -- Threshold tables for threshold evaluators
//! - [`structs`] -- Counter rolls, property values, schedule windows

pub mod enums;
pub mod ids;
pub mod motion;
pub mod structs;
pub mod threshold;

// Re-export all public types at crate root for convenience.
pub use enums::{Comparison, MotionKind, NodeKind, ScopePolicy};
pub use ids::{ActorId, EntityId, NodeId};
pub use motion::{MAX_FRAMES, MotionFrame, Timeline, TimelineError};
pub use structs::{PropValue, RollRange, ScheduleWindow};
pub use threshold::{MAX_THRESHOLDS, ThresholdEntry, ThresholdError, ThresholdSpec};
