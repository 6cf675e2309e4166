//! Periodic timers for motion controllers.
//!
//! Each node has at most one timer. The world pops due timers in
//! `(due, node)` order and decides whether to re-arm them.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tripwire_types::NodeId;

/// An armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    /// When the timer next fires.
    pub due: DateTime<Utc>,
    /// Period between firings.
    pub interval: TimeDelta,
}

/// Every armed timer in a world.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    timers: BTreeMap<NodeId, Timer>,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `node`'s timer.
    pub fn schedule(&mut self, node: NodeId, due: DateTime<Utc>, interval: TimeDelta) {
        self.timers.insert(node, Timer { due, interval });
    }

    /// Disarm `node`'s timer. Returns whether one was armed.
    pub fn cancel(&mut self, node: NodeId) -> bool {
        self.timers.remove(&node).is_some()
    }

    /// `node`'s timer, if armed.
    pub fn get(&self, node: NodeId) -> Option<Timer> {
        self.timers.get(&node).copied()
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(NodeId, Timer)> {
        let (node, timer) = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .min_by_key(|(node, timer)| (timer.due, **node))
            .map(|(node, timer)| (*node, *timer))?;
        self.timers.remove(&node);
        Some((node, timer))
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn pops_in_due_then_id_order() {
        let mut queue = TimerQueue::new();
        let step = TimeDelta::milliseconds(10);
        queue.schedule(NodeId(3), t(20), step);
        queue.schedule(NodeId(2), t(20), step);
        queue.schedule(NodeId(1), t(30), step);

        assert!(queue.pop_due(t(10)).is_none());
        assert_eq!(queue.pop_due(t(25)).map(|(n, _)| n), Some(NodeId(2)));
        assert_eq!(queue.pop_due(t(25)).map(|(n, _)| n), Some(NodeId(3)));
        assert!(queue.pop_due(t(25)).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn one_timer_per_node() {
        let mut queue = TimerQueue::new();
        queue.schedule(NodeId(1), t(5), TimeDelta::milliseconds(1));
        queue.schedule(NodeId(1), t(50), TimeDelta::milliseconds(1));
        assert_eq!(queue.get(NodeId(1)).unwrap().due, t(50));
        assert!(queue.cancel(NodeId(1)));
        assert!(!queue.cancel(NodeId(1)));
        assert!(queue.is_empty());
    }
}
