//! Real-time run loop.
//!
//! [`run`] drives a [`World`] on a fixed `tokio` interval. Each tick it
//! applies the stimuli scheduled for that tick, then pumps the world's
//! motion timers. The world reads time from a [`TokioClock`], so motion
//! timing follows the runtime's clock and a paused test runtime can fast
//! forward through a whole run.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tripwire_core::clock::{self, Clock};
use tripwire_core::{Action, Stimulus, StubHost, World};

/// Shortest runner tick.
const MIN_TICK_MS: u64 = 1;

/// A clock that follows `tokio`'s notion of time from a wall-clock anchor.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    /// Start a clock reading `anchor` now.
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        clock::saturating_add(self.anchor, elapsed)
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Runner ticks executed.
    pub ticks: u64,
    /// Fire stimuli the world accepted.
    pub fired: u64,
    /// Fire stimuli the world rejected.
    pub rejected: u64,
    /// Kill-monitor counts caused by kill stimuli.
    pub kills_counted: u64,
    /// Motion timer ticks pumped.
    pub motion_ticks: u64,
}

/// Run `world` for `ticks` runner ticks of `tick_interval_ms` each.
///
/// `stimuli` must be sorted by `at_tick`; ticks are numbered from 1.
pub async fn run(
    world: &mut World<StubHost>,
    stimuli: &[Stimulus],
    ticks: u64,
    tick_interval_ms: u64,
) -> RunSummary {
    let period = Duration::from_millis(tick_interval_ms.max(MIN_TICK_MS));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut summary = RunSummary::default();
    let mut pending = stimuli.iter().peekable();

    info!(ticks, tick_interval_ms, stimuli = stimuli.len(), "run starting");

    for tick in 1..=ticks {
        interval.tick().await;
        while let Some(stimulus) = pending.next_if(|s| s.at_tick <= tick) {
            apply(world, stimulus, &mut summary);
        }
        let pumped = world.pump();
        summary.motion_ticks = summary
            .motion_ticks
            .saturating_add(u64::try_from(pumped).unwrap_or(u64::MAX));
        summary.ticks = tick;
    }

    if pending.peek().is_some() {
        warn!(left = pending.count(), "run ended with stimuli still pending");
    }
    info!(?summary, diagnostics = world.diagnostics().len(), "run finished");
    summary
}

fn apply(world: &mut World<StubHost>, stimulus: &Stimulus, summary: &mut RunSummary) {
    let actor = stimulus.actor;
    match &stimulus.action {
        Action::Fire(node) => {
            if world.fire(*node, actor) {
                summary.fired = summary.fired.saturating_add(1);
            } else {
                summary.rejected = summary.rejected.saturating_add(1);
            }
        }
        Action::Kill(victim) => {
            let counted = world.report_kill(actor, victim);
            summary.kills_counted = summary
                .kills_counted
                .saturating_add(u64::try_from(counted).unwrap_or(u64::MAX));
        }
        Action::Move(region) => world.host_mut().move_actor(actor, region.as_deref()),
    }
    debug!(tick = stimulus.at_tick, %actor, action = ?stimulus.action, "stimulus applied");
}
