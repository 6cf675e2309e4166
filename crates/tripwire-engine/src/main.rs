//! Engine binary for Tripwire.
//!
//! Loads a configuration file, populates a sandbox host, builds (or
//! restores) the trigger graph, replays the configured stimuli in real time
//! and saves the world on the way out.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`tripwire-config.yaml`, or the path in argv[1])
//! 2. Initialize structured logging (tracing)
//! 3. Build the sandbox host
//! 4. Restore the world from `engine.save_path`, or build the blueprint
//! 5. Resolve stimuli and run
//! 6. Save the world if a save path is configured

mod error;
mod runner;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tripwire_core::config::{LoggingConfig, TripwireConfig};
use tripwire_core::{SeededRandom, World};

use crate::error::EngineError;
use crate::runner::TokioClock;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "tripwire-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, graph construction or the final save
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let (config, found) = load_config(&config_path)?;

    init_logging(&config.logging);
    info!("tripwire-engine starting");
    if !found {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        seed = config.engine.seed,
        tick_interval_ms = config.engine.tick_interval_ms,
        run_ticks = config.engine.run_ticks,
        nodes = config.blueprint.nodes.len(),
        stimuli = config.blueprint.stimuli.len(),
        "Configuration loaded"
    );

    let sandbox = config.sandbox.build().map_err(EngineError::from)?;
    info!(
        actors = sandbox.actors.len(),
        entities = sandbox.entities.len(),
        "Sandbox host populated"
    );

    let clock = TokioClock::new(Utc::now());
    let rng = SeededRandom::new(config.engine.seed);
    let restored = match &config.engine.save_path {
        Some(path) if path.exists() => Some(
            World::load_from_file(path, clock, rng.clone(), sandbox.host.clone())
                .map_err(EngineError::from)?,
        ),
        _ => None,
    };
    let (mut world, ids) = if let Some(world) = restored {
        let ids: BTreeMap<String, _> = world
            .nodes()
            .map(|(id, node)| (node.header.name.clone(), id))
            .collect();
        info!(nodes = ids.len(), "World restored from save");
        (world, ids)
    } else {
        let mut world = World::new(clock, rng, sandbox.host.clone());
        let ids = config
            .blueprint
            .build(&mut world, &config.build_defaults(), &sandbox.entities)
            .map_err(EngineError::from)?;
        (world, ids)
    };

    for diagnostic in world.diagnostics() {
        warn!(%diagnostic, "Graph diagnostic");
    }

    let stimuli = config
        .blueprint
        .stimuli(&ids, &sandbox)
        .map_err(EngineError::from)?;
    let summary = runner::run(
        &mut world,
        &stimuli,
        config.engine.run_ticks,
        config.engine.tick_interval_ms,
    )
    .await;

    for (actor, message) in world.host().messages() {
        info!(%actor, text = %message, "Message delivered");
    }

    if let Some(path) = &config.engine.save_path {
        world.save_to_file(path).map_err(EngineError::from)?;
    }

    info!(
        ticks = summary.ticks,
        fired = summary.fired,
        rejected = summary.rejected,
        motion_ticks = summary.motion_ticks,
        "tripwire-engine shutdown complete"
    );
    Ok(())
}

/// Load the configuration, falling back to defaults when the file is absent.
/// Returns whether the file was found.
fn load_config(path: &Path) -> Result<(TripwireConfig, bool), EngineError> {
    if path.exists() {
        Ok((TripwireConfig::from_file(path)?, true))
    } else {
        Ok((TripwireConfig::default(), false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
