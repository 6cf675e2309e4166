//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup, the run and
//! the final save so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tripwire_core::config::ConfigError,
    },

    /// The blueprint or sandbox could not be built.
    #[error("graph error: {source}")]
    Graph {
        /// The underlying graph error.
        #[from]
        source: tripwire_core::error::GraphError,
    },

    /// Loading or saving the world failed.
    #[error("save error: {source}")]
    Save {
        /// The underlying save error.
        #[from]
        source: tripwire_core::persist::SaveError,
    },
}
