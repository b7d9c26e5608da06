//! Error types surfaced by clocks, configuration loading and trigger sequences.

/// Errors that can end a trigger sequence or reject a configuration.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// A `SimulatedClock` was read before the test driver assigned an instant.
    #[error("simulated clock queried before set_now was called")]
    ClockNotSet,

    /// Instant arithmetic left the range chrono can represent.
    #[error("instant arithmetic out of range")]
    InstantOutOfRange,

    /// The wrapped computation failed. The sequence that invoked it ends here.
    #[error("computation failed: {0}")]
    Computation(#[source] anyhow::Error),

    /// The configuration file or environment could not be read.
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// The configuration was read but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which setting was rejected and why.
        reason: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CadenceError>;
