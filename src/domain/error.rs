use thiserror::Error;

/// Failures the simulator distinguishes.
///
/// Everything except [`SimError::ConfigurationInvalid`] is recoverable: the
/// tick path degrades (fallback generation, in-memory only history) instead of
/// stopping.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimError {
    /// Feed or weather fetch failed or timed out.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Stored state could not be parsed; treated as "no history".
    #[error("persisted state is corrupt: {0}")]
    PersistenceCorrupt(String),
    /// Writing state failed; the simulation keeps running in memory.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    /// End date lies before the start date.
    #[error("invalid filter range: end date {end} is before start date {start}")]
    InvalidFilterRange { start: String, end: String },
    /// Out-of-range configuration; prevents the engine from starting.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

impl SimError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::ConfigurationInvalid(_))
    }
}
