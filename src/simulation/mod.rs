//! # Simulation engine
//!
//! One simulated site on a single timeline. Each tick draws generation and
//! load from the active [`SimulationMode`](crate::domain::SimulationMode),
//! pushes the net power through the battery, appends one reading to the
//! history and persists it.
//!
//! - **generator**: time-of-day and uniform synthetic profiles
//! - **feed**: external metering feed port and the Emoncms adapter
//! - **clock**: wall-clock port, swappable in tests
//! - **engine**: the tick pipeline

pub mod clock;
pub mod engine;
pub mod feed;
pub mod generator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    EnginePorts, EngineSettings, FeedRequest, ReadingSource, SimulationEngine, TickReport,
};
pub use feed::{EmoncmsFeed, FeedError, FeedProvider, FeedSample};
pub use generator::{RawSample, SyntheticGenerator};
