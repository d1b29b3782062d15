//! Common API types and data structures

use crate::events::ThresholdEvent;
use crate::hardware::CommError;
use crate::processing::CycleOutcome;
use crate::utils::config::ConfigError;
use nalgebra::Vector3;
use thiserror::Error;

/// Result type for session operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Session-level error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// Configuration rejected before polling started
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Ranging or command link failure
    #[error("link error: {0}")]
    Comm(#[from] CommError),
    /// The polling thread could not be spawned or did not exit cleanly
    #[error("polling thread failure: {details}")]
    Thread { details: String },
}

/// Position published to subscribers once per poll tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// Current filtered position (origin until the first successful solve)
    pub position: Vector3<f64>,
    /// Tick counter, starting at 1
    pub sequence: u64,
    /// Whether this tick produced at least one new solve
    pub fresh: bool,
}

/// Discrete notifications delivered to event subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A boundary was crossed
    Threshold(ThresholdEvent),
    /// The ranging link failed; polling has stopped
    LinkFailed(CommError),
}

/// Result of one poll tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub bytes_read: usize,
    /// One outcome per frame completed during this tick
    pub outcomes: Vec<CycleOutcome>,
    pub commands_sent: usize,
}

impl PollReport {
    /// Number of cycles that updated the filter
    pub fn updates(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_update()).count()
    }
}
