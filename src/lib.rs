//! Drone Position Tracker
//!
//! Turns a newline-delimited serial stream of per-anchor range lists into a
//! smoothed 3D position, and reports boundary crossings as single-byte
//! opcodes for a radio-linked peripheral.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod events;
pub mod utils;
pub mod hardware;
pub mod api;

// Re-export commonly used types
pub use core::{AnchorSet, Axis, DistanceVector, Reading, ValidSubset};
pub use algorithms::{MultilaterationSolver, Solution, SolveStatus};
pub use processing::{
    CycleOutcome, CycleUpdate, ExponentialFilter, FrameParser, MeasurementParser, PositionTracker,
    SkipReason, TelemetryPacket, TrackerStats,
};
pub use events::{Direction, ThresholdDetector, ThresholdEvent};
pub use utils::{ConfigError, SerialSettings, SolverSettings, ThresholdSettings, TrackerConfig};
pub use hardware::{CommError, CommResult, CommandSink, RangingLink};
pub use api::{
    CallbackHandle, PollReport, PositionUpdate, SessionHandle, TrackerError, TrackerEvent,
    TrackingSession,
};
