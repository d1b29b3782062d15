//! Boundary-crossing detection and scoreboard events

pub mod threshold;

pub use threshold::{Direction, LatchState, ThresholdDetector, ThresholdEvent};
