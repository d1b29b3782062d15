//! Signal and data processing modules

pub mod framing;
pub mod parser;
pub mod smoothing;
pub mod pipeline;
pub mod telemetry;

pub use framing::{FrameError, FrameParser};
pub use parser::{DecodeError, MeasurementParser};
pub use smoothing::ExponentialFilter;
pub use pipeline::{CycleOutcome, CycleUpdate, PositionTracker, SkipReason, TrackerStats};
pub use telemetry::{TelemetryError, TelemetryPacket};
