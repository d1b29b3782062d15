//! Session API
//!
//! Owns the poll loop and fans position updates and threshold events out to
//! registered callbacks.

pub mod callback;
pub mod session;
pub mod types;

pub use callback::{CallbackHandle, EventCallback, PositionCallback, Subscribers};
pub use session::{SessionHandle, TrackingSession};
pub use types::{PollReport, PositionUpdate, TrackerError, TrackerEvent, TrackerResult};
