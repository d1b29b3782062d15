//! Hardware abstraction layer for the ranging and command links
//!
//! The inbound ranging stream and the outbound opcode channel are both
//! modelled as traits so the pipeline can run against serial ports or
//! in-memory mocks.

pub mod link;
pub mod serial;
pub mod mock;
pub mod error;

pub use link::{RangingLink, CommandSink, NullCommandSink};
pub use serial::{SerialRangingLink, SerialCommandSink};
pub use mock::{MockLink, MockLinkHandle, MockCommandSink};
pub use error::{CommError, CommResult, RecoveryStrategy};
