//! Link traits for the inbound ranging stream and outbound command channel

use crate::hardware::{CommError, CommResult};

/// Byte-oriented inbound ranging link, exclusively owned by one session
pub trait RangingLink: Send {
    /// Append every byte that is ready right now to `buf`.
    ///
    /// Never waits for more data; `Ok(0)` means nothing was pending.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> CommResult<usize>;

    /// Check if the link is still open
    fn is_open(&self) -> bool;

    /// Close the link. Calling this on a closed link does nothing.
    fn close(&mut self);

    /// Human readable identifier (port name)
    fn name(&self) -> &str;
}

/// Single-byte opcode channel towards the radio-linked peripheral
pub trait CommandSink: Send {
    /// Fire-and-forget send; no acknowledgement is awaited
    fn send(&mut self, opcode: u8) -> CommResult<()>;

    /// Whether an actuation link is attached at all
    fn is_available(&self) -> bool;
}

/// Command sink used when no radio link is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommandSink;

impl CommandSink for NullCommandSink {
    fn send(&mut self, _opcode: u8) -> CommResult<()> {
        Err(CommError::LinkUnavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}
