//! In-memory links for testing and dry runs

use crate::hardware::{CommandSink, CommError, CommResult, RangingLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockLinkState {
    pending: VecDeque<Vec<u8>>,
    open: bool,
    close_count: u32,
    fail_next_read: Option<CommError>,
}

/// Mock ranging link fed through a [`MockLinkHandle`]
pub struct MockLink {
    name: String,
    state: Arc<Mutex<MockLinkState>>,
}

/// Test-side handle to a [`MockLink`] that may already live in another thread
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockLinkState>>,
}

fn lock(state: &Arc<Mutex<MockLinkState>>) -> MutexGuard<'_, MockLinkState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLink {
    /// Create an open mock link
    pub fn new(name: &str) -> Self {
        let state = MockLinkState {
            open: true,
            ..Default::default()
        };
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockLinkHandle {
    /// Queue a chunk; each chunk is delivered by one `read_available` call
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state).pending.push_back(bytes.to_vec());
    }

    /// Queue a complete newline-terminated frame
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(&bytes);
    }

    /// Make the next read fail with `error`
    pub fn fail_next_read(&self, error: CommError) {
        lock(&self.state).fail_next_read = Some(error);
    }

    /// Simulate the device disappearing
    pub fn disconnect(&self) {
        lock(&self.state).open = false;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Number of times the owner closed the link
    pub fn close_count(&self) -> u32 {
        lock(&self.state).close_count
    }
}

impl RangingLink for MockLink {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> CommResult<usize> {
        let mut state = lock(&self.state);

        if !state.open {
            return Err(CommError::ConnectionLost {
                link: self.name.clone(),
            });
        }

        if let Some(error) = state.fail_next_read.take() {
            return Err(error);
        }

        match state.pending.pop_front() {
            Some(chunk) => {
                buf.extend_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Command sink that records every opcode it is given
#[derive(Clone)]
pub struct MockCommandSink {
    sent: Arc<Mutex<Vec<u8>>>,
    available: bool,
}

impl MockCommandSink {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            available: true,
        }
    }

    /// A sink that reports no attached link
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Get all opcodes sent so far
    pub fn sent(&self) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockCommandSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSink for MockCommandSink {
    fn send(&mut self, opcode: u8) -> CommResult<()> {
        if !self.available {
            return Err(CommError::LinkUnavailable);
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(opcode);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available
    }
}
