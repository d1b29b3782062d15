//! Communication error types and handling

use thiserror::Error;

/// Communication error types for the ranging and command links
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    /// Port could not be opened
    #[error("serial port {port} unavailable: {details}")]
    PortUnavailable { port: String, details: String },
    /// Link was closed or dropped underneath us
    #[error("connection lost on {link}")]
    ConnectionLost { link: String },
    /// Read or write failed at the OS level
    #[error("I/O error during {operation}: {details}")]
    Io { operation: String, details: String },
    /// Write did not complete in time
    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// No actuation link is attached
    #[error("command link unavailable")]
    LinkUnavailable,
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

/// What the owner of a link should do after a failure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Drop this operation and keep polling
    Skip,
    /// Stop the session and report to the operator
    Fail,
}

impl CommError {
    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CommError::Timeout { .. } => RecoveryStrategy::Skip,
            CommError::LinkUnavailable => RecoveryStrategy::Skip,
            CommError::PortUnavailable { .. } => RecoveryStrategy::Fail,
            CommError::ConnectionLost { .. } => RecoveryStrategy::Fail,
            CommError::Io { .. } => RecoveryStrategy::Fail,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }

    pub(crate) fn io(operation: &str, error: impl std::fmt::Display) -> Self {
        CommError::Io {
            operation: operation.to_string(),
            details: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(CommError::LinkUnavailable.is_recoverable());
        assert!(CommError::Timeout { timeout_ms: 10 }.is_recoverable());
        assert!(!CommError::ConnectionLost { link: "COM26".into() }.is_recoverable());
        assert!(!CommError::io("read", "broken pipe").is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = CommError::PortUnavailable {
            port: "/dev/ttyUSB0".into(),
            details: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "serial port /dev/ttyUSB0 unavailable: No such file or directory"
        );
    }
}
