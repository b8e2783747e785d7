use std::time::Duration;

use thiserror::Error;

/// Core errors using thiserror for structured error handling.
///
/// Every failure the control core can report is one variant here. Callers that
/// only care about the failure class use [`CoreError::kind`].

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{what} out of range: {value} (must be {min}-{max})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("decoder did not answer `{command}` within {timeout:?}")]
    IpcTimeout { command: String, timeout: Duration },

    #[error("hardware fault on {device}")]
    HardwareFault {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("decoder rejected {0}")]
    Rejected(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("I/O failure while {context}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure classes, one per row of the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfRange,
    IpcTimeout,
    HardwareFault,
    ProtocolViolation,
    UnknownEvent,
    Rejected,
    InvalidState,
    Io,
    Config,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::OutOfRange { .. } => ErrorKind::OutOfRange,
            CoreError::IpcTimeout { .. } => ErrorKind::IpcTimeout,
            CoreError::HardwareFault { .. } => ErrorKind::HardwareFault,
            CoreError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            CoreError::UnknownEvent(_) => ErrorKind::UnknownEvent,
            CoreError::Rejected(_) => ErrorKind::Rejected,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::Io { .. } => ErrorKind::Io,
            CoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// Faults that end the dispatcher session rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::IpcTimeout | ErrorKind::HardwareFault | ErrorKind::UnknownEvent
        )
    }

    pub(crate) fn hardware(device: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::HardwareFault {
            device: device.into(),
            source,
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        CoreError::Io { context, source }
    }
}

/// Result type for the control core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = CoreError::OutOfRange {
            what: "volume",
            value: 101,
            min: 0,
            max: 100,
        };
        assert_eq!(err.to_string(), "volume out of range: 101 (must be 0-100)");

        let err = CoreError::InvalidState("no track loaded");
        assert_eq!(err.to_string(), "invalid state: no track loaded");
    }

    #[test]
    fn test_error_kinds() {
        let err = CoreError::IpcTimeout {
            command: "P".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), ErrorKind::IpcTimeout);
        assert!(err.is_fatal());

        let err = CoreError::ProtocolViolation("bad checksum".to_string());
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "strip unplugged");
        let err = CoreError::hardware("/dev/spidev0.0", io_err);

        assert!(err.source().is_some());
        assert_eq!(err.kind(), ErrorKind::HardwareFault);
        assert_eq!(err.to_string(), "hardware fault on /dev/spidev0.0");
    }
}
