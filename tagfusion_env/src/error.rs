//! Error types for the reader collaborator.

use std::fmt;
use thiserror::Error;

/// The collaborator operation that was being performed when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderOp {
    Connect,
    ApplySettings,
    ApplyDefaultSettings,
    Start,
    Stop,
    Disconnect,
}

impl fmt::Display for ReaderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderOp::Connect => "connect",
            ReaderOp::ApplySettings => "apply_settings",
            ReaderOp::ApplyDefaultSettings => "apply_default_settings",
            ReaderOp::Start => "start",
            ReaderOp::Stop => "stop",
            ReaderOp::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// Errors reported by a reader collaborator.
///
/// None of these are fatal to TagFusion: callers route them to a failure
/// sink and carry on with their schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    /// The reader could not be reached or the session dropped.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The reader rejected a settings value.
    #[error("Configuration rejected: {0}")]
    Configuration(String),

    /// An operation was attempted while not connected.
    #[error("Reader not connected")]
    NotConnected,

    /// Any other reader-side (SDK) failure.
    #[error("Reader error: {0}")]
    Sdk(String),
}

impl ReaderError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReaderError::connection("xarray-11-22-33 refused");
        assert_eq!(err.to_string(), "Connection error: xarray-11-22-33 refused");
        assert_eq!(ReaderError::NotConnected.to_string(), "Reader not connected");
    }

    #[test]
    fn test_op_display() {
        assert_eq!(ReaderOp::ApplyDefaultSettings.to_string(), "apply_default_settings");
    }
}
