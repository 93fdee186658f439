//! Centralized error types for the client
//!
//! All client errors are represented by the `SinkError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, SinkError>`.

use std::fmt;
use std::path::PathBuf;

/// All client errors
#[derive(Debug)]
pub enum SinkError {
    // === Programmer errors ===
    /// Operation not allowed in the current connection state
    InvalidState { message: &'static str },
    /// Malformed call argument (thrown before anything reaches the network)
    InvalidArgument { field: &'static str, reason: String },
    /// No tokio runtime to drive the connection
    NoRuntime,

    // === Connection ===
    /// Command submitted (or still buffered) after the connection closed
    ConnectionClosed,
    /// Server answered a call with an error
    Remote { message: String },
    /// Server sent something that does not fit the protocol
    Protocol { message: String },
    /// Socket-level failure reported by the transport
    Transport { message: String },

    // === Config ===
    /// Failed to read the config file
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
}

impl SinkError {
    /// Shorthand for an argument validation failure
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error means the connection can no longer be used
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { message } => write!(f, "Invalid state: {}", message),
            Self::InvalidArgument { reason, .. } => write!(f, "{}", reason),
            Self::NoRuntime => write!(f, "No tokio runtime available to drive the connection"),
            Self::ConnectionClosed => write!(f, "Connection is closed"),
            Self::Remote { message } => write!(f, "Server error: {}", message),
            Self::Protocol { message } => write!(f, "Protocol error: {}", message),
            Self::Transport { message } => write!(f, "Transport error: {}", message),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
        }
    }
}

/// Alias for Result with SinkError
pub type Result<T> = std::result::Result<T, SinkError>;
