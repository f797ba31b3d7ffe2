//! Unified error handling for the bridge
//!
//! Only transport failures are meant to reach a caller as hard errors.
//! Everything that goes wrong inside a lane worker is folded into an
//! ERROR result envelope before it can escape.

use std::fmt;

/// Error type shared by the broker, workers, store and front door
#[derive(Debug)]
pub enum BridgeError {
    /// Configuration-related errors
    Configuration(String),

    /// Broker connection, declaration or publish failures
    Transport(String),

    /// Failures raised by a collaborator while a delivery is processed
    Processing(String),

    /// The caller's wait deadline elapsed before a result was stored
    Timeout(String),

    /// Malformed input from a caller
    Validation(String),

    /// Token verification failures
    Unauthorized(String),

    /// JSON encode/decode failures
    Serialization(serde_json::Error),

    /// Internal system errors
    Internal(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            BridgeError::Transport(msg) => write!(f, "Transport error: {msg}"),
            BridgeError::Processing(msg) => write!(f, "Processing error: {msg}"),
            BridgeError::Timeout(msg) => write!(f, "Request timeout: {msg}"),
            BridgeError::Validation(msg) => write!(f, "Validation error: {msg}"),
            BridgeError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            BridgeError::Serialization(err) => write!(f, "Serialization error: {err}"),
            BridgeError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err)
    }
}

impl From<lapin::Error> for BridgeError {
    fn from(err: lapin::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for BridgeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        BridgeError::Unauthorized(err.to_string())
    }
}

impl BridgeError {
    /// True for failures that mean the broker could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::core::error::BridgeError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::BridgeError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! processing_error {
    ($msg:expr) => {
        $crate::core::error::BridgeError::Processing($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::BridgeError::Processing(format!($fmt, $($arg)*))
    };
}
