//! Domain error types

use thiserror::Error;

use super::Role;

/// Errors that can occur while driving a serial terminal
#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Failed to configure {port}: {reason}")]
    Configure { port: String, reason: String },

    #[error("No {0} connection is open")]
    NotConnected(Role),

    #[error("Write to {port} failed: {reason}")]
    WriteFailed { port: String, reason: String },

    #[error("Serial device error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile error: {0}")]
    Profile(String),
}

impl From<serialport::Error> for TerminalError {
    fn from(e: serialport::Error) -> Self {
        TerminalError::Device(e.to_string())
    }
}

impl From<std::io::Error> for TerminalError {
    fn from(e: std::io::Error) -> Self {
        TerminalError::Device(e.to_string())
    }
}

/// Result type alias for terminal operations
pub type TerminalResult<T> = Result<T, TerminalError>;
