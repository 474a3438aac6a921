//! Error types for the gateway

use thiserror::Error;

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// SSH connection failed (network, host unreachable, connect timeout)
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Authentication failed (rejected credentials, unreadable or invalid key)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Operation attempted without an active session
    #[error("SSH client not connected")]
    NotConnected,

    /// Command rejected by the whitelist or a dangerous pattern
    #[error("Command rejected by policy: {0}")]
    PolicyViolation(String),

    /// Command execution timed out
    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    /// SFTP upload, download or listing failed
    #[error("File transfer error: {0}")]
    Transfer(String),

    /// Channel-level SSH fault while running a command
    #[error("SSH transport error: {0}")]
    Transport(String),

    /// Invalid parameters provided
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        GatewayError::Connection(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        GatewayError::Authentication(msg.into())
    }

    /// Create a policy violation from a string
    pub fn policy(msg: impl Into<String>) -> Self {
        GatewayError::PolicyViolation(msg.into())
    }

    /// Create a transfer error from a string
    pub fn transfer(msg: impl Into<String>) -> Self {
        GatewayError::Transfer(msg.into())
    }

    /// Create a transport error from a string
    pub fn transport(msg: impl Into<String>) -> Self {
        GatewayError::Transport(msg.into())
    }

    /// Create an invalid params error from a string
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        GatewayError::InvalidParams(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Whether the failure was caused by the caller's input rather than the
    /// remote host or the gateway itself.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidParams(_) | GatewayError::PolicyViolation(_)
        )
    }
}
