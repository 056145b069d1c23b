//! BOSH session error types.
//!
//! # Error Classification
//!
//! Every handshake error is terminal for the connect attempt. Nothing is
//! retried inside the engine; retry policy belongs to the caller.
//!
//! | Variant                | Raised by                    | Recovery                         |
//! |------------------------|------------------------------|----------------------------------|
//! | `Transport`            | HTTP layer                   | caller may retry the request     |
//! | `Protocol`             | any unexpected frame shape   | restart from `Init`              |
//! | `UnsupportedMechanism` | mechanism selection          | no credentials were transmitted  |
//! | `Authentication`       | SASL success check           | restart from `Init`              |
//! | `Challenge`            | DIGEST-MD5/CRAM-MD5 rspauth  | possible tamper, restart         |
//! | `Bind`                 | resource binding             | restart from `Init`              |
//!
//! In steady state a failed poll is reported through
//! [`StanzaHandler::on_error`](crate::protocol::StanzaHandler::on_error)
//! and leaves the session (sid/rid) intact.

use thiserror::Error;

/// BOSH engine errors.
#[derive(Error, Debug)]
pub enum BoshError {
    /// HTTP or network failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No advertised SASL mechanism is compatible with the credential mode.
    #[error("Unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Credentials rejected or mechanism mismatch.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Mutual-auth confirmation missing or invalid.
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// Resource binding failed.
    #[error("Bind error: {0}")]
    Bind(String),

    /// SASL response could not be computed.
    #[error("SASL error: {0}")]
    Sasl(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Operation requires a connected session.
    #[error("Session not connected")]
    NotConnected,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoshError {
    /// Whether this error ends the connect attempt.
    ///
    /// Only transport failures leave a session that the caller could keep
    /// using; every other variant requires a fresh connect.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BoshError::Transport(_) | BoshError::NotConnected)
    }
}

/// Result type alias for BOSH operations
pub type Result<T> = std::result::Result<T, BoshError>;

impl From<reqwest::Error> for BoshError {
    fn from(err: reqwest::Error) -> Self {
        BoshError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for BoshError {
    fn from(err: toml::de::Error) -> Self {
        BoshError::Config(err.to_string())
    }
}

impl From<base64::DecodeError> for BoshError {
    fn from(err: base64::DecodeError) -> Self {
        BoshError::Protocol(format!("Base64 decode error: {err}"))
    }
}

impl From<minidom::Error> for BoshError {
    fn from(err: minidom::Error) -> Self {
        BoshError::Protocol(format!("XML error: {err}"))
    }
}
