//! Error types for the relay.
//!
//! Defines the main error enum used throughout the crate, split between the
//! credential layer, the execution layer, and the SQL text collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The private key file is missing or cannot be read.
    #[error("Key unreadable: {0}")]
    KeyUnreadable(String),

    /// The private key could not be decrypted or parsed (wrong passphrase, bad format).
    #[error("Key decryption failed: {0}")]
    KeyDecryptionFailed(String),

    /// The loaded key could not produce a token signature.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Session login was rejected or never performed (SSO).
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The plan-only validation request was not accepted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The remote system reported the statement as failed.
    #[error("Query failed: {0}")]
    RemoteQuery(String),

    /// The client-side deadline elapsed while waiting for completion.
    #[error("Query timed out: {0}")]
    TimedOut(String),

    /// The caller cancelled the execution while it was still running.
    #[error("Query cancelled: {0}")]
    Cancelled(String),

    /// Network failure or malformed response from the remote API.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No SQL text is registered under the requested name.
    #[error("SQL text not found: {0}")]
    SqlTextNotFound(String),

    /// Configuration errors (missing required fields, invalid file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Distinguishable failure kind, carried in structured outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    KeyUnreadable,
    KeyDecryptionFailed,
    SigningFailed,
    AuthFailed,
    ValidationFailed,
    RemoteQueryFailed,
    TimedOut,
    Cancelled,
    TransportError,
    SqlTextNotFound,
    Config,
}

impl RelayError {
    /// Creates a key-unreadable error with the given message.
    pub fn key_unreadable(msg: impl Into<String>) -> Self {
        Self::KeyUnreadable(msg.into())
    }

    /// Creates a key-decryption error with the given message.
    pub fn key_decryption(msg: impl Into<String>) -> Self {
        Self::KeyDecryptionFailed(msg.into())
    }

    /// Creates a signing error with the given message.
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::SigningFailed(msg.into())
    }

    /// Creates an authentication error with the given message.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a remote query error with the given message.
    pub fn remote_query(msg: impl Into<String>) -> Self {
        Self::RemoteQuery(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timed_out(msg: impl Into<String>) -> Self {
        Self::TimedOut(msg.into())
    }

    /// Creates a cancellation error with the given message.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a SQL-text-not-found error with the given message.
    pub fn sql_not_found(msg: impl Into<String>) -> Self {
        Self::SqlTextNotFound(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyUnreadable(_) => ErrorKind::KeyUnreadable,
            Self::KeyDecryptionFailed(_) => ErrorKind::KeyDecryptionFailed,
            Self::SigningFailed(_) => ErrorKind::SigningFailed,
            Self::AuthFailed(_) => ErrorKind::AuthFailed,
            Self::Validation(_) => ErrorKind::ValidationFailed,
            Self::RemoteQuery(_) => ErrorKind::RemoteQueryFailed,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::SqlTextNotFound(_) => ErrorKind::SqlTextNotFound,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::KeyUnreadable(_) | Self::KeyDecryptionFailed(_) | Self::SigningFailed(_) => {
                "Credential Error"
            }
            Self::AuthFailed(_) => "Authentication Error",
            Self::Validation(_) | Self::SqlTextNotFound(_) => "Input Error",
            Self::RemoteQuery(_) | Self::TimedOut(_) | Self::Cancelled(_) => "Query Error",
            Self::Transport(_) => "Transport Error",
            Self::Config(_) => "Configuration Error",
        }
    }

    /// Returns true if this error was raised before any statement reached the
    /// compute layer.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            Self::KeyUnreadable(_)
                | Self::KeyDecryptionFailed(_)
                | Self::SigningFailed(_)
                | Self::AuthFailed(_)
                | Self::Validation(_)
                | Self::SqlTextNotFound(_)
                | Self::Config(_)
        )
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
