//! Error types for kook-gateway.

use thiserror::Error;

/// Errors that can occur in gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway endpoint lookup failed.
    #[error("gateway lookup failed: {0}")]
    Locator(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-zero application code.
    #[error("api error {code}: {message}")]
    Api {
        /// Application status code.
        code: i64,
        /// Message returned by the API.
        message: String,
    },

    /// The gateway rejected the bot token; a new credential is required.
    #[error("credential rejected by gateway (code {code}); re-authenticate with a new token")]
    CredentialRejected {
        /// Hello status code.
        code: u32,
    },

    /// Consecutive connection failures reached the configured ceiling.
    #[error("gave up after {attempts} consecutive failed connection attempts: {last_error}")]
    RetriesExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] kook_proto::ProtoError),
}

impl GatewayError {
    /// Whether retrying with the same credential can never succeed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CredentialRejected { .. })
    }

    /// Whether the failure is network-level and worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Locator(_) | Self::Http(_) | Self::Io(_))
    }
}
