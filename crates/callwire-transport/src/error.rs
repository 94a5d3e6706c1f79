//! Error types for transports.

use thiserror::Error;

/// Errors that can occur while moving envelopes to and from a replica.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The replica answered with a non-success HTTP status.
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, TLS, I/O).
    #[error("network error: {0}")]
    Network(String),

    /// The transport has been shut down.
    #[error("transport disconnected")]
    Disconnected,

    /// A scripted transport ran out of responses or was told to fail.
    #[error("scripted transport: {0}")]
    Script(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
