//! Error types for Callwire Core.

use thiserror::Error;

/// Errors raised while building, hashing, signing or decoding protocol values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The caller supplied a request shape the protocol cannot express.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Unknown or unusable signature scheme / identity configuration.
    #[error("unsupported identity: {0}")]
    UnsupportedIdentity(String),

    /// The key or signature backend failed.
    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("delegation expired at {expiration} (now {now})")]
    DelegationExpired { expiration: u64, now: u64 },

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
