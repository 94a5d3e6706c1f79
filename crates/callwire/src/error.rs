//! Error types for the agent.

use thiserror::Error;

use callwire_core::{CoreError, RequestId};
use callwire_transport::TransportError;

use crate::status::RequestStatus;

/// Errors surfaced by [`Agent`](crate::Agent) operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Building, hashing or signing the request failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The transport could not deliver the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The platform explicitly rejected the call.
    #[error("rejected with code {code}: {message}")]
    Rejected { code: u64, message: String },

    /// No terminal status was observed before the poll deadline.
    #[error("polling {request_id} timed out (last status: {last_status:?})")]
    PollTimeout {
        request_id: RequestId,
        last_status: Option<RequestStatus>,
    },

    /// A path is absent from an otherwise well-formed certificate.
    #[error("certificate has no value at {0}")]
    CertificateLookupMiss(String),

    /// The reply codec could not encode or decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// The replica answered with something that is not a valid reply.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// The call completed but its reply has already been pruned.
    #[error("request {0} is done but its reply is no longer available")]
    ReplyUnavailable(RequestId),
}

impl AgentError {
    /// Whether this is a definitive rejection by the platform.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Whether polling gave up before a terminal status.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PollTimeout { .. })
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
