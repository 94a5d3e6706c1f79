//! # Callwire Transport
//!
//! Moves signed envelopes between the agent and a replica.
//!
//! - [`Transport`] - async trait with one method per replica endpoint
//! - [`HttpTransport`] - `application/cbor` over HTTPS via `reqwest`
//! - [`ScriptedReplica`] - in-memory replica with queued responses, for tests

pub mod error;
pub mod http;
pub mod transport;

pub use error::{Result, TransportError};
pub use http::{HttpConfig, HttpTransport};
pub use transport::{
    memory::{Endpoint, ScriptedReplica, Submission},
    Transport,
};
