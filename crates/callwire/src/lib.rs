//! # Callwire
//!
//! Client agent for replicated canister platforms: build a request, sign it
//! with an identity, submit it, and for updates poll the certified state
//! until the outcome is known.
//!
//! ## Overview
//!
//! - **Queries** run on a single replica and answer immediately.
//! - **Updates** (calls) are only acknowledged on submission; their outcome
//!   is read from `request_status` in the certified state tree.
//! - **read_state** fetches a certificate for arbitrary state paths.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use callwire::{Agent, Identity, Principal};
//! use callwire::transport::HttpTransport;
//!
//! async fn example() -> callwire::Result<()> {
//!     let transport = HttpTransport::new("https://icp-api.io")?;
//!     let agent = Agent::new(Identity::anonymous(), transport);
//!
//!     let ledger: Principal = "ryjl3-tyaaa-aaaaa-aaaba-cai".parse()?;
//!     let arg = b"DIDL\x00\x00".to_vec();
//!     let supply = agent.query(&ledger, "totalSupply", arg).await?;
//!     println!("{supply}");
//!     Ok(())
//! }
//! ```
//!
//! ## Update Flow
//!
//! ```text
//! Agent                                  Replica
//!   |-------- call (envelope) ------------->|
//!   |<------- 202 accepted -----------------|
//!   |-------- read_state [status] --------->|
//!   |<------- certificate (processing) -----|
//!   |          ... sleep(delay) ...         |
//!   |-------- read_state [status] --------->|
//!   |<------- certificate (replied) --------|
//! ```
//!
//! ## Re-exports
//!
//! - `callwire::core` - principals, request ids, identities, envelopes, certificates
//! - `callwire::transport` - the transport trait and its implementations

pub mod agent;
pub mod codec;
pub mod config;
pub mod error;
pub mod poll;
pub mod response;
pub mod status;

// Re-export component crates
pub use callwire_core as core;
pub use callwire_transport as transport;

pub use agent::Agent;
pub use codec::{CandidCodec, RawCodec, ReplyCodec, ReturnTypes};
pub use config::{AgentConfig, PollConfig};
pub use error::{AgentError, Result};
pub use poll::{ExponentialBackoff, FixedDelay, Observation, PollOutcome, PollPolicy, Poller};
pub use response::QueryResponse;
pub use status::RequestStatus;

// Re-export commonly used core types
pub use callwire_core::{
    Certificate, DelegationChain, DomainSeparators, Identity, KeyPair, Principal, RequestId,
    Scheme,
};
