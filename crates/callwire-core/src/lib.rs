//! # Callwire Core
//!
//! Pure primitives for talking to a replicated canister platform: principals,
//! request ids, identities, delegations, signed envelopes and certificates.
//!
//! This crate performs no I/O. Everything here is computation over bytes.
//!
//! ## Key Types
//!
//! - [`Principal`] - Opaque identifier of a user or canister
//! - [`Request`] - Content of a `query`, `call` or `read_state` request
//! - [`RequestId`] - Representation-independent SHA-256 hash of a request
//! - [`Identity`] - Anonymous, own-key or delegated signer
//! - [`EnvelopeSigner`] - Turns a request into signed CBOR bytes
//! - [`Certificate`] - Hash tree of certified state, with path lookup
//!
//! ## Signing Flow
//!
//! ```text
//! Request --request_id()--> RequestId
//!    |                          |
//!    |              separator || id --Identity::sign--> Signature
//!    v                                                     |
//! Envelope { content, sender_pubkey, sender_sig, sender_delegation }
//!    |
//!    +--encode--> 55799(CBOR)
//! ```

pub mod certificate;
pub mod crypto;
pub mod delegation;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod principal;
pub mod request;
pub mod request_id;

pub use certificate::{
    parse_read_state_response, request_status_field, request_status_path, Certificate,
    CertificateDelegation, HashTree, LookupResult,
};
pub use crypto::{verify_signature, KeyPair, Scheme};
pub use delegation::{Delegation, DelegationChain, SignedDelegation};
pub use domain::{DomainSeparators, DELEGATION_DOMAIN_SEPARATOR, REQUEST_DOMAIN_SEPARATOR};
pub use envelope::{Envelope, EnvelopeSigner, SignedRequest};
pub use error::{CoreError, Result};
pub use identity::{Identity, Signature};
pub use principal::Principal;
pub use request::{CallContent, Label, Path, ReadStateContent, Request, RequestType};
pub use request_id::RequestId;
