//! # Callwire Testkit
//!
//! Testing utilities for Callwire.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: request ids and signatures with known expected values
//! - **Generators**: Proptest strategies for requests, principals and content maps
//! - **Fixtures**: deterministic identities, canned certificates and a
//!   scripted replica wired to an agent
//!
//! ## Golden Vectors
//!
//! ```rust
//! use callwire_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use callwire_testkit::generators::request;
//!
//! proptest! {
//!     #[test]
//!     fn request_id_is_deterministic(r in request()) {
//!         prop_assert_eq!(r.request_id().unwrap(), r.clone().request_id().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use callwire_testkit::fixtures::{canister, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let agent = fixture.agent();
//! let id = agent.submit(&canister(1), "inc", vec![]).await?;
//! fixture.script_reply(&id, b"DIDL\x00\x00").await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{canister, delegated_identity, ed25519_identity, TestFixture, TEST_EXPIRY};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector, SignatureVector};
