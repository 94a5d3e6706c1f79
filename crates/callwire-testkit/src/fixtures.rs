//! Test fixtures and helpers.
//!
//! Deterministic identities, canned replica responses and a fixture that
//! wires an agent to a scripted replica.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ciborium::value::Value;

use callwire::{Agent, AgentConfig, FixedDelay, PollConfig};
use callwire_core::certificate::{encode_read_state_response, request_status_field};
use callwire_core::envelope::encode_tagged;
use callwire_core::request_id::encode_leb128;
use callwire_core::{
    Certificate, DelegationChain, DomainSeparators, HashTree, Identity, KeyPair, Principal,
    RequestId, Scheme,
};
use callwire_transport::ScriptedReplica;

/// Expiry used by fixtures that need a fixed timestamp (2023-05-31T22:00:00Z).
pub const TEST_EXPIRY: u64 = 1_685_570_400_000_000_000;

/// Ed25519 identity from a repeated seed byte.
pub fn ed25519_identity(seed: u8) -> Identity {
    Identity::from_key_pair(ed25519_key(seed))
}

/// secp256k1 identity from a repeated seed byte. Seed 0 is bumped to 1.
pub fn secp256k1_identity(seed: u8) -> Identity {
    Identity::from_key_pair(secp256k1_key(seed))
}

pub fn ed25519_key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes(Scheme::Ed25519, &[seed; 32]).expect("32-byte seed")
}

pub fn secp256k1_key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes(Scheme::Secp256k1, &[seed.max(1); 32]).expect("valid scalar")
}

/// An own-key identity carrying a one-link delegation from `outer_seed`
/// to `session_seed`.
pub fn delegated_identity(
    outer_seed: u8,
    session_seed: u8,
    expiration: u64,
    targets: Option<Vec<Principal>>,
) -> (Identity, DelegationChain) {
    let chain = DelegationChain::issue(
        &ed25519_key(outer_seed),
        ed25519_key(session_seed),
        expiration,
        targets,
        &DomainSeparators::default(),
    )
    .expect("delegation signing");

    let mut identity = ed25519_identity(session_seed.wrapping_add(1));
    identity
        .add_delegation(chain.clone())
        .expect("fresh identity accepts a delegation");
    (identity, chain)
}

/// A canister principal in the usual 8-byte big-endian form.
pub fn canister(id: u64) -> Principal {
    Principal::from_slice(&id.to_be_bytes()).expect("8 bytes is a valid principal")
}

/// Certificate holding only a status leaf for `request_id`.
pub fn status_certificate(request_id: &RequestId, status: &str) -> Certificate {
    certificate_with(request_id, vec![("status", status.as_bytes().to_vec())])
}

pub fn replied_certificate(request_id: &RequestId, reply: &[u8]) -> Certificate {
    certificate_with(
        request_id,
        vec![("status", b"replied".to_vec()), ("reply", reply.to_vec())],
    )
}

pub fn rejected_certificate(request_id: &RequestId, code: u64, message: &str) -> Certificate {
    certificate_with(
        request_id,
        vec![
            ("status", b"rejected".to_vec()),
            ("reject_code", encode_leb128(code)),
            ("reject_message", message.as_bytes().to_vec()),
        ],
    )
}

/// Certificate with arbitrary `request_status/<id>/<field>` leaves.
pub fn certificate_with(request_id: &RequestId, leaves: Vec<(&str, Vec<u8>)>) -> Certificate {
    let tree = HashTree::from_paths(
        leaves
            .into_iter()
            .map(|(field, value)| (request_status_field(request_id, field), value)),
    );
    Certificate::new(tree, vec![0; 48])
}

/// Encoded read_state response body around a certificate.
pub fn read_state_body(certificate: &Certificate) -> Bytes {
    Bytes::from(encode_read_state_response(certificate).expect("certificate encodes"))
}

/// Encoded `replied` query response.
pub fn query_replied_body(arg: &[u8]) -> Bytes {
    encode_map(vec![
        ("status", Value::Text("replied".into())),
        (
            "reply",
            Value::Map(vec![(Value::Text("arg".into()), Value::Bytes(arg.to_vec()))]),
        ),
    ])
}

/// Encoded `rejected` query response.
pub fn query_rejected_body(code: u64, message: &str) -> Bytes {
    encode_map(vec![
        ("status", Value::Text("rejected".into())),
        ("reject_code", Value::Integer(code.into())),
        ("reject_message", Value::Text(message.into())),
    ])
}

fn encode_map(entries: Vec<(&str, Value)>) -> Bytes {
    let map = entries
        .into_iter()
        .map(|(k, v)| (Value::Text(k.to_string()), v))
        .collect();
    Bytes::from(encode_tagged(Value::Map(map)).expect("response encodes"))
}

/// An identity and a scripted replica, ready to build agents.
pub struct TestFixture {
    pub identity: Identity,
    pub replica: Arc<ScriptedReplica>,
}

impl TestFixture {
    /// Fixture with a deterministic Ed25519 identity.
    pub fn new() -> Self {
        Self::with_identity(ed25519_identity(0x42))
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self {
            identity,
            replica: Arc::new(ScriptedReplica::new()),
        }
    }

    /// Agent with default configuration (1 s delay, 30 s timeout).
    pub fn agent(&self) -> Agent<Arc<ScriptedReplica>> {
        Agent::new(self.identity.clone(), Arc::clone(&self.replica))
    }

    /// Agent with a custom poll delay and timeout.
    pub fn agent_polling(&self, delay: Duration, timeout: Duration) -> Agent<Arc<ScriptedReplica>> {
        self.agent().with_config(AgentConfig {
            poll: PollConfig::new(timeout, FixedDelay(delay)),
            ..AgentConfig::default()
        })
    }

    /// Queue one read_state response per status, in order.
    pub async fn script_statuses(&self, request_id: &RequestId, statuses: &[&str]) {
        for status in statuses {
            let body = read_state_body(&status_certificate(request_id, status));
            self.replica.push_read_state(Ok(body)).await;
        }
    }

    pub async fn script_reply(&self, request_id: &RequestId, reply: &[u8]) {
        let body = read_state_body(&replied_certificate(request_id, reply));
        self.replica.push_read_state(Ok(body)).await;
    }

    pub async fn script_rejection(&self, request_id: &RequestId, code: u64, message: &str) {
        let body = read_state_body(&rejected_certificate(request_id, code, message));
        self.replica.push_read_state(Ok(body)).await;
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callwire::PollOutcome;
    use callwire_transport::Transport;

    #[test]
    fn test_identities_are_deterministic() {
        assert_eq!(ed25519_identity(7).sender(), ed25519_identity(7).sender());
        assert_ne!(ed25519_identity(7).sender(), ed25519_identity(8).sender());
        assert_eq!(secp256k1_identity(0).sender(), secp256k1_identity(1).sender());
    }

    #[test]
    fn test_delegated_identity_sends_as_outer() {
        let (identity, chain) = delegated_identity(0x0a, 0x0b, u64::MAX, None);
        assert_eq!(identity.sender(), chain.principal);
        assert_eq!(
            chain.principal,
            Principal::self_authenticating(&ed25519_key(0x0a).public_key_der())
        );
        chain.verify(TEST_EXPIRY, &DomainSeparators::default()).unwrap();
    }

    #[test]
    fn test_canister_layout() {
        assert_eq!(
            canister(1234).as_slice(),
            &[0, 0, 0, 0, 0, 0, 0x04, 0xd2]
        );
    }

    #[test]
    fn test_canned_certificates_read_back() {
        let id = RequestId::from_bytes([9; 32]);
        let (_, outcome) =
            PollOutcome::from_certificate(&rejected_certificate(&id, 3, "no"), &id).unwrap();
        assert_eq!(
            outcome,
            Some(PollOutcome::Rejected {
                code: 3,
                message: "no".into()
            })
        );
    }

    #[tokio::test]
    async fn test_fixture_scripts_replica() {
        let fixture = TestFixture::new();
        let id = RequestId::from_bytes([1; 32]);
        fixture.script_statuses(&id, &["received", "processing"]).await;
        fixture.script_reply(&id, b"ok").await;

        for _ in 0..3 {
            fixture
                .replica
                .read_state(&canister(1), Bytes::new())
                .await
                .unwrap();
        }
        assert_eq!(fixture.replica.read_state_count(), 3);
    }
}
