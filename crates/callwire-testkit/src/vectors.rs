//! Golden test vectors for deterministic verification.
//!
//! Request ids, principals and Ed25519 signatures are fully determined by
//! their inputs, so any implementation of the protocol must reproduce these
//! values byte for byte.

use ciborium::value::Value;
use serde::Serialize;

use callwire_core::{
    Delegation, DomainSeparators, Identity, Principal, Request, RequestId, SignedDelegation,
};

use crate::fixtures::{canister, ed25519_identity, ed25519_key, TEST_EXPIRY};

/// A field value in a vector's content map.
#[derive(Debug, Clone, Copy)]
pub enum Field {
    Bytes(&'static [u8]),
    Text(&'static str),
    Nat(u64),
    Paths(&'static [&'static [&'static [u8]]]),
}

impl Field {
    fn to_value(self) -> Value {
        match self {
            Self::Bytes(b) => Value::Bytes(b.to_vec()),
            Self::Text(t) => Value::Text(t.to_string()),
            Self::Nat(n) => Value::Integer(n.into()),
            Self::Paths(paths) => Value::Array(
                paths
                    .iter()
                    .map(|path| Value::Array(path.iter().map(|l| Value::Bytes(l.to_vec())).collect()))
                    .collect(),
            ),
        }
    }
}

/// A request id test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub description: &'static str,
    /// Content fields, in no particular order.
    pub fields: &'static [(&'static str, Field)],
    /// Expected request id (hex).
    pub expected_request_id: &'static str,
}

impl GoldenVector {
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.fields
                .iter()
                .map(|(name, field)| (Value::Text(name.to_string()), field.to_value()))
                .collect(),
        )
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::of_value(&self.to_value()).expect("vector fields are hashable")
    }
}

const CANISTER_1234: &[u8] = &[0, 0, 0, 0, 0, 0, 0x04, 0xd2];
const ANONYMOUS: &[u8] = &[0x04];
const STATUS_ID: &[u8] = &[0x11; 32];

/// Get all request id vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "minimal_call",
            description: "Call content with no sender, expiry or nonce",
            fields: &[
                ("request_type", Field::Text("call")),
                ("canister_id", Field::Bytes(CANISTER_1234)),
                ("method_name", Field::Text("hello")),
                ("arg", Field::Bytes(b"DIDL\x00\xFD*")),
            ],
            expected_request_id: "8781291c347db32a9d8c10eb62b710fce5a93be676474c42babc74c51858f94b",
        },
        GoldenVector {
            name: "anonymous_call",
            description: "Complete anonymous call with sender and ingress_expiry",
            fields: &[
                ("ingress_expiry", Field::Nat(TEST_EXPIRY)),
                ("sender", Field::Bytes(ANONYMOUS)),
                ("arg", Field::Bytes(b"DIDL\x00\xFD*")),
                ("method_name", Field::Text("hello")),
                ("canister_id", Field::Bytes(CANISTER_1234)),
                ("request_type", Field::Text("call")),
            ],
            expected_request_id: "1d1091364d6bb8a6c16b203ee75467d59ead468f523eb058880ae8ec80e2b101",
        },
        GoldenVector {
            name: "query_with_nonce",
            description: "Anonymous query carrying a nonce",
            fields: &[
                ("request_type", Field::Text("query")),
                ("sender", Field::Bytes(ANONYMOUS)),
                ("canister_id", Field::Bytes(CANISTER_1234)),
                ("method_name", Field::Text("greet")),
                ("arg", Field::Bytes(b"DIDL\x00\x00")),
                ("ingress_expiry", Field::Nat(TEST_EXPIRY)),
                ("nonce", Field::Bytes(&[1, 2, 3, 4])),
            ],
            expected_request_id: "56faaec60d7cfa6cc3932520869f0434e28b01f78c4ca09e7cfaa98776e89b46",
        },
        GoldenVector {
            name: "read_state_request_status",
            description: "read_state for one request_status path",
            fields: &[
                ("request_type", Field::Text("read_state")),
                ("sender", Field::Bytes(ANONYMOUS)),
                ("paths", Field::Paths(&[&[b"request_status", STATUS_ID]])),
                ("ingress_expiry", Field::Nat(TEST_EXPIRY)),
            ],
            expected_request_id: "73ba7ba84ac669a18a5d911aec1161437dc19e7e5ff37b70c4dd3cf8b9408bf2",
        },
    ]
}

/// A signing test vector: deterministic Ed25519 over a full call.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureVector {
    pub name: String,
    pub seed: String,
    pub public_key_der: String,
    pub sender_text: String,
    pub request_id: String,
    pub signature: String,
}

/// Expected values for a call signed by the `[0x42; 32]` Ed25519 seed.
pub fn signed_call_vector() -> SignatureVector {
    SignatureVector {
        name: "ed25519_signed_call".into(),
        seed: "42".repeat(32),
        public_key_der: "302a300506032b65700321002152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12".into(),
        sender_text: "3w6rk-z7dee-7bk4p-23ky7-mb42d-wdhk2-4rsgq-ks5qg-chvbp-m3gwy-tqe".into(),
        request_id: "4366a6b1e333c0e779a219606c6cfacd49ab21274a3849161b4855694ff4f69b".into(),
        signature: "fa8cb9d271c35632cb7eda5832d67e3ab5d4029f66aaa99f323c33fc29b5c2a9d7e7d4f5f106b3fc3c04b3fceaf923234e7e9bea4da5c58658123b0bd92b7f09".into(),
    }
}

/// Expected values for a delegation from seed `0x0a` to seed `0x0b`.
pub fn delegation_vector() -> SignatureVector {
    SignatureVector {
        name: "ed25519_delegation".into(),
        seed: "0a".repeat(32),
        public_key_der: "302a300506032b657003210043a72e714401762df66b68c26dfbdf2682aaec9f2474eca4613e424a0fbafd3c".into(),
        sender_text: "muo3f-ines5-bxbwm-6wi5e-z663m-3zte2-r7d4x-pleey-xqvxt-scwc5-jae".into(),
        request_id: "9afbba0324fa580bf38a6f21785a02af2f0d82f3f2ac6411cb9a1241d304a487".into(),
        signature: "298ec844f3c27503bf3540755c2cc6f4dfb90df0440465be1ecfeab3b78a1dee3594c3e1aaafceb922fd60248a3aa84ce1c09112e67e2d40dd69377ba87e1605".into(),
    }
}

/// Recompute [`signed_call_vector`] from scratch.
pub fn compute_signed_call() -> SignatureVector {
    let identity = ed25519_identity(0x42);
    let request = Request::call(
        identity.sender(),
        canister(1234),
        "hello",
        b"DIDL\x00\xFD*".to_vec(),
        TEST_EXPIRY,
    );
    let request_id = request.request_id().expect("request hashes");
    let payload = DomainSeparators::default().request_payload(request_id.as_bytes());
    let signature = identity.sign(&payload).expect("ed25519 signing");

    SignatureVector {
        name: "ed25519_signed_call".into(),
        seed: "42".repeat(32),
        public_key_der: hex::encode(signature.public_key.unwrap_or_default()),
        sender_text: identity.sender().to_text(),
        request_id: request_id.to_hex(),
        signature: hex::encode(signature.signature.unwrap_or_default()),
    }
}

/// Recompute [`delegation_vector`] from scratch.
pub fn compute_delegation() -> SignatureVector {
    let outer = ed25519_key(0x0a);
    let delegation = Delegation::new(ed25519_key(0x0b).public_key_der(), TEST_EXPIRY);
    let request_id = delegation.request_id().expect("delegation hashes");
    let signed = SignedDelegation::sign(delegation, &outer, &DomainSeparators::default())
        .expect("ed25519 signing");
    let outer_der = outer.public_key_der();

    SignatureVector {
        name: "ed25519_delegation".into(),
        seed: "0a".repeat(32),
        sender_text: Principal::self_authenticating(&outer_der).to_text(),
        public_key_der: hex::encode(outer_der),
        request_id: request_id.to_hex(),
        signature: hex::encode(signed.signature),
    }
}

/// Verify all request id vectors.
///
/// Returns `(name, matches, computed_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = v.request_id().to_hex();
            let matches = hex == v.expected_request_id;
            (v.name.to_string(), matches, hex)
        })
        .collect()
}

/// Export the recomputed signing vectors as pretty JSON.
pub fn signature_vectors_json() -> String {
    serde_json::to_string_pretty(&[compute_signed_call(), compute_delegation()])
        .expect("vectors serialize")
}

/// Identity used by the signing vectors.
pub fn vector_identity() -> Identity {
    ed25519_identity(0x42)
}
