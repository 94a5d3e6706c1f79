//! Delegations: letting a session key sign on behalf of a principal.
//!
//! A delegation names the public key being authorized, an expiration and
//! optionally the canisters it is restricted to. The record is hashed like
//! a request and signed by the key that grants the authority. Chains are
//! ordered: link 0 is signed by the outer key, link *i* by the key
//! introduced in link *i - 1*, and the last link introduces the session key.

use ciborium::value::Value;

use crate::crypto::{verify_signature, KeyPair};
use crate::domain::DomainSeparators;
use crate::error::{CoreError, Result};
use crate::principal::Principal;
use crate::request_id::RequestId;

mod keys {
    pub const PUBKEY: &str = "pubkey";
    pub const EXPIRATION: &str = "expiration";
    pub const TARGETS: &str = "targets";
    pub const DELEGATION: &str = "delegation";
    pub const SIGNATURE: &str = "signature";
}

/// An unsigned delegation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// DER public key being authorized.
    pub pubkey: Vec<u8>,
    /// Expiration, nanoseconds since the Unix epoch.
    pub expiration: u64,
    /// Canisters this delegation is restricted to, if any.
    pub targets: Option<Vec<Principal>>,
}

impl Delegation {
    pub fn new(pubkey: Vec<u8>, expiration: u64) -> Self {
        Self {
            pubkey,
            expiration,
            targets: None,
        }
    }

    pub fn with_targets(mut self, targets: Vec<Principal>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// Convert to a CBOR map with raw byte fields.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            (
                Value::Text(keys::PUBKEY.into()),
                Value::Bytes(self.pubkey.clone()),
            ),
            (
                Value::Text(keys::EXPIRATION.into()),
                Value::Integer(self.expiration.into()),
            ),
        ];
        if let Some(targets) = &self.targets {
            entries.push((
                Value::Text(keys::TARGETS.into()),
                Value::Array(
                    targets
                        .iter()
                        .map(|t| Value::Bytes(t.as_slice().to_vec()))
                        .collect(),
                ),
            ));
        }
        Value::Map(entries)
    }

    /// Parse a delegation map.
    ///
    /// Byte fields given as arrays of small integers (as produced by JSON
    /// tooling) are normalized to raw bytes.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_map(value, "delegation")?;

        let pubkey = normalize_bytes(lookup(map, keys::PUBKEY), keys::PUBKEY)?;
        let expiration = match lookup(map, keys::EXPIRATION) {
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map_err(|_| CoreError::DecodingError("invalid expiration".into()))?,
            _ => return Err(CoreError::DecodingError("missing expiration".into())),
        };
        let targets = match lookup(map, keys::TARGETS) {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| Principal::from_slice(&normalize_bytes(Some(item), keys::TARGETS)?))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
            _ => return Err(CoreError::DecodingError("invalid targets".into())),
        };

        Ok(Self {
            pubkey,
            expiration,
            targets,
        })
    }

    /// The representation-independent hash of this record.
    pub fn request_id(&self) -> Result<RequestId> {
        RequestId::of_value(&self.to_value())
    }
}

/// A delegation together with the signature of its grantor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDelegation {
    pub delegation: Delegation,
    pub signature: Vec<u8>,
}

impl SignedDelegation {
    /// Sign a delegation with the granting key.
    pub fn sign(
        delegation: Delegation,
        signer: &KeyPair,
        separators: &DomainSeparators,
    ) -> Result<Self> {
        let id = delegation.request_id()?;
        let signature = signer.sign(&separators.delegation_payload(id.as_bytes()))?;
        Ok(Self {
            delegation,
            signature,
        })
    }

    /// Verify the signature against the grantor's DER public key.
    pub fn verify(&self, signer_public_key: &[u8], separators: &DomainSeparators) -> Result<()> {
        let id = self.delegation.request_id()?;
        verify_signature(
            signer_public_key,
            &separators.delegation_payload(id.as_bytes()),
            &self.signature,
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            (
                Value::Text(keys::DELEGATION.into()),
                self.delegation.to_value(),
            ),
            (
                Value::Text(keys::SIGNATURE.into()),
                Value::Bytes(self.signature.clone()),
            ),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = as_map(value, "signed delegation")?;
        let delegation = match lookup(map, keys::DELEGATION) {
            Some(v) => Delegation::from_value(v)?,
            None => return Err(CoreError::DecodingError("missing delegation".into())),
        };
        let signature = normalize_bytes(lookup(map, keys::SIGNATURE), keys::SIGNATURE)?;
        Ok(Self {
            delegation,
            signature,
        })
    }
}

/// Everything an identity needs to sign through a delegation.
#[derive(Debug, Clone)]
pub struct DelegationChain {
    /// The principal requests are sent as.
    pub principal: Principal,
    /// DER public key of the outer authority; sent as `sender_pubkey`.
    pub sender_public_key: Vec<u8>,
    /// Ordered links, outermost first. Never empty.
    pub delegations: Vec<SignedDelegation>,
    session: KeyPair,
}

impl DelegationChain {
    pub fn new(
        principal: Principal,
        sender_public_key: Vec<u8>,
        delegations: Vec<SignedDelegation>,
        session: KeyPair,
    ) -> Result<Self> {
        if delegations.is_empty() {
            return Err(CoreError::MalformedRequest(
                "delegation chain must contain at least one delegation".into(),
            ));
        }
        Ok(Self {
            principal,
            sender_public_key,
            delegations,
            session,
        })
    }

    /// Build a chain whose principal is derived from the outer key.
    pub fn from_outer_key(
        sender_public_key: Vec<u8>,
        delegations: Vec<SignedDelegation>,
        session: KeyPair,
    ) -> Result<Self> {
        let principal = Principal::self_authenticating(&sender_public_key);
        Self::new(principal, sender_public_key, delegations, session)
    }

    /// Have `outer` authorize `session` with a single delegation.
    pub fn issue(
        outer: &KeyPair,
        session: KeyPair,
        expiration: u64,
        targets: Option<Vec<Principal>>,
        separators: &DomainSeparators,
    ) -> Result<Self> {
        let delegation = Delegation {
            pubkey: session.public_key_der(),
            expiration,
            targets,
        };
        let signed = SignedDelegation::sign(delegation, outer, separators)?;
        Self::from_outer_key(outer.public_key_der(), vec![signed], session)
    }

    /// Have the current session key authorize a further session key.
    pub fn extend(
        &self,
        next_session: KeyPair,
        expiration: u64,
        targets: Option<Vec<Principal>>,
        separators: &DomainSeparators,
    ) -> Result<Self> {
        let delegation = Delegation {
            pubkey: next_session.public_key_der(),
            expiration,
            targets,
        };
        let signed = SignedDelegation::sign(delegation, &self.session, separators)?;

        let mut delegations = self.delegations.clone();
        delegations.push(signed);
        Self::new(
            self.principal.clone(),
            self.sender_public_key.clone(),
            delegations,
            next_session,
        )
    }

    /// The key that actually produces request signatures.
    pub fn session_key(&self) -> &KeyPair {
        &self.session
    }

    /// Earliest expiration across the chain.
    pub fn expiration(&self) -> u64 {
        self.delegations
            .iter()
            .map(|d| d.delegation.expiration)
            .min()
            .unwrap_or(0)
    }

    /// Whether every link allows calls to `canister`.
    pub fn permits(&self, canister: &Principal) -> bool {
        self.delegations.iter().all(|d| match &d.delegation.targets {
            Some(targets) => targets.contains(canister),
            None => true,
        })
    }

    /// Verify every link transitively, starting from the outer key.
    ///
    /// Only keys of the supported schemes can be checked here; chains rooted
    /// in other key types fail with `InvalidPublicKey`.
    pub fn verify(&self, now: u64, separators: &DomainSeparators) -> Result<()> {
        let mut signer = self.sender_public_key.as_slice();
        for link in &self.delegations {
            if link.delegation.expiration <= now {
                return Err(CoreError::DelegationExpired {
                    expiration: link.delegation.expiration,
                    now,
                });
            }
            link.verify(signer, separators)?;
            signer = link.delegation.pubkey.as_slice();
        }

        if signer != self.session.public_key_der().as_slice() {
            return Err(CoreError::InvalidPublicKey);
        }
        Ok(())
    }

    /// The `sender_delegation` array as it appears in an envelope.
    pub fn to_value(&self) -> Value {
        Value::Array(self.delegations.iter().map(SignedDelegation::to_value).collect())
    }
}

fn as_map<'a>(value: &'a Value, what: &str) -> Result<&'a [(Value, Value)]> {
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(CoreError::DecodingError(format!("{what} must be a map"))),
    }
}

fn lookup<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
        .map(|(_, v)| v)
}

/// Accept either a byte string or an array of byte-sized integers.
pub(crate) fn normalize_bytes(value: Option<&Value>, name: &str) -> Result<Vec<u8>> {
    match value {
        Some(Value::Bytes(b)) => Ok(b.clone()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Integer(i) => u8::try_from(*i)
                    .map_err(|_| CoreError::DecodingError(format!("{name}: byte out of range"))),
                _ => Err(CoreError::DecodingError(format!("{name}: expected bytes"))),
            })
            .collect(),
        _ => Err(CoreError::DecodingError(format!("missing {name}"))),
    }
}
