//! Identities: who a request is sent as, and what signs it.
//!
//! An identity is exactly one of:
//!
//! - `Anonymous`: no key; sends as the anonymous principal, unsigned
//! - `Key`: signs with its own key; sends as that key's principal
//! - `Delegated`: signs with a session key; sends as the delegation's
//!   principal and presents the outer authority's public key
//!
//! `sender` and `sign` match on the same variant, so the principal in the
//! request always agrees with the key material that authenticates it.

use crate::crypto::{KeyPair, Scheme};
use crate::delegation::DelegationChain;
use crate::error::{CoreError, Result};
use crate::principal::Principal;

/// The public half of a signature, as it goes into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    /// DER public key the signature verifies under (`sender_pubkey`).
    pub public_key: Option<Vec<u8>>,
    /// The signature bytes (`sender_sig`).
    pub signature: Option<Vec<u8>>,
}

impl Signature {
    /// The anonymous "no signature" pair.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.public_key.is_none() && self.signature.is_none()
    }
}

/// The signing identity of a client session.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Key(KeyPair),
    Delegated {
        key: KeyPair,
        chain: DelegationChain,
    },
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// A fresh random identity of the given scheme.
    pub fn generate(scheme: Scheme) -> Self {
        Self::Key(KeyPair::generate(scheme))
    }

    pub fn from_key_pair(key: KeyPair) -> Self {
        Self::Key(key)
    }

    /// Import a hex-encoded secret key for a named scheme.
    pub fn from_secret_hex(scheme: &str, secret_hex: &str) -> Result<Self> {
        let scheme = Scheme::parse(scheme)?;
        Ok(Self::Key(KeyPair::from_secret_hex(scheme, secret_hex)?))
    }

    /// Import a PEM private key, detecting its scheme.
    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self::Key(KeyPair::from_pem(pem)?))
    }

    /// Export the identity's own private key as PEM.
    pub fn to_pem(&self) -> Result<String> {
        match self {
            Self::Anonymous => Err(CoreError::UnsupportedIdentity(
                "anonymous identity has no key".into(),
            )),
            Self::Key(key) | Self::Delegated { key, .. } => key.to_pem(),
        }
    }

    /// The principal to place in the `sender` field.
    pub fn sender(&self) -> Principal {
        match self {
            Self::Anonymous => Principal::anonymous(),
            Self::Key(key) => Principal::self_authenticating(&key.public_key_der()),
            Self::Delegated { chain, .. } => chain.principal.clone(),
        }
    }

    /// Sign a (domain-separated) message.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        match self {
            Self::Anonymous => Ok(Signature::none()),
            Self::Key(key) => Ok(Signature {
                public_key: Some(key.public_key_der()),
                signature: Some(key.sign(message)?),
            }),
            Self::Delegated { chain, .. } => Ok(Signature {
                public_key: Some(chain.sender_public_key.clone()),
                signature: Some(chain.session_key().sign(message)?),
            }),
        }
    }

    /// Install a delegation chain. One-shot: cannot be replaced or removed.
    pub fn add_delegation(&mut self, chain: DelegationChain) -> Result<()> {
        match self {
            Self::Anonymous => Err(CoreError::UnsupportedIdentity(
                "anonymous identity cannot carry a delegation".into(),
            )),
            Self::Delegated { .. } => Err(CoreError::UnsupportedIdentity(
                "identity already carries a delegation".into(),
            )),
            Self::Key(_) => {
                if let Self::Key(key) = std::mem::replace(self, Self::Anonymous) {
                    *self = Self::Delegated { key, chain };
                }
                Ok(())
            }
        }
    }

    /// The installed delegation chain, if any.
    pub fn delegation_chain(&self) -> Option<&DelegationChain> {
        match self {
            Self::Delegated { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// The identity's own DER public key (not the delegation's).
    pub fn public_key_der(&self) -> Option<Vec<u8>> {
        match self {
            Self::Anonymous => None,
            Self::Key(key) | Self::Delegated { key, .. } => Some(key.public_key_der()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}
