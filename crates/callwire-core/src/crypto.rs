//! Signing keys for the two supported schemes.
//!
//! - Ed25519: pure EdDSA over the message
//! - secp256k1: ECDSA with SHA-256, low-S, 64-byte `r || s` signatures
//!
//! Public keys are always handed out DER-encoded (SubjectPublicKeyInfo),
//! since that is what principals are derived from and what the platform
//! verifies against.

use ed25519_dalek::pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use ed25519_dalek::{Signer as _, Verifier as _};
use k256::pkcs8::LineEnding;
use std::fmt;

use crate::error::{CoreError, Result};

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (followed by 32 key bytes).
pub const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// DER prefix of a secp256k1 SubjectPublicKeyInfo (followed by the 65-byte
/// uncompressed point).
pub const SECP256K1_DER_PREFIX: [u8; 23] = [
    0x30, 0x56, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05,
    0x2b, 0x81, 0x04, 0x00, 0x0a, 0x03, 0x42, 0x00,
];

/// A supported signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ed25519,
    Secp256k1,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Secp256k1 => "secp256k1",
        }
    }

    /// Parse a scheme name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "ed25519" => Ok(Self::Ed25519),
            "secp256k1" => Ok(Self::Secp256k1),
            other => Err(CoreError::UnsupportedIdentity(format!(
                "unknown signature scheme: {other}"
            ))),
        }
    }

    /// Detect the scheme of a DER-encoded public key.
    pub fn of_der(der_public_key: &[u8]) -> Option<Self> {
        if der_public_key.len() == ED25519_DER_PREFIX.len() + 32
            && der_public_key.starts_with(&ED25519_DER_PREFIX)
        {
            Some(Self::Ed25519)
        } else if der_public_key.len() == SECP256K1_DER_PREFIX.len() + 65
            && der_public_key.starts_with(&SECP256K1_DER_PREFIX)
        {
            Some(Self::Secp256k1)
        } else {
            None
        }
    }
}

/// A signing keypair of one of the supported schemes.
#[derive(Clone)]
pub enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate(scheme: Scheme) -> Self {
        let mut rng = rand::rngs::OsRng;
        match scheme {
            Scheme::Ed25519 => Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut rng)),
            Scheme::Secp256k1 => Self::Secp256k1(k256::ecdsa::SigningKey::random(&mut rng)),
        }
    }

    /// Create from raw secret key bytes (Ed25519 seed or secp256k1 scalar).
    pub fn from_secret_bytes(scheme: Scheme, secret: &[u8]) -> Result<Self> {
        match scheme {
            Scheme::Ed25519 => {
                let seed: [u8; 32] = secret.try_into().map_err(|_| {
                    CoreError::UnsupportedIdentity(format!(
                        "ed25519 seed must be 32 bytes, got {}",
                        secret.len()
                    ))
                })?;
                Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
            }
            Scheme::Secp256k1 => k256::ecdsa::SigningKey::from_slice(secret)
                .map(Self::Secp256k1)
                .map_err(|e| CoreError::UnsupportedIdentity(format!("secp256k1 key: {e}"))),
        }
    }

    /// Create from a hex-encoded secret key.
    pub fn from_secret_hex(scheme: Scheme, secret_hex: &str) -> Result<Self> {
        let secret = hex::decode(secret_hex)
            .map_err(|e| CoreError::UnsupportedIdentity(format!("secret key hex: {e}")))?;
        Self::from_secret_bytes(scheme, &secret)
    }

    /// Load a PEM private key, detecting the scheme.
    ///
    /// Accepts PKCS#8 for both schemes and SEC1 `EC PRIVATE KEY` for
    /// secp256k1.
    pub fn from_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = <k256::ecdsa::SigningKey as k256::pkcs8::DecodePrivateKey>::from_pkcs8_pem(pem) {
            return Ok(Self::Secp256k1(key));
        }
        if let Ok(secret) = k256::SecretKey::from_sec1_pem(pem) {
            return Ok(Self::Secp256k1(k256::ecdsa::SigningKey::from(secret)));
        }
        Err(CoreError::UnsupportedIdentity(
            "unrecognized private key PEM".into(),
        ))
    }

    /// Export the private key as PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<String> {
        let pem = match self {
            Self::Ed25519(key) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CoreError::EncodingError(e.to_string()))?,
            Self::Secp256k1(key) => {
                <k256::ecdsa::SigningKey as k256::pkcs8::EncodePrivateKey>::to_pkcs8_pem(
                    key,
                    LineEnding::LF,
                )
                .map_err(|e| CoreError::EncodingError(e.to_string()))?
            }
        };
        Ok(pem.to_string())
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Ed25519(_) => Scheme::Ed25519,
            Self::Secp256k1(_) => Scheme::Secp256k1,
        }
    }

    /// The DER-encoded public key.
    pub fn public_key_der(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => {
                let mut der = ED25519_DER_PREFIX.to_vec();
                der.extend_from_slice(key.verifying_key().as_bytes());
                der
            }
            Self::Secp256k1(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let mut der = SECP256K1_DER_PREFIX.to_vec();
                der.extend_from_slice(point.as_bytes());
                der
            }
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
            Self::Secp256k1(key) => {
                let sig: k256::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| CoreError::SigningFailure(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let der = self.public_key_der();
        write!(
            f,
            "KeyPair({}, {}...)",
            self.scheme().as_str(),
            &hex::encode(&der[der.len() - 8..])
        )
    }
}

/// Verify a signature against a DER-encoded public key of either scheme.
pub fn verify_signature(der_public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    match Scheme::of_der(der_public_key) {
        Some(Scheme::Ed25519) => {
            let raw: [u8; 32] = der_public_key[ED25519_DER_PREFIX.len()..]
                .try_into()
                .map_err(|_| CoreError::InvalidPublicKey)?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                .map_err(|_| CoreError::InvalidPublicKey)?;
            let sig = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|_| CoreError::InvalidSignature)?;
            key.verify(message, &sig)
                .map_err(|_| CoreError::InvalidSignature)
        }
        Some(Scheme::Secp256k1) => {
            let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(
                &der_public_key[SECP256K1_DER_PREFIX.len()..],
            )
            .map_err(|_| CoreError::InvalidPublicKey)?;
            let sig = k256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| CoreError::InvalidSignature)?;
            key.verify(message, &sig)
                .map_err(|_| CoreError::InvalidSignature)
        }
        None => Err(CoreError::InvalidPublicKey),
    }
}
