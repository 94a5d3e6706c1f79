//! Principals: opaque caller and canister identifiers.
//!
//! A principal is at most 29 bytes. Callers sending with a key are
//! *self-authenticating*: `sha224(der_public_key) || 0x02`. The anonymous
//! caller is the single byte `0x04`.
//!
//! The textual form is `base32(crc32_be(bytes) || bytes)`, lower-case,
//! unpadded, grouped into dash-separated chunks of five characters.

use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Maximum principal length in bytes.
pub const MAX_PRINCIPAL_LEN: usize = 29;

const SHA224_LEN: usize = 28;
const SELF_AUTHENTICATING_TAG: u8 = 0x02;
const ANONYMOUS_TAG: u8 = 0x04;
const CHECKSUM_LEN: usize = 4;

/// A caller or canister identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(Vec<u8>);

impl Principal {
    /// Derive the principal of a DER-encoded public key.
    pub fn self_authenticating(der_public_key: &[u8]) -> Self {
        let mut bytes = Sha224::digest(der_public_key).to_vec();
        bytes.push(SELF_AUTHENTICATING_TAG);
        Self(bytes)
    }

    /// The reserved anonymous principal.
    pub fn anonymous() -> Self {
        Self(vec![ANONYMOUS_TAG])
    }

    /// The management canister (empty bytes).
    pub fn management_canister() -> Self {
        Self(Vec::new())
    }

    /// Create from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PRINCIPAL_LEN {
            return Err(CoreError::InvalidPrincipal(format!(
                "{} bytes exceeds maximum of {MAX_PRINCIPAL_LEN}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Get the raw bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == [ANONYMOUS_TAG]
    }

    pub fn is_self_authenticating(&self) -> bool {
        self.0.len() == SHA224_LEN + 1 && self.0.last() == Some(&SELF_AUTHENTICATING_TAG)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Render the checksummed textual form.
    pub fn to_text(&self) -> String {
        let mut buf = Vec::with_capacity(CHECKSUM_LEN + self.0.len());
        buf.extend_from_slice(&crc32fast::hash(&self.0).to_be_bytes());
        buf.extend_from_slice(&self.0);

        let encoded =
            base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &buf).to_lowercase();

        let mut text = String::with_capacity(encoded.len() + encoded.len() / 5);
        for (i, c) in encoded.chars().enumerate() {
            if i > 0 && i % 5 == 0 {
                text.push('-');
            }
            text.push(c);
        }
        text
    }

    /// Parse the checksummed textual form.
    pub fn from_text(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| *c != '-').collect();
        let decoded = base32::decode(
            base32::Alphabet::Rfc4648 { padding: false },
            &compact.to_ascii_uppercase(),
        )
        .ok_or_else(|| CoreError::InvalidPrincipal(format!("not base32: {text}")))?;

        if decoded.len() < CHECKSUM_LEN {
            return Err(CoreError::InvalidPrincipal("text too short".into()));
        }

        let (checksum, bytes) = decoded.split_at(CHECKSUM_LEN);
        if checksum != crc32fast::hash(bytes).to_be_bytes() {
            return Err(CoreError::InvalidPrincipal(format!("checksum mismatch: {text}")));
        }

        let principal = Self::from_slice(bytes)?;
        if principal.to_text() != text.to_ascii_lowercase() {
            return Err(CoreError::InvalidPrincipal(format!("non-canonical text: {text}")));
        }
        Ok(principal)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.to_text())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Principal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s)
    }
}

impl AsRef<[u8]> for Principal {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Principal {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self> {
        Self::from_slice(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_text() {
        let anon = Principal::anonymous();
        assert!(anon.is_anonymous());
        assert_eq!(anon.to_text(), "2vxsx-fae");
        assert_eq!(Principal::from_text("2vxsx-fae").unwrap(), anon);
    }

    #[test]
    fn test_management_canister_text() {
        assert_eq!(Principal::management_canister().to_text(), "aaaaa-aa");
    }

    #[test]
    fn test_self_authenticating_shape() {
        let p = Principal::self_authenticating(b"some der bytes");
        assert_eq!(p.as_slice().len(), 29);
        assert!(p.is_self_authenticating());
        assert!(!p.is_anonymous());

        let mut short = vec![0u8; 27];
        short.push(0x02);
        assert!(!Principal::from_slice(&short).unwrap().is_self_authenticating());
        assert!(!Principal::anonymous().is_self_authenticating());

        // Same key, same principal
        assert_eq!(p, Principal::self_authenticating(b"some der bytes"));
        assert_ne!(p, Principal::self_authenticating(b"other der bytes"));
    }

    #[test]
    fn test_text_roundtrip() {
        let p = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0x04, 0xd2]).unwrap();
        let text = p.to_text();
        assert_eq!(text.parse::<Principal>().unwrap(), p);
    }

    #[test]
    fn test_reject_bad_checksum() {
        // Flip one character of a valid principal
        assert!(Principal::from_text("2vxsx-faf").is_err());
        assert!(Principal::from_text("not a principal!").is_err());
    }

    #[test]
    fn test_reject_too_long() {
        assert!(Principal::from_slice(&[0u8; 30]).is_err());
    }
}
