//! Domain separation for signatures.
//!
//! A request id is never signed bare: it is prefixed with a length-tagged
//! separator so that a signature over one kind of record cannot be replayed
//! as a signature over another.

/// Separator for request signatures: `"\x0Aic-request"`.
pub const REQUEST_DOMAIN_SEPARATOR: &[u8] = b"\x0Aic-request";

/// Separator for delegation signatures: `"\x1Aic-request-auth-delegation"`.
pub const DELEGATION_DOMAIN_SEPARATOR: &[u8] = b"\x1Aic-request-auth-delegation";

/// The separators in effect for a signer.
///
/// Passed explicitly to everything that signs or verifies; there is no
/// process-global lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSeparators {
    pub request: Vec<u8>,
    pub delegation: Vec<u8>,
}

impl DomainSeparators {
    /// Build the signing payload for a request id.
    pub fn request_payload(&self, request_id: &[u8; 32]) -> Vec<u8> {
        prefixed(&self.request, request_id)
    }

    /// Build the signing payload for a delegation's request id.
    pub fn delegation_payload(&self, delegation_id: &[u8; 32]) -> Vec<u8> {
        prefixed(&self.delegation, delegation_id)
    }
}

impl Default for DomainSeparators {
    fn default() -> Self {
        Self {
            request: REQUEST_DOMAIN_SEPARATOR.to_vec(),
            delegation: DELEGATION_DOMAIN_SEPARATOR.to_vec(),
        }
    }
}

fn prefixed(separator: &[u8], id: &[u8; 32]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(separator.len() + id.len());
    msg.extend_from_slice(separator);
    msg.extend_from_slice(id);
    msg
}
