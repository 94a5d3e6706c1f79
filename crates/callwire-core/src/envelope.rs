//! Signed envelopes.
//!
//! An envelope wraps request content with the sender's authentication:
//!
//! ```text
//! 55799({
//!   "content":           { ...request fields... },
//!   "sender_pubkey":     bytes,        // omitted for anonymous
//!   "sender_sig":        bytes,        // omitted for anonymous
//!   "sender_delegation": [ {delegation, signature}, ... ],  // delegated only
//! })
//! ```
//!
//! The request id is computed over `content` alone, so it never depends
//! on signature or delegation bytes.

use ciborium::value::Value;

use crate::delegation::SignedDelegation;
use crate::domain::DomainSeparators;
use crate::error::{CoreError, Result};
use crate::identity::Identity;
use crate::request::Request;
use crate::request_id::RequestId;

/// CBOR self-describe tag prefixed to every envelope.
pub const SELF_DESCRIBE_TAG: u64 = 55799;

mod keys {
    pub const CONTENT: &str = "content";
    pub const SENDER_PUBKEY: &str = "sender_pubkey";
    pub const SENDER_SIG: &str = "sender_sig";
    pub const SENDER_DELEGATION: &str = "sender_delegation";
}

/// An envelope, either freshly built or decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content: Request,
    pub sender_pubkey: Option<Vec<u8>>,
    pub sender_sig: Option<Vec<u8>>,
    pub sender_delegation: Option<Vec<SignedDelegation>>,
}

impl Envelope {
    pub fn to_value(&self) -> Value {
        let mut entries = vec![(Value::Text(keys::CONTENT.into()), self.content.to_value())];
        if let Some(pubkey) = &self.sender_pubkey {
            entries.push((
                Value::Text(keys::SENDER_PUBKEY.into()),
                Value::Bytes(pubkey.clone()),
            ));
        }
        if let Some(sig) = &self.sender_sig {
            entries.push((Value::Text(keys::SENDER_SIG.into()), Value::Bytes(sig.clone())));
        }
        if let Some(chain) = &self.sender_delegation {
            entries.push((
                Value::Text(keys::SENDER_DELEGATION.into()),
                Value::Array(chain.iter().map(SignedDelegation::to_value).collect()),
            ));
        }
        Value::Map(entries)
    }

    /// Encode to tagged CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_tagged(self.to_value())
    }

    /// Decode tagged (or untagged) CBOR back into an envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = decode_value(bytes)?;
        let map = match &value {
            Value::Map(m) => m,
            _ => return Err(CoreError::DecodingError("envelope must be a map".into())),
        };

        let get = |key: &str| -> Option<&Value> {
            map.iter()
                .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
                .map(|(_, v)| v)
        };

        let content = match get(keys::CONTENT) {
            Some(v) => Request::from_value(v)?,
            None => return Err(CoreError::DecodingError("missing content".into())),
        };
        let sender_pubkey = optional_bytes(get(keys::SENDER_PUBKEY), keys::SENDER_PUBKEY)?;
        let sender_sig = optional_bytes(get(keys::SENDER_SIG), keys::SENDER_SIG)?;
        let sender_delegation = match get(keys::SENDER_DELEGATION) {
            Some(Value::Array(links)) => Some(
                links
                    .iter()
                    .map(SignedDelegation::from_value)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(CoreError::DecodingError(
                    "sender_delegation must be an array".into(),
                ))
            }
            None => None,
        };

        Ok(Self {
            content,
            sender_pubkey,
            sender_sig,
            sender_delegation,
        })
    }

    /// Request id of the content.
    pub fn request_id(&self) -> Result<RequestId> {
        self.content.request_id()
    }
}

/// The output of signing: the id to poll with and the bytes to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub request_id: RequestId,
    pub bytes: Vec<u8>,
}

/// Builds signed envelopes for one identity.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeSigner<'a> {
    identity: &'a Identity,
    separators: &'a DomainSeparators,
}

impl<'a> EnvelopeSigner<'a> {
    pub fn new(identity: &'a Identity, separators: &'a DomainSeparators) -> Self {
        Self {
            identity,
            separators,
        }
    }

    /// Assemble the envelope without encoding it.
    pub fn envelope(&self, request: &Request) -> Result<(RequestId, Envelope)> {
        let request_id = request.request_id()?;
        let payload = self.separators.request_payload(request_id.as_bytes());
        let signature = self.identity.sign(&payload)?;

        let envelope = Envelope {
            content: request.clone(),
            sender_pubkey: signature.public_key,
            sender_sig: signature.signature,
            sender_delegation: self
                .identity
                .delegation_chain()
                .map(|chain| chain.delegations.clone()),
        };
        Ok((request_id, envelope))
    }

    /// Sign and encode a request.
    pub fn build(&self, request: &Request) -> Result<SignedRequest> {
        let (request_id, envelope) = self.envelope(request)?;
        Ok(SignedRequest {
            request_id,
            bytes: envelope.encode()?,
        })
    }
}

/// Encode a value under the self-describe tag.
pub fn encode_tagged(value: Value) -> Result<Vec<u8>> {
    let tagged = Value::Tag(SELF_DESCRIBE_TAG, Box::new(value));
    let mut bytes = Vec::new();
    ciborium::into_writer(&tagged, &mut bytes)
        .map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(bytes)
}

/// Decode CBOR, stripping a leading self-describe tag if present.
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    Ok(match value {
        Value::Tag(SELF_DESCRIBE_TAG, inner) => *inner,
        other => other,
    })
}

fn optional_bytes(value: Option<&Value>, name: &str) -> Result<Option<Vec<u8>>> {
    match value {
        None => Ok(None),
        Some(Value::Bytes(b)) => Ok(Some(b.clone())),
        Some(_) => Err(CoreError::DecodingError(format!("{name} must be bytes"))),
    }
}
