//! Request content: the `content` map of an envelope.
//!
//! Three request types exist. `query` and `call` address a canister method;
//! `read_state` asks for certified paths of the state tree. Every request
//! carries the sender and an absolute ingress expiry in nanoseconds.

use ciborium::value::Value;

use crate::error::{CoreError, Result};
use crate::principal::Principal;
use crate::request_id::RequestId;

/// A single edge label of the state tree.
pub type Label = Vec<u8>;

/// A path through the state tree.
pub type Path = Vec<Label>;

/// Content field names. These are part of the wire format.
pub mod keys {
    pub const REQUEST_TYPE: &str = "request_type";
    pub const SENDER: &str = "sender";
    pub const CANISTER_ID: &str = "canister_id";
    pub const METHOD_NAME: &str = "method_name";
    pub const ARG: &str = "arg";
    pub const INGRESS_EXPIRY: &str = "ingress_expiry";
    pub const NONCE: &str = "nonce";
    pub const PATHS: &str = "paths";
}

/// Discriminator of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Query,
    Call,
    ReadState,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Call => "call",
            Self::ReadState => "read_state",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "call" => Some(Self::Call),
            "read_state" => Some(Self::ReadState),
            _ => None,
        }
    }
}

/// Content of a `query` or `call` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContent {
    pub sender: Principal,
    pub canister_id: Principal,
    pub method_name: String,
    /// Encoded argument bytes (opaque to this crate).
    pub arg: Vec<u8>,
    /// Absolute expiry, nanoseconds since the Unix epoch.
    pub ingress_expiry: u64,
    /// Optional nonce to make otherwise identical calls distinct.
    pub nonce: Option<Vec<u8>>,
}

/// Content of a `read_state` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStateContent {
    pub sender: Principal,
    pub paths: Vec<Path>,
    pub ingress_expiry: u64,
}

/// A request, discriminated by `request_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query(CallContent),
    Call(CallContent),
    ReadState(ReadStateContent),
}

impl Request {
    /// Build a `query` request.
    pub fn query(
        sender: Principal,
        canister_id: Principal,
        method_name: impl Into<String>,
        arg: Vec<u8>,
        ingress_expiry: u64,
    ) -> Self {
        Self::Query(CallContent {
            sender,
            canister_id,
            method_name: method_name.into(),
            arg,
            ingress_expiry,
            nonce: None,
        })
    }

    /// Build a `call` (update) request.
    pub fn call(
        sender: Principal,
        canister_id: Principal,
        method_name: impl Into<String>,
        arg: Vec<u8>,
        ingress_expiry: u64,
    ) -> Self {
        Self::Call(CallContent {
            sender,
            canister_id,
            method_name: method_name.into(),
            arg,
            ingress_expiry,
            nonce: None,
        })
    }

    /// Build a `read_state` request.
    pub fn read_state(sender: Principal, paths: Vec<Path>, ingress_expiry: u64) -> Self {
        Self::ReadState(ReadStateContent {
            sender,
            paths,
            ingress_expiry,
        })
    }

    /// Attach a nonce. Ignored for `read_state`.
    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        if let Self::Query(content) | Self::Call(content) = &mut self {
            content.nonce = Some(nonce);
        }
        self
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Query(_) => RequestType::Query,
            Self::Call(_) => RequestType::Call,
            Self::ReadState(_) => RequestType::ReadState,
        }
    }

    pub fn sender(&self) -> &Principal {
        match self {
            Self::Query(c) | Self::Call(c) => &c.sender,
            Self::ReadState(r) => &r.sender,
        }
    }

    pub fn ingress_expiry(&self) -> u64 {
        match self {
            Self::Query(c) | Self::Call(c) => c.ingress_expiry,
            Self::ReadState(r) => r.ingress_expiry,
        }
    }

    /// The addressed canister, if this is a `query` or `call`.
    pub fn canister_id(&self) -> Option<&Principal> {
        match self {
            Self::Query(c) | Self::Call(c) => Some(&c.canister_id),
            Self::ReadState(_) => None,
        }
    }

    /// Compute the request id over the content map.
    pub fn request_id(&self) -> Result<RequestId> {
        RequestId::of_value(&self.to_value())
    }

    /// Convert to a CBOR map. Absent optional fields are omitted.
    pub fn to_value(&self) -> Value {
        let mut entries = Vec::with_capacity(7);
        entries.push(field(
            keys::REQUEST_TYPE,
            Value::Text(self.request_type().as_str().to_string()),
        ));

        match self {
            Self::Query(c) | Self::Call(c) => {
                entries.push(field(keys::SENDER, Value::Bytes(c.sender.as_slice().to_vec())));
                entries.push(field(
                    keys::CANISTER_ID,
                    Value::Bytes(c.canister_id.as_slice().to_vec()),
                ));
                entries.push(field(keys::METHOD_NAME, Value::Text(c.method_name.clone())));
                entries.push(field(keys::ARG, Value::Bytes(c.arg.clone())));
                entries.push(field(
                    keys::INGRESS_EXPIRY,
                    Value::Integer(c.ingress_expiry.into()),
                ));
                if let Some(nonce) = &c.nonce {
                    entries.push(field(keys::NONCE, Value::Bytes(nonce.clone())));
                }
            }
            Self::ReadState(r) => {
                entries.push(field(keys::SENDER, Value::Bytes(r.sender.as_slice().to_vec())));
                entries.push(field(keys::PATHS, paths_to_value(&r.paths)));
                entries.push(field(
                    keys::INGRESS_EXPIRY,
                    Value::Integer(r.ingress_expiry.into()),
                ));
            }
        }

        Value::Map(entries)
    }

    /// Parse a CBOR content map, in any field order.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(CoreError::DecodingError("content must be a map".into())),
        };

        let get = |key: &str| -> Option<&Value> {
            map.iter()
                .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
                .map(|(_, v)| v)
        };

        let request_type = match get(keys::REQUEST_TYPE) {
            Some(Value::Text(t)) => RequestType::parse(t)
                .ok_or_else(|| CoreError::DecodingError(format!("unknown request_type: {t}")))?,
            _ => return Err(CoreError::DecodingError("missing request_type".into())),
        };

        let sender = Principal::from_slice(&required_bytes(get(keys::SENDER), keys::SENDER)?)?;
        let ingress_expiry = match get(keys::INGRESS_EXPIRY) {
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map_err(|_| CoreError::DecodingError("invalid ingress_expiry".into()))?,
            _ => return Err(CoreError::DecodingError("missing ingress_expiry".into())),
        };

        if request_type == RequestType::ReadState {
            let paths = match get(keys::PATHS) {
                Some(v) => paths_from_value(v)?,
                None => return Err(CoreError::DecodingError("missing paths".into())),
            };
            return Ok(Self::read_state(sender, paths, ingress_expiry));
        }

        let canister_id = Principal::from_slice(&required_bytes(
            get(keys::CANISTER_ID),
            keys::CANISTER_ID,
        )?)?;
        let method_name = match get(keys::METHOD_NAME) {
            Some(Value::Text(m)) => m.clone(),
            _ => return Err(CoreError::DecodingError("missing method_name".into())),
        };
        let arg = required_bytes(get(keys::ARG), keys::ARG)?;
        let nonce = match get(keys::NONCE) {
            Some(Value::Bytes(b)) => Some(b.clone()),
            None => None,
            _ => return Err(CoreError::DecodingError("invalid nonce".into())),
        };

        let content = CallContent {
            sender,
            canister_id,
            method_name,
            arg,
            ingress_expiry,
            nonce,
        };
        Ok(match request_type {
            RequestType::Query => Self::Query(content),
            _ => Self::Call(content),
        })
    }
}

/// Encode state tree paths as an array of arrays of byte strings.
pub fn paths_to_value(paths: &[Path]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|path| Value::Array(path.iter().map(|l| Value::Bytes(l.clone())).collect()))
            .collect(),
    )
}

fn paths_from_value(value: &Value) -> Result<Vec<Path>> {
    let outer = match value {
        Value::Array(a) => a,
        _ => return Err(CoreError::DecodingError("paths must be an array".into())),
    };
    outer
        .iter()
        .map(|path| match path {
            Value::Array(labels) => labels
                .iter()
                .map(|label| match label {
                    Value::Bytes(b) => Ok(b.clone()),
                    _ => Err(CoreError::DecodingError("path label must be bytes".into())),
                })
                .collect(),
            _ => Err(CoreError::DecodingError("path must be an array".into())),
        })
        .collect()
}

fn field(name: &str, value: Value) -> (Value, Value) {
    (Value::Text(name.to_string()), value)
}

fn required_bytes(value: Option<&Value>, name: &str) -> Result<Vec<u8>> {
    match value {
        Some(Value::Bytes(b)) => Ok(b.clone()),
        _ => Err(CoreError::DecodingError(format!("missing {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call() -> Request {
        Request::call(
            Principal::anonymous(),
            Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0x04, 0xd2]).unwrap(),
            "transfer",
            b"DIDL\x00\x00".to_vec(),
            1_685_570_400_000_000_000,
        )
    }

    #[test]
    fn test_value_roundtrip_call() {
        let request = sample_call().with_nonce(vec![9, 9, 9]);
        let decoded = Request::from_value(&request.to_value()).unwrap();
        assert_eq!(request, decoded);
    }

    #[test]
    fn test_value_roundtrip_read_state() {
        let request = Request::read_state(
            Principal::anonymous(),
            vec![vec![b"request_status".to_vec(), vec![0x11; 32]]],
            42,
        );
        let decoded = Request::from_value(&request.to_value()).unwrap();
        assert_eq!(request, decoded);
        assert_eq!(decoded.canister_id(), None);
    }

    #[test]
    fn test_absent_nonce_not_encoded() {
        let value = sample_call().to_value();
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert!(!entries
            .iter()
            .any(|(k, _)| matches!(k, Value::Text(n) if n == keys::NONCE)));
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_nonce_changes_request_id() {
        let plain = sample_call().request_id().unwrap();
        let with_nonce = sample_call().with_nonce(vec![1]).request_id().unwrap();
        assert_ne!(plain, with_nonce);
    }

    #[test]
    fn test_query_and_call_differ() {
        let Request::Call(content) = sample_call() else {
            unreachable!()
        };
        let query = Request::Query(content.clone());
        let call = Request::Call(content);
        assert_ne!(query.request_id().unwrap(), call.request_id().unwrap());
    }

    #[test]
    fn test_from_value_rejects_unknown_type() {
        let value = Value::Map(vec![field(keys::REQUEST_TYPE, Value::Text("upgrade".into()))]);
        assert!(Request::from_value(&value).is_err());
    }
}
