//! Query responses.
//!
//! ```text
//! {status: "replied", reply: {arg: bytes}}
//! {status: "rejected", reject_code: nat, reject_message: text}
//! ```

use callwire_core::envelope::decode_value;
use ciborium::value::Value;

use crate::error::{AgentError, Result};

mod keys {
    pub const STATUS: &str = "status";
    pub const REPLY: &str = "reply";
    pub const ARG: &str = "arg";
    pub const REJECT_CODE: &str = "reject_code";
    pub const REJECT_MESSAGE: &str = "reject_message";
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResponse {
    Replied(Vec<u8>),
    Rejected { code: u64, message: String },
}

impl QueryResponse {
    /// Parse an encoded query response.
    ///
    /// A missing `reject_code` on a rejection is reported as code 0; the
    /// message is mandatory.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let value = decode_value(bytes).map_err(|e| AgentError::InvalidReply(e.to_string()))?;
        let map = match &value {
            Value::Map(m) => m,
            _ => return Err(invalid("query response must be a map")),
        };

        match lookup(map, keys::STATUS) {
            Some(Value::Text(status)) if status == "replied" => {
                let reply = match lookup(map, keys::REPLY) {
                    Some(Value::Map(reply)) => reply,
                    _ => return Err(invalid("replied without reply")),
                };
                match lookup(reply, keys::ARG) {
                    Some(Value::Bytes(arg)) => Ok(Self::Replied(arg.clone())),
                    _ => Err(invalid("reply without arg")),
                }
            }
            Some(Value::Text(status)) if status == "rejected" => {
                let code = match lookup(map, keys::REJECT_CODE) {
                    Some(Value::Integer(i)) => {
                        u64::try_from(*i).map_err(|_| invalid("reject_code out of range"))?
                    }
                    None => 0,
                    Some(_) => return Err(invalid("reject_code must be an integer")),
                };
                let message = match lookup(map, keys::REJECT_MESSAGE) {
                    Some(Value::Text(m)) => m.clone(),
                    _ => return Err(invalid("rejected without reject_message")),
                };
                Ok(Self::Rejected { code, message })
            }
            Some(Value::Text(other)) => Err(invalid(&format!("unexpected status {other:?}"))),
            _ => Err(invalid("missing status")),
        }
    }

    /// Reply bytes, or the rejection as an error.
    pub fn into_reply(self) -> Result<Vec<u8>> {
        match self {
            Self::Replied(arg) => Ok(arg),
            Self::Rejected { code, message } => Err(AgentError::Rejected { code, message }),
        }
    }
}

fn lookup<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
        .map(|(_, v)| v)
}

fn invalid(msg: &str) -> AgentError {
    AgentError::InvalidReply(msg.to_string())
}
