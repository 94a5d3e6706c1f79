//! Representation-independent hashing of structured requests.
//!
//! The request id of a map is computed as:
//!
//! 1. For every present field: `sha256(name) || hash(value)`
//! 2. Sort those 64-byte pairs by their bytes
//! 3. `sha256(concatenation of the sorted pairs)`
//!
//! Value hashing is type-directed:
//! - byte string: `sha256(bytes)`
//! - text: `sha256(utf8)`
//! - unsigned integer: `sha256(leb128(n))`
//! - array: `sha256(hash(item_0) || hash(item_1) || ...)`
//! - map: the map's own request id
//!
//! Sorting the pairs is what makes the id independent of field order, and
//! fields that are absent never reach the hash input.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, Result};

/// A 32-byte request identifier.
///
/// Signed (after domain separation) by the sender and used by the platform
/// to index `request_status` in the state tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Compute the request id of a CBOR map value.
    pub fn of_value(value: &Value) -> Result<Self> {
        match value {
            Value::Map(entries) => Self::of_map(entries),
            _ => Err(CoreError::MalformedRequest(
                "request id requires a map".into(),
            )),
        }
    }

    /// Compute the request id of map entries with text keys.
    pub fn of_map(entries: &[(Value, Value)]) -> Result<Self> {
        let mut pairs = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let name = match key {
                Value::Text(name) => name,
                other => {
                    return Err(CoreError::MalformedRequest(format!(
                        "field names must be text, got {other:?}"
                    )))
                }
            };

            let mut pair = [0u8; 64];
            pair[..32].copy_from_slice(&sha256(name.as_bytes()));
            pair[32..].copy_from_slice(&hash_value(value)?);
            pairs.push(pair);
        }

        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        for pair in &pairs {
            hasher.update(pair);
        }
        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for RequestId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for RequestId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for RequestId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> std::result::Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Hash a single field value.
pub fn hash_value(value: &Value) -> Result<[u8; 32]> {
    match value {
        Value::Bytes(bytes) => Ok(sha256(bytes)),
        Value::Text(text) => Ok(sha256(text.as_bytes())),
        Value::Integer(i) => {
            let n = u64::try_from(*i).map_err(|_| {
                CoreError::MalformedRequest("only unsigned integers are hashable".into())
            })?;
            Ok(sha256(&encode_leb128(n)))
        }
        Value::Array(items) => {
            let mut hasher = Sha256::new();
            for item in items {
                hasher.update(hash_value(item)?);
            }
            Ok(hasher.finalize().into())
        }
        Value::Map(entries) => Ok(RequestId::of_map(entries)?.0),
        other => Err(CoreError::MalformedRequest(format!(
            "unhashable value: {other:?}"
        ))),
    }
}

/// SHA-256 of the given bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Unsigned LEB128 encoding.
pub fn encode_leb128(mut n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Unsigned LEB128 decoding. The whole input must be consumed.
pub fn decode_leb128(bytes: &[u8]) -> Result<u64> {
    let mut n: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        if shift >= 64 {
            return Err(CoreError::DecodingError("leb128 overflow".into()));
        }
        n |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            if i + 1 != bytes.len() {
                return Err(CoreError::DecodingError("trailing bytes after leb128".into()));
            }
            return Ok(n);
        }
    }
    Err(CoreError::DecodingError("truncated leb128".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn public_example() -> Vec<(Value, Value)> {
        vec![
            (text("request_type"), text("call")),
            (
                text("canister_id"),
                Value::Bytes(vec![0, 0, 0, 0, 0, 0, 0x04, 0xd2]),
            ),
            (text("method_name"), text("hello")),
            (text("arg"), Value::Bytes(b"DIDL\x00\xFD*".to_vec())),
        ]
    }

    #[test]
    fn test_public_interface_example() {
        let id = RequestId::of_map(&public_example()).unwrap();
        assert_eq!(
            id.to_hex(),
            "8781291c347db32a9d8c10eb62b710fce5a93be676474c42babc74c51858f94b"
        );
    }

    #[test]
    fn test_field_order_independent() {
        let mut entries = public_example();
        let forward = RequestId::of_map(&entries).unwrap();
        entries.reverse();
        let backward = RequestId::of_map(&entries).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_value_change_changes_id() {
        let base = RequestId::of_map(&public_example()).unwrap();

        let mut changed = public_example();
        changed[2].1 = text("hellO");
        assert_ne!(base, RequestId::of_map(&changed).unwrap());
    }

    #[test]
    fn test_name_change_changes_id() {
        let base = RequestId::of_map(&public_example()).unwrap();

        let mut renamed = public_example();
        renamed[2].0 = text("method");
        assert_ne!(base, RequestId::of_map(&renamed).unwrap());
    }

    #[test]
    fn test_extra_field_changes_id() {
        let base = RequestId::of_map(&public_example()).unwrap();

        let mut extended = public_example();
        extended.push((text("nonce"), Value::Bytes(vec![1, 2, 3])));
        assert_ne!(base, RequestId::of_map(&extended).unwrap());
    }

    #[test]
    fn test_nested_arrays_hash_recursively() {
        let leaf_a = Value::Bytes(b"request_status".to_vec());
        let leaf_b = Value::Bytes(vec![0xab; 32]);
        let path = Value::Array(vec![leaf_a.clone(), leaf_b.clone()]);
        let paths = Value::Array(vec![path.clone()]);

        let mut inner = Sha256::new();
        inner.update(sha256(b"request_status"));
        inner.update(sha256(&[0xab; 32]));
        let path_hash: [u8; 32] = inner.finalize().into();

        assert_eq!(hash_value(&path).unwrap(), path_hash);
        assert_eq!(hash_value(&paths).unwrap(), sha256(&path_hash));
    }

    #[test]
    fn test_integer_hashes_leb128() {
        let value = Value::Integer(624485u64.into());
        assert_eq!(hash_value(&value).unwrap(), sha256(&[0xe5, 0x8e, 0x26]));
    }

    #[test]
    fn test_unhashable_values_rejected() {
        assert!(hash_value(&Value::Bool(true)).is_err());
        assert!(hash_value(&Value::Null).is_err());
        assert!(hash_value(&Value::Integer((-1i64).into())).is_err());
        assert!(RequestId::of_value(&text("not a map")).is_err());
    }

    #[test]
    fn test_leb128_roundtrip_edges() {
        assert_eq!(encode_leb128(0), vec![0x00]);
        assert_eq!(encode_leb128(127), vec![0x7f]);
        assert_eq!(encode_leb128(128), vec![0x80, 0x01]);
        assert_eq!(decode_leb128(&encode_leb128(u64::MAX)).unwrap(), u64::MAX);
        assert!(decode_leb128(&[0x80]).is_err());
        assert!(decode_leb128(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_request_id_hex_roundtrip() {
        let id = RequestId::from_bytes([0x42; 32]);
        assert_eq!(RequestId::from_hex(&id.to_hex()).unwrap(), id);
    }

    proptest! {
        #[test]
        fn prop_permutation_invariant(
            fields in prop::collection::btree_map("[a-z_]{1,12}", prop::collection::vec(any::<u8>(), 0..48), 1..8),
            seed in any::<u64>(),
        ) {
            let entries: Vec<(Value, Value)> = fields
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), Value::Bytes(v.clone())))
                .collect();

            // Deterministic rotation + reversal as the permutation
            let mut shuffled = entries.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            prop_assert_eq!(
                RequestId::of_map(&entries).unwrap(),
                RequestId::of_map(&shuffled).unwrap()
            );
        }
    }
}
