//! Certificates and their hash trees.
//!
//! A `read_state` response carries a certificate: a pruned hash tree of the
//! platform state plus a signature over its root. Only lookups are done
//! here; checking the root signature needs the platform's threshold key
//! and is left to callers that have one.
//!
//! Tree nodes on the wire:
//!
//! | Node    | CBOR                    |
//! |---------|-------------------------|
//! | Empty   | `[0]`                   |
//! | Fork    | `[1, left, right]`      |
//! | Labeled | `[2, label, subtree]`   |
//! | Leaf    | `[3, bytes]`            |
//! | Pruned  | `[4, digest]`           |

use ciborium::value::Value;
use sha2::{Digest, Sha256};

use crate::delegation::normalize_bytes;
use crate::envelope::{decode_value, encode_tagged};
use crate::error::{CoreError, Result};
use crate::request::{Label, Path};
use crate::request_id::RequestId;

mod keys {
    pub const TREE: &str = "tree";
    pub const SIGNATURE: &str = "signature";
    pub const DELEGATION: &str = "delegation";
    pub const SUBNET_ID: &str = "subnet_id";
    pub const CERTIFICATE: &str = "certificate";
}

/// Top-level label of the request status subtree.
pub const REQUEST_STATUS: &[u8] = b"request_status";

mod tags {
    pub const EMPTY: u64 = 0;
    pub const FORK: u64 = 1;
    pub const LABELED: u64 = 2;
    pub const LEAF: u64 = 3;
    pub const PRUNED: u64 = 4;
}

/// A (possibly pruned) hash tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<HashTree>, Box<HashTree>),
    Labeled(Label, Box<HashTree>),
    Leaf(Vec<u8>),
    Pruned([u8; 32]),
}

/// Outcome of a path lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult<'a> {
    /// The path leads to a leaf with this value.
    Found(&'a [u8]),
    /// The tree proves the path does not exist.
    Absent,
    /// The path runs into a pruned subtree.
    Unknown,
}

impl<'a> LookupResult<'a> {
    pub fn found(self) -> Option<&'a [u8]> {
        match self {
            Self::Found(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl HashTree {
    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn fork(left: HashTree, right: HashTree) -> Self {
        Self::Fork(Box::new(left), Box::new(right))
    }

    pub fn labeled(label: impl Into<Label>, subtree: HashTree) -> Self {
        Self::Labeled(label.into(), Box::new(subtree))
    }

    pub fn leaf(value: impl Into<Vec<u8>>) -> Self {
        Self::Leaf(value.into())
    }

    pub fn pruned(digest: [u8; 32]) -> Self {
        Self::Pruned(digest)
    }

    /// Build a tree holding one leaf per `(path, value)`, forking siblings.
    ///
    /// Later entries win when two paths are identical.
    pub fn from_paths<P, V>(entries: impl IntoIterator<Item = (P, V)>) -> Self
    where
        P: IntoIterator,
        P::Item: Into<Label>,
        V: Into<Vec<u8>>,
    {
        let mut root = Node::Branch(Vec::new());
        for (path, value) in entries {
            let path: Vec<Label> = path.into_iter().map(Into::into).collect();
            root.insert(&path, value.into());
        }
        root.into_tree()
    }

    /// Look up a path of labels.
    pub fn lookup<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        let Some((first, rest)) = path.split_first() else {
            return match self {
                Self::Leaf(value) => LookupResult::Found(value),
                Self::Pruned(_) => LookupResult::Unknown,
                _ => LookupResult::Absent,
            };
        };

        let mut pruned = false;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Fork(left, right) => {
                    stack.push(right.as_ref());
                    stack.push(left.as_ref());
                }
                Self::Labeled(label, subtree) if label.as_slice() == first.as_ref() => {
                    return subtree.lookup(rest);
                }
                Self::Pruned(_) => pruned = true,
                _ => {}
            }
        }

        if pruned {
            LookupResult::Unknown
        } else {
            LookupResult::Absent
        }
    }

    /// Root digest of the tree.
    pub fn digest(&self) -> [u8; 32] {
        match self {
            Self::Empty => domain_hash(b"ic-hashtree-empty", &[]),
            Self::Fork(left, right) => {
                domain_hash(b"ic-hashtree-fork", &[&left.digest(), &right.digest()])
            }
            Self::Labeled(label, subtree) => {
                domain_hash(b"ic-hashtree-labeled", &[label.as_slice(), &subtree.digest()])
            }
            Self::Leaf(value) => domain_hash(b"ic-hashtree-leaf", &[value.as_slice()]),
            Self::Pruned(digest) => *digest,
        }
    }

    pub fn to_value(&self) -> Value {
        let tag = |t: u64| Value::Integer(t.into());
        match self {
            Self::Empty => Value::Array(vec![tag(tags::EMPTY)]),
            Self::Fork(l, r) => Value::Array(vec![tag(tags::FORK), l.to_value(), r.to_value()]),
            Self::Labeled(label, sub) => Value::Array(vec![
                tag(tags::LABELED),
                Value::Bytes(label.clone()),
                sub.to_value(),
            ]),
            Self::Leaf(v) => Value::Array(vec![tag(tags::LEAF), Value::Bytes(v.clone())]),
            Self::Pruned(d) => Value::Array(vec![tag(tags::PRUNED), Value::Bytes(d.to_vec())]),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => return Err(malformed("tree node must be a non-empty array")),
        };
        let node_tag = match &items[0] {
            Value::Integer(i) => u64::try_from(*i).map_err(|_| malformed("bad node tag"))?,
            _ => return Err(malformed("node tag must be an integer")),
        };
        let arg = |idx: usize| items.get(idx).ok_or_else(|| malformed("truncated tree node"));
        let bytes = |idx: usize| match arg(idx)? {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(malformed("expected bytes in tree node")),
        };

        match (node_tag, items.len()) {
            (tags::EMPTY, 1) => Ok(Self::Empty),
            (tags::FORK, 3) => Ok(Self::fork(
                Self::from_value(arg(1)?)?,
                Self::from_value(arg(2)?)?,
            )),
            (tags::LABELED, 3) => Ok(Self::Labeled(
                bytes(1)?,
                Box::new(Self::from_value(arg(2)?)?),
            )),
            (tags::LEAF, 2) => Ok(Self::Leaf(bytes(1)?)),
            (tags::PRUNED, 2) => {
                let digest: [u8; 32] = bytes(1)?
                    .try_into()
                    .map_err(|_| malformed("pruned digest must be 32 bytes"))?;
                Ok(Self::Pruned(digest))
            }
            (t, n) => Err(malformed(&format!("unknown tree node tag {t} with {n} items"))),
        }
    }
}

/// Delegation of certification authority from the root to a subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDelegation {
    pub subnet_id: Vec<u8>,
    /// The encoded certificate of the delegating authority.
    pub certificate: Vec<u8>,
}

/// A certificate: tree, root signature and optional delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub tree: HashTree,
    pub signature: Vec<u8>,
    pub delegation: Option<CertificateDelegation>,
}

impl Certificate {
    pub fn new(tree: HashTree, signature: Vec<u8>) -> Self {
        Self {
            tree,
            signature,
            delegation: None,
        }
    }

    /// Parse an encoded certificate.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let value = decode_value(bytes).map_err(|e| malformed(&e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        encode_tagged(self.to_value())
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Map(m) => m,
            _ => return Err(malformed("certificate must be a map")),
        };
        let get = |key: &str| -> Option<&Value> {
            map.iter()
                .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
                .map(|(_, v)| v)
        };

        let tree = match get(keys::TREE) {
            Some(v) => HashTree::from_value(v)?,
            None => return Err(malformed("missing tree")),
        };
        let signature = normalize_bytes(get(keys::SIGNATURE), keys::SIGNATURE)
            .map_err(|e| malformed(&e.to_string()))?;
        let delegation = match get(keys::DELEGATION) {
            Some(Value::Map(d)) => {
                let field = |key: &str| {
                    let v = d
                        .iter()
                        .find(|(k, _)| matches!(k, Value::Text(name) if name == key))
                        .map(|(_, v)| v);
                    normalize_bytes(v, key).map_err(|e| malformed(&e.to_string()))
                };
                Some(CertificateDelegation {
                    subnet_id: field(keys::SUBNET_ID)?,
                    certificate: field(keys::CERTIFICATE)?,
                })
            }
            Some(_) => return Err(malformed("delegation must be a map")),
            None => None,
        };

        Ok(Self {
            tree,
            signature,
            delegation,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            (Value::Text(keys::TREE.into()), self.tree.to_value()),
            (
                Value::Text(keys::SIGNATURE.into()),
                Value::Bytes(self.signature.clone()),
            ),
        ];
        if let Some(d) = &self.delegation {
            entries.push((
                Value::Text(keys::DELEGATION.into()),
                Value::Map(vec![
                    (
                        Value::Text(keys::SUBNET_ID.into()),
                        Value::Bytes(d.subnet_id.clone()),
                    ),
                    (
                        Value::Text(keys::CERTIFICATE.into()),
                        Value::Bytes(d.certificate.clone()),
                    ),
                ]),
            ));
        }
        Value::Map(entries)
    }

    pub fn lookup<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        self.tree.lookup(path)
    }

    /// Look up a path, returning the leaf bytes if present.
    pub fn lookup_bytes<L: AsRef<[u8]>>(&self, path: &[L]) -> Option<&[u8]> {
        self.tree.lookup(path).found()
    }
}

/// Parse a `read_state` response body: `{certificate: bytes}`.
pub fn parse_read_state_response(bytes: &[u8]) -> Result<Certificate> {
    let value = decode_value(bytes)?;
    let map = match &value {
        Value::Map(m) => m,
        _ => return Err(malformed("read_state response must be a map")),
    };
    let inner = map
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(name) if name == keys::CERTIFICATE))
        .map(|(_, v)| v);
    match inner {
        Some(Value::Bytes(cert)) => Certificate::from_cbor(cert),
        _ => Err(malformed("read_state response has no certificate")),
    }
}

/// Encode a `read_state` response body around a certificate.
pub fn encode_read_state_response(certificate: &Certificate) -> Result<Vec<u8>> {
    let cert = certificate.to_cbor()?;
    encode_tagged(Value::Map(vec![(
        Value::Text(keys::CERTIFICATE.into()),
        Value::Bytes(cert),
    )]))
}

/// `[request_status, <id>]`: the path to ask for in `read_state`.
pub fn request_status_path(request_id: &RequestId) -> Path {
    vec![REQUEST_STATUS.to_vec(), request_id.as_bytes().to_vec()]
}

/// `[request_status, <id>, <field>]`: a path to look up in the certificate.
pub fn request_status_field(request_id: &RequestId, field: &str) -> Path {
    let mut path = request_status_path(request_id);
    path.push(field.as_bytes().to_vec());
    path
}

fn domain_hash(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([domain.len() as u8]);
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn malformed(msg: &str) -> CoreError {
    CoreError::MalformedCertificate(msg.to_string())
}

/// Builder node for `HashTree::from_paths`.
enum Node {
    Leaf(Vec<u8>),
    Branch(Vec<(Label, Node)>),
}

impl Node {
    fn insert(&mut self, path: &[Label], value: Vec<u8>) {
        let Some((first, rest)) = path.split_first() else {
            *self = Node::Leaf(value);
            return;
        };
        if let Node::Leaf(_) = self {
            *self = Node::Branch(Vec::new());
        }
        if let Node::Branch(children) = self {
            let idx = match children.binary_search_by(|(label, _)| label.cmp(first)) {
                Ok(idx) => idx,
                Err(idx) => {
                    children.insert(idx, (first.clone(), Node::Branch(Vec::new())));
                    idx
                }
            };
            children[idx].1.insert(rest, value);
        }
    }

    fn into_tree(self) -> HashTree {
        match self {
            Node::Leaf(value) => HashTree::Leaf(value),
            Node::Branch(children) => children
                .into_iter()
                .map(|(label, child)| HashTree::labeled(label, child.into_tree()))
                .reduce(HashTree::fork)
                .unwrap_or(HashTree::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_tree(id: &RequestId, status: &str) -> HashTree {
        HashTree::from_paths([
            (request_status_field(id, "status"), status.as_bytes().to_vec()),
            (request_status_field(id, "reply"), b"DIDL\x00\x00".to_vec()),
        ])
    }

    #[test]
    fn test_lookup_found_and_absent() {
        let id = RequestId::from_bytes([0x33; 32]);
        let tree = status_tree(&id, "replied");

        assert_eq!(
            tree.lookup(&request_status_field(&id, "status")).found(),
            Some(&b"replied"[..])
        );
        assert_eq!(
            tree.lookup(&request_status_field(&id, "reject_code")),
            LookupResult::Absent
        );

        let other = RequestId::from_bytes([0x44; 32]);
        assert_eq!(
            tree.lookup(&request_status_field(&other, "status")),
            LookupResult::Absent
        );
    }

    #[test]
    fn test_lookup_through_pruned_is_unknown() {
        let tree = HashTree::fork(
            HashTree::pruned([0u8; 32]),
            HashTree::labeled(b"time".to_vec(), HashTree::leaf(vec![1])),
        );
        assert_eq!(tree.lookup(&[b"time"]).found(), Some(&[1u8][..]));
        assert_eq!(tree.lookup(&[b"request_status"]), LookupResult::Unknown);
    }

    #[test]
    fn test_lookup_stops_at_leaf_only() {
        let tree = HashTree::labeled(b"a".to_vec(), HashTree::leaf(b"x".to_vec()));
        assert_eq!(tree.lookup(&[b"a".as_slice(), b"b"]), LookupResult::Absent);
        assert_eq!(tree.lookup::<&[u8]>(&[]), LookupResult::Absent);
    }

    #[test]
    fn test_certificate_cbor_roundtrip() {
        let id = RequestId::from_bytes([0x55; 32]);
        let mut cert = Certificate::new(status_tree(&id, "processing"), vec![7; 48]);
        cert.delegation = Some(CertificateDelegation {
            subnet_id: vec![1, 2, 3],
            certificate: vec![4, 5, 6],
        });

        let parsed = Certificate::from_cbor(&cert.to_cbor().unwrap()).unwrap();
        assert_eq!(parsed, cert);
        assert_eq!(
            parsed.lookup_bytes(&request_status_field(&id, "status")),
            Some(&b"processing"[..])
        );
    }

    #[test]
    fn test_read_state_response_wrapper() {
        let id = RequestId::from_bytes([0x66; 32]);
        let cert = Certificate::new(status_tree(&id, "done"), vec![]);
        let body = encode_read_state_response(&cert).unwrap();
        assert_eq!(parse_read_state_response(&body).unwrap(), cert);

        assert!(parse_read_state_response(&encode_tagged(Value::Map(vec![])).unwrap()).is_err());
    }

    #[test]
    fn test_malformed_nodes_rejected() {
        let bad = Value::Array(vec![Value::Integer(9.into())]);
        assert!(matches!(
            HashTree::from_value(&bad),
            Err(CoreError::MalformedCertificate(_))
        ));
        let short_pruned = Value::Array(vec![Value::Integer(4.into()), Value::Bytes(vec![0; 3])]);
        assert!(HashTree::from_value(&short_pruned).is_err());
        assert!(Certificate::from_cbor(b"\x01").is_err());
    }

    #[test]
    fn test_pruning_preserves_digest() {
        let left = HashTree::labeled(b"a".to_vec(), HashTree::leaf(b"1".to_vec()));
        let right = HashTree::labeled(b"b".to_vec(), HashTree::leaf(b"2".to_vec()));
        let full = HashTree::fork(left.clone(), right.clone());
        let pruned = HashTree::fork(HashTree::pruned(left.digest()), right);
        assert_eq!(full.digest(), pruned.digest());
    }
}
