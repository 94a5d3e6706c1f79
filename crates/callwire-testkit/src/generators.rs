//! Proptest generators for property-based testing.

use ciborium::value::Value;
use proptest::prelude::*;

use callwire_core::{Principal, Request, RequestId};

/// Generate a principal of any valid length.
pub fn principal() -> impl Strategy<Value = Principal> {
    prop::collection::vec(any::<u8>(), 0..=29)
        .prop_map(|bytes| Principal::from_slice(&bytes).expect("at most 29 bytes"))
}

/// Generate a random RequestId.
pub fn request_id() -> impl Strategy<Value = RequestId> {
    any::<[u8; 32]>().prop_map(RequestId::from_bytes)
}

/// Generate a method name.
pub fn method_name() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,23}".prop_map(String::from)
}

/// Generate argument bytes of specified max length.
pub fn arg(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a state tree path.
pub fn path() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..=32), 1..=4)
}

/// Generate a `query` or `call` request, with or without a nonce.
pub fn call_request() -> impl Strategy<Value = Request> {
    (
        any::<bool>(),
        principal(),
        principal(),
        method_name(),
        arg(256),
        any::<u64>(),
        proptest::option::of(prop::collection::vec(any::<u8>(), 1..=16)),
    )
        .prop_map(|(is_query, sender, canister, method, arg, expiry, nonce)| {
            let request = if is_query {
                Request::query(sender, canister, method, arg, expiry)
            } else {
                Request::call(sender, canister, method, arg, expiry)
            };
            match nonce {
                Some(nonce) => request.with_nonce(nonce),
                None => request,
            }
        })
}

/// Generate a `read_state` request.
pub fn read_state_request() -> impl Strategy<Value = Request> {
    (
        principal(),
        prop::collection::vec(path(), 0..=4),
        any::<u64>(),
    )
        .prop_map(|(sender, paths, expiry)| Request::read_state(sender, paths, expiry))
}

/// Generate any request.
pub fn request() -> impl Strategy<Value = Request> {
    prop_oneof![call_request(), read_state_request()]
}

/// Generate a hashable field value: bytes, text, nat or nested arrays.
pub fn field_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        prop::collection::vec(any::<u8>(), 0..=32).prop_map(Value::Bytes),
        "[ -~]{0,16}".prop_map(Value::Text),
        any::<u64>().prop_map(|n| Value::Integer(n.into())),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..=4).prop_map(Value::Array)
    })
}

/// Generate map entries with distinct text keys.
pub fn content_fields() -> impl Strategy<Value = Vec<(Value, Value)>> {
    prop::collection::btree_map("[a-z_]{1,12}", field_value(), 1..=8).prop_map(|fields| {
        fields
            .into_iter()
            .map(|(name, value)| (Value::Text(name), value))
            .collect()
    })
}

/// Generate a non-terminal status leaf.
pub fn non_terminal_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("pending"),
        Just("received"),
        Just("processing"),
        Just("unknown"),
    ]
}
