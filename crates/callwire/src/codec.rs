//! Reply codecs.
//!
//! The agent treats arguments and replies as opaque bytes; a codec turns
//! them into values. Decoding may be steered by a type hint that the codec
//! looks up by method name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use candid::types::Type;
use candid::{CandidType, IDLArgs, TypeEnv};

use crate::error::{AgentError, Result};

/// Encoding of call arguments and decoding of replies.
pub trait ReplyCodec: Send + Sync {
    /// Decoded value type.
    type Value;
    /// Decoding hint, looked up per method.
    type Hint;

    fn encode_args(&self, values: &Self::Value) -> Result<Vec<u8>>;

    /// The hint registered for a method, if any.
    fn hint_for(&self, method: &str) -> Option<Self::Hint>;

    /// Decode reply bytes. Without a hint the codec uses its generic decoding.
    fn decode(&self, bytes: &[u8], hint: Option<&Self::Hint>) -> Result<Self::Value>;
}

type TypeFactory = Arc<dyn Fn() -> Vec<Type> + Send + Sync>;

/// Caller-maintained table of method name → expected return types.
#[derive(Clone, Default)]
pub struct ReturnTypes {
    entries: HashMap<String, TypeFactory>,
}

impl ReturnTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single return value of type `T`.
    pub fn insert<T: CandidType>(&mut self, method: impl Into<String>) -> &mut Self {
        self.insert_with(method, || vec![T::ty()])
    }

    /// Register an arbitrary list of return types.
    pub fn insert_with<F>(&mut self, method: impl Into<String>, types: F) -> &mut Self
    where
        F: Fn() -> Vec<Type> + Send + Sync + 'static,
    {
        self.entries.insert(method.into(), Arc::new(types));
        self
    }

    pub fn get(&self, method: &str) -> Option<Vec<Type>> {
        self.entries.get(method).map(|factory| factory())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ReturnTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.entries.keys().collect();
        methods.sort();
        f.debug_struct("ReturnTypes").field("methods", &methods).finish()
    }
}

/// Candid codec over [`IDLArgs`].
#[derive(Debug, Clone, Default)]
pub struct CandidCodec {
    return_types: ReturnTypes,
}

impl CandidCodec {
    pub fn new(return_types: ReturnTypes) -> Self {
        Self { return_types }
    }

    pub fn return_types(&self) -> &ReturnTypes {
        &self.return_types
    }
}

impl ReplyCodec for CandidCodec {
    type Value = IDLArgs;
    type Hint = Vec<Type>;

    fn encode_args(&self, values: &IDLArgs) -> Result<Vec<u8>> {
        values
            .to_bytes()
            .map_err(|e| AgentError::Codec(e.to_string()))
    }

    fn hint_for(&self, method: &str) -> Option<Vec<Type>> {
        self.return_types.get(method)
    }

    fn decode(&self, bytes: &[u8], hint: Option<&Vec<Type>>) -> Result<IDLArgs> {
        let decoded = match hint {
            Some(types) => IDLArgs::from_bytes_with_types(bytes, &TypeEnv::new(), types),
            None => IDLArgs::from_bytes(bytes),
        };
        decoded.map_err(|e| AgentError::Codec(e.to_string()))
    }
}

/// Pass-through codec: values are the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ReplyCodec for RawCodec {
    type Value = Vec<u8>;
    type Hint = ();

    fn encode_args(&self, values: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(values.clone())
    }

    fn hint_for(&self, _method: &str) -> Option<()> {
        None
    }

    fn decode(&self, bytes: &[u8], _hint: Option<&()>) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
