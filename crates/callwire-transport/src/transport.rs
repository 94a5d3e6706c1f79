//! Transport abstraction.
//!
//! A transport moves already-signed envelope bytes to a replica and hands
//! back the raw response body. It knows nothing about signing, CBOR or
//! polling; those live above it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use callwire_core::{Principal, RequestId};

use crate::error::Result;

/// Delivery of envelopes to the three replica endpoints.
///
/// Implementations must be thread-safe (Send + Sync) since one transport is
/// shared by every in-flight call of an agent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a query envelope and return the encoded response.
    async fn query(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes>;

    /// Submit an update envelope. Success means it was accepted for
    /// processing, not that it has executed.
    async fn call(&self, canister: &Principal, request_id: &RequestId, envelope: Bytes)
        -> Result<()>;

    /// Submit a read_state envelope and return the encoded response.
    async fn read_state(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn query(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
        (**self).query(canister, envelope).await
    }

    async fn call(
        &self,
        canister: &Principal,
        request_id: &RequestId,
        envelope: Bytes,
    ) -> Result<()> {
        (**self).call(canister, request_id, envelope).await
    }

    async fn read_state(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
        (**self).read_state(canister, envelope).await
    }
}

/// A scripted in-memory replica for testing.
///
/// Responses are queued per endpoint and handed out in order. Every
/// submitted envelope is recorded so tests can inspect what was sent.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    use crate::error::TransportError;

    /// Which endpoint an envelope was sent to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Endpoint {
        Query,
        Call,
        ReadState,
    }

    /// An envelope as received by the replica.
    #[derive(Debug, Clone)]
    pub struct Submission {
        pub endpoint: Endpoint,
        pub canister: Principal,
        pub envelope: Bytes,
    }

    #[derive(Default)]
    struct Script {
        query: VecDeque<Result<Bytes>>,
        call: VecDeque<Result<()>>,
        read_state: VecDeque<Result<Bytes>>,
        read_state_fallback: Option<Bytes>,
        submissions: Vec<Submission>,
    }

    /// In-memory replica with scripted responses.
    #[derive(Default)]
    pub struct ScriptedReplica {
        script: Mutex<Script>,
        latency: Option<Duration>,
        query_count: AtomicUsize,
        call_count: AtomicUsize,
        read_state_count: AtomicUsize,
    }

    impl ScriptedReplica {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every response by `latency`.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        pub async fn push_query(&self, response: Result<Bytes>) {
            self.script.lock().await.query.push_back(response);
        }

        pub async fn push_call(&self, result: Result<()>) {
            self.script.lock().await.call.push_back(result);
        }

        pub async fn push_read_state(&self, response: Result<Bytes>) {
            self.script.lock().await.read_state.push_back(response);
        }

        /// Response to repeat once the read_state queue is exhausted.
        pub async fn set_read_state_fallback(&self, response: Bytes) {
            self.script.lock().await.read_state_fallback = Some(response);
        }

        pub fn query_count(&self) -> usize {
            self.query_count.load(Ordering::SeqCst)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn read_state_count(&self) -> usize {
            self.read_state_count.load(Ordering::SeqCst)
        }

        /// Everything submitted so far, in order.
        pub async fn submissions(&self) -> Vec<Submission> {
            self.script.lock().await.submissions.clone()
        }

        async fn record(&self, endpoint: Endpoint, canister: &Principal, envelope: Bytes) {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.script.lock().await.submissions.push(Submission {
                endpoint,
                canister: canister.clone(),
                envelope,
            });
        }
    }

    #[async_trait]
    impl Transport for ScriptedReplica {
        async fn query(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
            self.query_count.fetch_add(1, Ordering::SeqCst);
            self.record(Endpoint::Query, canister, envelope).await;
            self.script
                .lock()
                .await
                .query
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Script("no query response queued".into())))
        }

        async fn call(
            &self,
            canister: &Principal,
            _request_id: &RequestId,
            envelope: Bytes,
        ) -> Result<()> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.record(Endpoint::Call, canister, envelope).await;
            self.script.lock().await.call.pop_front().unwrap_or(Ok(()))
        }

        async fn read_state(&self, canister: &Principal, envelope: Bytes) -> Result<Bytes> {
            self.read_state_count.fetch_add(1, Ordering::SeqCst);
            self.record(Endpoint::ReadState, canister, envelope).await;
            let mut script = self.script.lock().await;
            match script.read_state.pop_front() {
                Some(response) => response,
                None => script.read_state_fallback.clone().ok_or_else(|| {
                    TransportError::Script("no read_state response queued".into())
                }),
            }
        }
    }
}
