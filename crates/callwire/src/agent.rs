//! The agent: builds, signs and submits requests, and waits for updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use callwire_core::certificate::{parse_read_state_response, request_status_field, request_status_path};
use callwire_core::{
    Certificate, CoreError, EnvelopeSigner, Identity, Path, Principal, Request, RequestId,
    SignedRequest,
};
use callwire_transport::Transport;

use crate::codec::{CandidCodec, ReplyCodec};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::poll::{PollOutcome, Poller};
use crate::response::QueryResponse;
use crate::status::RequestStatus;

type NonceFactory = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

/// A client session against one replica.
///
/// Holds the identity, the transport, a reply codec and immutable
/// configuration. All operations take `&self`, so one agent can serve any
/// number of concurrent calls.
pub struct Agent<T, C = CandidCodec> {
    identity: Arc<Identity>,
    transport: T,
    codec: C,
    config: AgentConfig,
    nonce_factory: Option<NonceFactory>,
    /// Last ingress expiry handed out, shared by clones.
    last_expiry: Arc<AtomicU64>,
}

impl<T: Transport> Agent<T> {
    /// Create an agent with the candid codec and default configuration.
    pub fn new(identity: Identity, transport: T) -> Self {
        Self {
            identity: Arc::new(identity),
            transport,
            codec: CandidCodec::default(),
            config: AgentConfig::default(),
            nonce_factory: None,
            last_expiry: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: Transport, C: ReplyCodec> Agent<T, C> {
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Swap the reply codec.
    pub fn with_codec<C2: ReplyCodec>(self, codec: C2) -> Agent<T, C2> {
        Agent {
            identity: self.identity,
            transport: self.transport,
            codec,
            config: self.config,
            nonce_factory: self.nonce_factory,
            last_expiry: self.last_expiry,
        }
    }

    /// Attach a fresh nonce from `factory` to every query and call.
    pub fn with_nonce_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        self.nonce_factory = Some(Arc::new(factory));
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The principal requests are sent as.
    pub fn get_principal(&self) -> Principal {
        self.identity.sender()
    }

    /// Run a query and decode its reply.
    pub async fn query(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> Result<C::Value> {
        let reply = self.query_raw(canister, method, arg).await?;
        self.decode_reply(method, &reply)
    }

    /// Run a query and return the undecoded reply bytes.
    ///
    /// A rejection is returned as [`AgentError::Rejected`](crate::AgentError::Rejected) with the
    /// replica's message untouched.
    pub async fn query_raw(
        &self,
        canister: &Principal,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.check_targets(canister)?;
        let request = self.with_nonce(Request::query(
            self.identity.sender(),
            canister.clone(),
            method,
            arg,
            self.ingress_expiry(),
        ));
        let signed = self.sign(&request)?;
        tracing::debug!(canister = %canister, method, request_id = %signed.request_id, "query");

        let body = self
            .transport
            .query(canister, Bytes::from(signed.bytes))
            .await?;
        QueryResponse::from_cbor(&body)?.into_reply()
    }

    /// Submit an update, wait for it, and decode its reply.
    pub async fn update(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> Result<C::Value> {
        let reply = self.update_raw(canister, method, arg).await?;
        self.decode_reply(method, &reply)
    }

    /// Submit an update and wait for its undecoded reply.
    pub async fn update_raw(
        &self,
        canister: &Principal,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let request_id = self.submit(canister, method, arg).await?;
        self.wait(canister, &request_id).await
    }

    /// Sign and submit an update without waiting for it.
    pub async fn submit(&self, canister: &Principal, method: &str, arg: Vec<u8>) -> Result<RequestId> {
        self.check_targets(canister)?;
        let request = self.with_nonce(Request::call(
            self.identity.sender(),
            canister.clone(),
            method,
            arg,
            self.ingress_expiry(),
        ));
        let signed = self.sign(&request)?;
        tracing::debug!(canister = %canister, method, request_id = %signed.request_id, "call");

        self.transport
            .call(canister, &signed.request_id, Bytes::from(signed.bytes))
            .await?;
        Ok(signed.request_id)
    }

    /// Poll a submitted update with a fresh timeout and return its reply.
    pub async fn wait(&self, canister: &Principal, request_id: &RequestId) -> Result<Vec<u8>> {
        self.poll(canister, request_id)
            .await?
            .into_reply(request_id)
    }

    /// Poll a submitted update until a terminal outcome or the deadline.
    pub async fn poll(&self, canister: &Principal, request_id: &RequestId) -> Result<PollOutcome> {
        Poller::new(self.config.poll.clone())
            .poll(self, canister, request_id)
            .await
    }

    /// Fetch a certificate for the given state paths.
    pub async fn read_state(&self, canister: &Principal, paths: Vec<Path>) -> Result<Certificate> {
        let signed = self.sign_read_state(paths)?;
        let body = self
            .transport
            .read_state(canister, Bytes::from(signed.bytes))
            .await?;
        Ok(parse_read_state_response(&body)?)
    }

    /// One read of a request's status.
    ///
    /// A status missing from the certificate is reported as `Unknown`.
    pub async fn request_status(
        &self,
        canister: &Principal,
        request_id: &RequestId,
    ) -> Result<(RequestStatus, Certificate)> {
        let certificate = self
            .read_state(canister, vec![request_status_path(request_id)])
            .await?;
        let status = certificate
            .lookup_bytes(&request_status_field(request_id, "status"))
            .map(RequestStatus::from_leaf)
            .unwrap_or(RequestStatus::Unknown);
        tracing::debug!(request_id = %request_id, %status, "request status");
        Ok((status, certificate))
    }

    /// Sign a read_state request for `[request_status, <id>]`.
    pub(crate) fn sign_status_request(&self, request_id: &RequestId) -> Result<SignedRequest> {
        self.sign_read_state(vec![request_status_path(request_id)])
    }

    fn sign_read_state(&self, paths: Vec<Path>) -> Result<SignedRequest> {
        let request = Request::read_state(self.identity.sender(), paths, self.ingress_expiry());
        self.sign(&request)
    }

    fn sign(&self, request: &Request) -> Result<SignedRequest> {
        Ok(EnvelopeSigner::new(&self.identity, &self.config.separators).build(request)?)
    }

    fn decode_reply(&self, method: &str, reply: &[u8]) -> Result<C::Value> {
        let hint = self.codec.hint_for(method);
        self.codec.decode(reply, hint.as_ref())
    }

    fn with_nonce(&self, request: Request) -> Request {
        match &self.nonce_factory {
            Some(factory) => request.with_nonce(factory()),
            None => request,
        }
    }

    fn check_targets(&self, canister: &Principal) -> Result<()> {
        match self.identity.delegation_chain() {
            Some(chain) if !chain.permits(canister) => Err(CoreError::MalformedRequest(format!(
                "delegation does not permit calls to {canister}"
            ))
            .into()),
            _ => Ok(()),
        }
    }

    /// Absolute expiry for a request built now, in nanoseconds.
    ///
    /// Strictly increasing across requests from this agent and its clones,
    /// even within one clock tick or after the clock steps back.
    fn ingress_expiry(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let expiry = now + self.config.ingress_expiry;
        let candidate = u64::try_from(expiry.as_nanos()).unwrap_or(u64::MAX);

        let next = |last: u64| candidate.max(last.saturating_add(1));
        let previous = self
            .last_expiry
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
            .unwrap_or_else(|last| last);
        next(previous)
    }
}

impl<T: Clone, C: Clone> Clone for Agent<T, C> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            transport: self.transport.clone(),
            codec: self.codec.clone(),
            config: self.config.clone(),
            nonce_factory: self.nonce_factory.clone(),
            last_expiry: Arc::clone(&self.last_expiry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use callwire_core::{DelegationChain, KeyPair, Scheme};
    use callwire_transport::ScriptedReplica;

    fn canister(n: u8) -> Principal {
        Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, n]).unwrap()
    }

    #[test]
    fn test_ingress_expiry_window() {
        let agent = Agent::new(Identity::anonymous(), ScriptedReplica::new());
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let expiry = agent.ingress_expiry();
        let window = 300 * 1_000_000_000u64;
        assert!(expiry >= now + window);
        assert!(expiry < now + window + 5 * 1_000_000_000);
    }

    #[test]
    fn test_ingress_expiry_strictly_increases() {
        let agent = Agent::new(Identity::anonymous(), ScriptedReplica::new());
        let original = Agent::new(Identity::anonymous(), Arc::new(ScriptedReplica::new()));
        let shared = original.clone();

        let mut last = agent.ingress_expiry();
        for _ in 0..1000 {
            let next = agent.ingress_expiry();
            assert!(next > last);
            last = next;
        }

        let a = original.ingress_expiry();
        let b = shared.ingress_expiry();
        let c = original.ingress_expiry();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ingress_expiry_survives_clock_behind_last() {
        let agent = Agent::new(Identity::anonymous(), ScriptedReplica::new());
        let ahead = agent.ingress_expiry() + 3_600 * 1_000_000_000;
        agent.last_expiry.store(ahead, Ordering::SeqCst);
        assert_eq!(agent.ingress_expiry(), ahead + 1);
        assert_eq!(agent.ingress_expiry(), ahead + 2);
    }

    #[test]
    fn test_principal_follows_identity() {
        let identity = Identity::generate(Scheme::Ed25519);
        let expected = identity.sender();
        let agent = Agent::new(identity, ScriptedReplica::new());
        assert_eq!(agent.get_principal(), expected);
    }

    #[tokio::test]
    async fn test_targets_enforced_before_io() {
        let seps = callwire_core::DomainSeparators::default();
        let outer = KeyPair::generate(Scheme::Ed25519);
        let chain = DelegationChain::issue(
            &outer,
            KeyPair::generate(Scheme::Ed25519),
            u64::MAX,
            Some(vec![canister(1)]),
            &seps,
        )
        .unwrap();
        let mut identity = Identity::generate(Scheme::Ed25519);
        identity.add_delegation(chain).unwrap();

        let replica = Arc::new(ScriptedReplica::new());
        let agent = Agent::new(identity, Arc::clone(&replica));

        let err = agent.submit(&canister(2), "go", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Core(CoreError::MalformedRequest(_))
        ));
        let err = agent.query_raw(&canister(2), "go", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Core(CoreError::MalformedRequest(_))
        ));
        assert_eq!(replica.call_count(), 0);
        assert_eq!(replica.query_count(), 0);

        agent.submit(&canister(1), "go", vec![]).await.unwrap();
        assert_eq!(replica.call_count(), 1);
    }

    #[tokio::test]
    async fn test_nonce_factory_applies_to_calls() {
        let replica = Arc::new(ScriptedReplica::new());
        let agent = Agent::new(Identity::anonymous(), Arc::clone(&replica))
            .with_nonce_factory(|| vec![0xab; 8]);

        agent.submit(&canister(1), "go", vec![]).await.unwrap();
        let submissions = replica.submissions().await;
        let envelope = callwire_core::Envelope::decode(&submissions[0].envelope).unwrap();
        let callwire_core::Request::Call(content) = envelope.content else {
            panic!("expected call content");
        };
        assert_eq!(content.nonce, Some(vec![0xab; 8]));
    }
}
