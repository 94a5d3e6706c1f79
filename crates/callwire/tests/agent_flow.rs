//! End-to-end agent flows against a scripted replica.
//!
//! Time is paused in every async test, so poll delays advance instantly
//! and elapsed times are exact.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use candid::IDLValue;
use tokio::time::Instant;

use callwire::core::certificate::request_status_path;
use callwire::core::{verify_signature, Envelope, Request};
use callwire::transport::{Endpoint, ScriptedReplica, TransportError};
use callwire::{AgentError, DomainSeparators, Identity, Principal, RawCodec, RequestId, RequestStatus};
use callwire_testkit::fixtures::{
    canister, certificate_with, delegated_identity, ed25519_key, query_rejected_body,
    query_replied_body, read_state_body, status_certificate, TestFixture,
};

/// Candid encoding of the single text value "hi".
const HI: &[u8] = b"DIDL\x00\x01\x71\x02hi";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn submitted_envelope(replica: &ScriptedReplica) -> Envelope {
    loop {
        let submissions = replica.submissions().await;
        if let Some(call) = submissions.iter().find(|s| s.endpoint == Endpoint::Call) {
            return Envelope::decode(&call.envelope).unwrap();
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_update_decodes_reply() {
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(30));

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.update(&canister(1234), "greet", b"DIDL\x00\x00".to_vec()).await }
    });

    let request_id = submitted_envelope(&fixture.replica)
        .await
        .request_id()
        .unwrap();
    fixture.script_reply(&request_id, HI).await;

    let reply = task.await.unwrap().unwrap();
    assert_eq!(reply.args, vec![IDLValue::Text("hi".into())]);
    assert_eq!(fixture.replica.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_third_read_state_replies() {
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(30));
    let target = canister(1234);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture
        .script_statuses(&request_id, &["received", "processing"])
        .await;
    fixture.script_reply(&request_id, HI).await;

    let start = Instant::now();
    let reply = agent.wait(&target, &request_id).await.unwrap();
    assert_eq!(reply, HI);
    assert_eq!(fixture.replica.read_state_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_no_read_state_after_terminal_status() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture.script_reply(&request_id, HI).await;
    fixture.script_statuses(&request_id, &["processing"]).await;

    agent.wait(&target, &request_id).await.unwrap();
    assert_eq!(fixture.replica.read_state_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_reports_last_status() {
    init_tracing();
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(5));
    let target = canister(7);

    let request_id = agent.submit(&target, "slow", vec![]).await.unwrap();
    fixture
        .replica
        .set_read_state_fallback(read_state_body(&status_certificate(&request_id, "processing")))
        .await;

    let start = Instant::now();
    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(err.is_timeout());
    match err {
        AgentError::PollTimeout {
            request_id: timed_out,
            last_status,
        } => {
            assert_eq!(timed_out, request_id);
            assert_eq!(last_status, Some(RequestStatus::Processing));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(fixture.replica.read_state_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_miss_reported_as_unknown() {
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(3));
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    let unrelated = RequestId::from_bytes([0; 32]);
    fixture
        .replica
        .set_read_state_fallback(read_state_body(&certificate_with(
            &unrelated,
            vec![("status", b"replied".to_vec())],
        )))
        .await;

    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::PollTimeout {
            last_status: Some(RequestStatus::Unknown),
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_read_state_bounded_by_deadline() {
    let replica = Arc::new(ScriptedReplica::new().with_latency(Duration::from_secs(60)));
    let fixture = TestFixture {
        identity: Identity::anonymous(),
        replica,
    };
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(3));
    let target = canister(7);

    let request_id = RequestId::from_bytes([3; 32]);
    let start = Instant::now();
    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    init_tracing();
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture
        .replica
        .push_read_state(Err(TransportError::Network("connection reset".into())))
        .await;
    fixture
        .replica
        .push_read_state(Err(TransportError::Http {
            status: 503,
            body: "overloaded".into(),
        }))
        .await;
    fixture
        .replica
        .push_read_state(Ok(Bytes::from_static(b"not cbor")))
        .await;
    fixture.script_reply(&request_id, HI).await;

    assert_eq!(agent.wait(&target, &request_id).await.unwrap(), HI);
    assert_eq!(fixture.replica.read_state_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_update() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture.script_statuses(&request_id, &["processing"]).await;
    fixture
        .script_rejection(&request_id, 4, "Canister trapped explicitly: nope")
        .await;

    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(err.is_rejected());
    assert!(matches!(
        err,
        AgentError::Rejected { code: 4, ref message } if message == "Canister trapped explicitly: nope"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_done_without_reply() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture.script_statuses(&request_id, &["done"]).await;

    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(matches!(err, AgentError::ReplyUnavailable(id) if id == request_id));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_wait_stops_polling() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture
        .replica
        .set_read_state_fallback(read_state_body(&status_certificate(&request_id, "received")))
        .await;

    let cut_short =
        tokio::time::timeout(Duration::from_millis(2500), agent.wait(&target, &request_id)).await;
    assert!(cut_short.is_err());
    let polled = fixture.replica.read_state_count();
    assert_eq!(polled, 3);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fixture.replica.read_state_count(), polled);
}

#[tokio::test]
async fn test_query_replied_and_decoded() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    fixture.replica.push_query(Ok(query_replied_body(HI))).await;

    let reply = agent
        .query(&canister(1), "greet", b"DIDL\x00\x00".to_vec())
        .await
        .unwrap();
    assert_eq!(reply.args, vec![IDLValue::Text("hi".into())]);
    assert_eq!(fixture.replica.read_state_count(), 0);
}

#[tokio::test]
async fn test_query_rejection_is_verbatim() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let message = "IC0503: Canister trapped: \u{1F4A5} not valid candid";
    fixture
        .replica
        .push_query(Ok(query_rejected_body(5, message)))
        .await;

    let err = agent
        .query(&canister(1), "greet", vec![])
        .await
        .unwrap_err();
    match err {
        AgentError::Rejected { code, message: got } => {
            assert_eq!(code, 5);
            assert_eq!(got, message);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_raw_codec_returns_bytes() {
    let fixture = TestFixture::new();
    let agent = fixture.agent().with_codec(RawCodec);
    fixture
        .replica
        .push_query(Ok(query_replied_body(b"\x00\x01not candid")))
        .await;

    let reply = agent.query(&canister(1), "blob", vec![]).await.unwrap();
    assert_eq!(reply, b"\x00\x01not candid");
}

#[tokio::test]
async fn test_call_envelope_signed_by_identity() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let target = canister(1234);

    let request_id = agent.submit(&target, "hello", b"DIDL\x00\x00".to_vec()).await.unwrap();
    let envelope = submitted_envelope(&fixture.replica).await;

    assert_eq!(envelope.request_id().unwrap(), request_id);
    assert_eq!(envelope.content.sender(), &fixture.identity.sender());
    assert!(envelope.sender_delegation.is_none());

    let payload = DomainSeparators::default().request_payload(request_id.as_bytes());
    verify_signature(
        envelope.sender_pubkey.as_deref().unwrap(),
        &payload,
        envelope.sender_sig.as_deref().unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_delegated_envelope() {
    let (identity, chain) = delegated_identity(0x0a, 0x0b, u64::MAX, None);
    let fixture = TestFixture::with_identity(identity);
    let agent = fixture.agent();

    let request_id = agent.submit(&canister(9), "hello", vec![]).await.unwrap();
    let envelope = submitted_envelope(&fixture.replica).await;

    let outer_der = ed25519_key(0x0a).public_key_der();
    assert_eq!(envelope.content.sender(), &Principal::self_authenticating(&outer_der));
    assert_eq!(envelope.sender_pubkey.as_deref(), Some(outer_der.as_slice()));
    assert_eq!(envelope.sender_delegation.as_ref().unwrap().len(), 1);
    assert_eq!(agent.get_principal(), chain.principal);

    let payload = DomainSeparators::default().request_payload(request_id.as_bytes());
    let session_der = ed25519_key(0x0b).public_key_der();
    verify_signature(&session_der, &payload, envelope.sender_sig.as_deref().unwrap()).unwrap();
}

#[tokio::test]
async fn test_anonymous_envelope_is_unsigned() {
    let fixture = TestFixture::with_identity(Identity::anonymous());
    let agent = fixture.agent();

    agent.submit(&canister(9), "hello", vec![]).await.unwrap();
    let envelope = submitted_envelope(&fixture.replica).await;

    assert!(envelope.content.sender().is_anonymous());
    assert!(envelope.sender_pubkey.is_none());
    assert!(envelope.sender_sig.is_none());
    assert!(envelope.sender_delegation.is_none());
}

#[tokio::test]
async fn test_status_read_covers_one_path() {
    let fixture = TestFixture::new();
    let agent = fixture.agent();
    let request_id = RequestId::from_bytes([0x11; 32]);
    fixture.script_statuses(&request_id, &["received"]).await;

    let (status, _) = agent.request_status(&canister(7), &request_id).await.unwrap();
    assert_eq!(status, RequestStatus::Received);

    let submissions = fixture.replica.submissions().await;
    let envelope = Envelope::decode(&submissions[0].envelope).unwrap();
    let Request::ReadState(content) = envelope.content else {
        panic!("expected read_state content");
    };
    assert_eq!(content.paths, vec![request_status_path(&request_id)]);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_without_message_stops_polling() {
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(5));
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture
        .replica
        .set_read_state_fallback(read_state_body(&certificate_with(
            &request_id,
            vec![("status", b"rejected".to_vec()), ("reject_code", vec![4])],
        )))
        .await;

    let start = Instant::now();
    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(matches!(err, AgentError::CertificateLookupMiss(ref path) if path.ends_with("reject_message")));
    assert_eq!(fixture.replica.read_state_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_replied_without_reply_stops_polling() {
    let fixture = TestFixture::new();
    let agent = fixture.agent_polling(Duration::from_secs(1), Duration::from_secs(5));
    let target = canister(7);

    let request_id = agent.submit(&target, "inc", vec![]).await.unwrap();
    fixture
        .replica
        .set_read_state_fallback(read_state_body(&status_certificate(&request_id, "replied")))
        .await;

    let err = agent.wait(&target, &request_id).await.unwrap_err();
    assert!(!err.is_timeout());
    assert!(matches!(err, AgentError::CertificateLookupMiss(ref path) if path.ends_with("reply")));
    assert_eq!(fixture.replica.read_state_count(), 1);
}
