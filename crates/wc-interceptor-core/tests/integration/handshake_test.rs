//! Connection handshake timing
//!
//! All tests run on a paused tokio clock, so elapsed times are exact.

use crate::common::{
    DelayedTransport, dao_identity, interceptor, interceptor_over, pairing_uri, peer,
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wc_interceptor_core::transport::{MemoryTransport, PairBehavior, PeerScript};
use wc_interceptor_core::{Error, HandshakeState, Session, SessionNamespaces};

#[tokio::test(start_paused = true)]
async fn test_resolves_on_first_tick_after_approval() {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});

    relay.script_peer(
        "a1",
        PeerScript::new(peer("Snapshot")).with_delay(Duration::from_millis(2500)),
    );

    let started = Instant::now();
    let session = handle
        .connect(&pairing_uri("a1"), Some("snapshot"))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(session.pairing_topic, "a1");
    assert_eq!(session.peer_metadata.name, "Snapshot");
    assert_eq!(
        handle.handshake_state(),
        HandshakeState::Established(session.topic.clone())
    );
    assert_eq!(handle.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_any_peer_accepted_without_expectation() {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});
    relay.script_peer("a1", PeerScript::new(peer("Uniswap")));

    let session = handle.connect(&pairing_uri("a1"), None).await.unwrap();
    assert_eq!(session.peer_metadata.name, "Uniswap");
}

#[tokio::test(start_paused = true)]
async fn test_mismatch_rejects_on_first_tick_with_session() {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});
    relay.script_peer(
        "a1",
        PeerScript::new(peer("Phishing dApp")).with_delay(Duration::from_millis(4200)),
    );

    let started = Instant::now();
    let err = handle
        .connect(&pairing_uri("a1"), Some("Snapshot"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MetadataMismatch { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert!(matches!(handle.handshake_state(), HandshakeState::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_times_out_at_boundary_never_before() {
    let (_relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});

    let started = Instant::now();
    let err = handle.connect(&pairing_uri("a1"), None).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout { waited_secs } if waited_secs >= 60));
    assert!(elapsed >= Duration::from_secs(60));
    // Detection granularity is one poll interval
    assert!(elapsed <= Duration::from_secs(62));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_time_spent_pairing() {
    let relay = MemoryTransport::new();
    let transport = DelayedTransport::new(relay.clone()).with_pair_delay(Duration::from_secs(30));
    let interceptor = interceptor_over(transport).await;
    let handle = interceptor.handle(|_| {});

    let started = Instant::now();
    let err = handle.connect(&pairing_uri("a1"), None).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(relay.is_paired("a1"));
    assert!(matches!(err, Error::Timeout { waited_secs } if waited_secs >= 60));
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed <= Duration::from_secs(62));
}

#[tokio::test(start_paused = true)]
async fn test_session_for_other_pairing_ignored() {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});

    relay.insert_session(Session {
        topic: "older".to_string(),
        pairing_topic: "b2".to_string(),
        self_metadata: dao_identity(),
        peer_metadata: peer("Other"),
        namespaces: SessionNamespaces::new(),
        acknowledged: true,
        expiry: None,
    });
    relay.script_peer(
        "a1",
        PeerScript::new(peer("Snapshot")).with_delay(Duration::from_secs(2)),
    );

    let session = handle
        .connect(&pairing_uri("a1"), Some("Snapshot"))
        .await
        .unwrap();
    assert_eq!(session.pairing_topic, "a1");
    assert_ne!(session.topic, "older");
}

#[tokio::test(start_paused = true)]
async fn test_pair_failures_fail_immediately() {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});

    relay.set_pair_behavior(PairBehavior::Reject("relay refused".to_string()));
    let started = Instant::now();
    let err = handle.connect(&pairing_uri("a1"), None).await.unwrap_err();
    assert!(err.is_relay_error());
    assert_eq!(started.elapsed(), Duration::ZERO);

    // Legacy v1 bridge URI
    let err = handle
        .connect("wc:a1@1?bridge=https%3A%2F%2Fbridge.example&key=00", None)
        .await;
    assert!(matches!(err, Err(Error::InvalidUri(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_attempt() {
    let (_relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = handle
        .connect_with_cancel(&pairing_uri("a1"), None, token)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}
