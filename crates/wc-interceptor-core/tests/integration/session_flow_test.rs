//! Session approval, listener fan-out and request routing

use crate::common::{
    DAO_ACCOUNT, DelayedTransport, dao_identity, interceptor, interceptor_over, pairing_uri, peer,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wc_interceptor_core::transport::{MemoryTransport, PeerScript};
use wc_interceptor_core::{
    ActionRequest, ErrorReason, RequestOutcome, Session, SessionNamespace, SessionNamespaces,
};

/// Let the event pump and spawned approval tasks run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn connected() -> (
    MemoryTransport,
    wc_interceptor_core::WalletConnectInterceptor,
    wc_interceptor_core::InterceptorHandle,
    Session,
) {
    let (relay, interceptor) = interceptor().await;
    let handle = interceptor.handle(|_| {});
    relay.script_peer("a1", PeerScript::new(peer("Snapshot")));
    let session = handle
        .connect(&pairing_uri("a1"), Some("Snapshot"))
        .await
        .unwrap();
    (relay, interceptor, handle, session)
}

// ============================================================================
// Approval
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_listeners_notified_after_one_approval() {
    let (relay, interceptor) = interceptor().await;

    let first = Arc::new(Mutex::new(Vec::<usize>::new()));
    let second = Arc::new(Mutex::new(Vec::<usize>::new()));
    let a = interceptor.handle({
        let seen = Arc::clone(&first);
        move |sessions: &[Session]| seen.lock().push(sessions.len())
    });
    let _b = interceptor.handle({
        let seen = Arc::clone(&second);
        move |sessions: &[Session]| seen.lock().push(sessions.len())
    });

    assert_eq!(interceptor.client().proposal_subscriber_count(), 1);

    relay.script_peer("a1", PeerScript::new(peer("Snapshot")));
    a.connect(&pairing_uri("a1"), None).await.unwrap();

    assert_eq!(relay.approval_count(), 1);
    assert_eq!(first.lock().last(), Some(&1));
    assert_eq!(second.lock().last(), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_grant_covers_every_supported_chain() {
    let (_relay, _interceptor, _handle, session) = connected().await;

    let eip155 = &session.namespaces["eip155"];
    assert_eq!(eip155.chains, vec!["eip155:1", "eip155:137"]);
    assert_eq!(
        eip155.accounts,
        vec![
            format!("eip155:1:{DAO_ACCOUNT}"),
            format!("eip155:137:{DAO_ACCOUNT}")
        ]
    );
    assert_eq!(eip155.methods, vec!["eth_sendTransaction", "personal_sign"]);
    assert!(session.has_account(&DAO_ACCOUNT.to_lowercase()));
}

#[tokio::test(start_paused = true)]
async fn test_peer_disconnect_refreshes_listeners() {
    let (relay, interceptor) = interceptor().await;
    let updates = Arc::new(AtomicUsize::new(usize::MAX));
    let handle = interceptor.handle({
        let updates = Arc::clone(&updates);
        move |sessions: &[Session]| updates.store(sessions.len(), Ordering::SeqCst)
    });

    relay.script_peer("a1", PeerScript::new(peer("Snapshot")));
    let session = handle.connect(&pairing_uri("a1"), None).await.unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    assert!(relay.peer_disconnect(&session.topic));
    settle().await;
    assert_eq!(updates.load(Ordering::SeqCst), 0);
    assert!(handle.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_user_disconnect_notifies_and_records_reason() {
    let (relay, _interceptor, handle, session) = connected().await;

    handle.disconnect(&session.topic).await;

    assert!(handle.sessions().is_empty());
    let disconnects = relay.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].0, session.topic);
    assert_eq!(disconnects[0].1, ErrorReason::user_disconnected());
}

#[tokio::test(start_paused = true)]
async fn test_slow_refresh_cannot_overwrite_newer_list() {
    let relay = MemoryTransport::new();
    let transport = DelayedTransport::new(relay.clone());
    let interceptor = interceptor_over(transport.clone()).await;

    let mut namespaces = SessionNamespaces::new();
    namespaces.insert(
        "eip155".to_string(),
        SessionNamespace {
            chains: vec!["eip155:1".to_string()],
            accounts: vec![format!("eip155:1:{DAO_ACCOUNT}")],
            methods: vec!["eth_sendTransaction".to_string()],
            events: vec![],
        },
    );
    relay.insert_session(Session {
        topic: "s1".to_string(),
        pairing_topic: "a1".to_string(),
        self_metadata: dao_identity(),
        peer_metadata: peer("Snapshot"),
        namespaces,
        acknowledged: true,
        expiry: None,
    });

    let updates = Arc::new(Mutex::new(Vec::<usize>::new()));
    let handle = interceptor.handle({
        let updates = Arc::clone(&updates);
        move |sessions: &[Session]| updates.lock().push(sessions.len())
    });

    // First refresh reads [s1] and then stalls
    transport.delay_next_lookup(Duration::from_secs(5));
    let store = interceptor.store().clone();
    let slow = tokio::spawn(async move { store.refresh_and_notify().await });
    settle().await;

    assert!(relay.peer_disconnect("s1"));
    let fresh = interceptor.store().refresh_and_notify().await.unwrap();
    assert!(fresh.is_empty());

    assert_eq!(slow.await.unwrap().unwrap().len(), 1);
    settle().await;

    assert_eq!(updates.lock().first(), Some(&1));
    assert_eq!(updates.lock().last(), Some(&0));
    assert!(handle.sessions().is_empty());
}

// ============================================================================
// Action Requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_requests_for_active_chain_reach_every_handler_once() {
    let (relay, _interceptor, handle, session) = connected().await;

    let first = Arc::new(Mutex::new(Vec::<ActionRequest>::new()));
    let second = Arc::new(AtomicUsize::new(0));
    let _a = handle.on_action_request({
        let seen = Arc::clone(&first);
        move |req: &ActionRequest| seen.lock().push(req.clone())
    });
    let _b = handle.on_action_request({
        let hits = Arc::clone(&second);
        move |_: &ActionRequest| {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    });

    relay.emit_request(
        &session.topic,
        "eip155:1",
        "eth_sendTransaction",
        json!([{ "from": DAO_ACCOUNT, "to": "0x00000000000000000000000000000000000000ff", "value": "0x0" }]),
    );
    relay.emit_request(
        &session.topic,
        "eip155:137",
        "eth_sendTransaction",
        json!([{ "to": "0x01" }]),
    );
    settle().await;

    let seen = first.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].chain_id, "eip155:1");
    assert_eq!(
        seen[0].transaction().unwrap().to,
        "0x00000000000000000000000000000000000000ff"
    );
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_active_chain_changes_routing() {
    let (relay, interceptor, handle, session) = connected().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let _sub = handle.on_action_request({
        let hits = Arc::clone(&hits);
        move |_: &ActionRequest| {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    });

    interceptor.context().set_active_chain(Some(137));
    relay.emit_request(&session.topic, "eip155:1", "personal_sign", json!([]));
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    relay.emit_request(&session.topic, "eip155:137", "personal_sign", json!([]));
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_respond_reaches_relay() {
    let (relay, _interceptor, handle, session) = connected().await;

    let received = Arc::new(Mutex::new(None::<ActionRequest>));
    let _sub = handle.on_action_request({
        let received = Arc::clone(&received);
        move |req: &ActionRequest| *received.lock() = Some(req.clone())
    });

    relay.emit_request(&session.topic, "eip155:1", "personal_sign", json!(["0xdead", DAO_ACCOUNT]));
    settle().await;

    let request = received.lock().clone().unwrap();
    handle
        .respond(&request, RequestOutcome::Error(ErrorReason::user_rejected()))
        .await
        .unwrap();

    let responses = relay.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].request_id, request.id);
    assert_eq!(
        responses[0].outcome,
        RequestOutcome::Error(ErrorReason::user_rejected())
    );
}
