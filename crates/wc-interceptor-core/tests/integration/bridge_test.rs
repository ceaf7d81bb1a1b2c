//! Bridge transport against a local mock bridge

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wc_interceptor_core::transport::{BridgeConfig, BridgeTransport, RelayTransport};
use wc_interceptor_core::{Error, ErrorReason, Metadata, PairingUri, RelayEvent, SessionNamespaces};

use crate::common::pairing_uri;

/// How the mock bridge answers one request
fn answer(method: &str, params: &Value) -> Value {
    match method {
        "init" => json!({ "result": null }),
        "pair" => {
            let uri = params["uri"].as_str().unwrap_or_default();
            let topic = uri
                .trim_start_matches("wc:")
                .split('@')
                .next()
                .unwrap_or_default();
            json!({ "result": { "topic": topic, "active": false } })
        }
        "getActiveSessions" => json!({ "result": [] }),
        "approveSession" => {
            json!({ "error": { "code": 5000, "message": "proposal expired" } })
        }
        _ => json!({ "error": { "code": -32601, "message": "method not found" } }),
    }
}

/// Serve one bridge connection; after `close_after` requests the socket closes
/// without answering
async fn spawn_bridge(close_after: Option<usize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut served = 0;

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            if close_after == Some(served) {
                let _ = ws.close(None).await;
                return;
            }
            served += 1;

            let request: Value = serde_json::from_str(&text).unwrap();
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let mut reply = answer(&method, &request["params"]);
            reply["id"] = request["id"].clone();
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();

            if method == "pair" {
                let event = json!({
                    "event": "session_proposal",
                    "data": {
                        "id": 42,
                        "pairingTopic": reply["result"]["topic"],
                        "proposer": {
                            "name": "Snapshot",
                            "description": "",
                            "url": "https://snapshot.example",
                            "icons": []
                        },
                        "requiredNamespaces": {
                            "eip155": { "chains": ["eip155:1"], "methods": ["eth_sendTransaction"], "events": [] }
                        }
                    }
                });
                ws.send(Message::Text(event.to_string().into())).await.unwrap();
            }
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn test_request_response_and_events() {
    let url = spawn_bridge(None).await;
    let bridge = BridgeTransport::connect(BridgeConfig::new(url).with_request_timeout(5))
        .await
        .unwrap();
    let mut events = bridge.events();

    bridge
        .init(&Metadata::new("DAO", "", "https://dao.example"), "project")
        .await
        .unwrap();

    let uri = PairingUri::parse(&pairing_uri("a1")).unwrap();
    let handle = bridge.pair(&uri).await.unwrap().unwrap();
    assert_eq!(handle.topic, "a1");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RelayEvent::SessionProposal(proposal) => {
            assert_eq!(proposal.id, 42);
            assert_eq!(proposal.pairing_topic, "a1");
            assert_eq!(
                proposal.required_namespaces["eip155"].methods,
                vec!["eth_sendTransaction"]
            );
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(bridge.active_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approval_error_mapped() {
    let url = spawn_bridge(None).await;
    let bridge = BridgeTransport::connect(BridgeConfig::new(url)).await.unwrap();

    let err = bridge
        .approve_session(7, SessionNamespaces::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Approval(msg) if msg.contains("proposal expired")));

    let err = bridge
        .reject_session(7, ErrorReason::user_rejected())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Approval(_)));
}

#[tokio::test]
async fn test_pending_request_fails_when_socket_closes() {
    let url = spawn_bridge(Some(0)).await;
    let bridge = BridgeTransport::connect(BridgeConfig::new(url)).await.unwrap();

    let err = bridge.active_sessions().await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_retryable());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!bridge.is_connected());
}

#[tokio::test]
async fn test_connect_to_missing_bridge_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = BridgeTransport::connect(BridgeConfig::new(format!("ws://{addr}"))).await;
    assert!(matches!(result, Err(Error::Network(_))));
}
