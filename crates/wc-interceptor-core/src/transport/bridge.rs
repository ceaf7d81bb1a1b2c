//! WebSocket bridge transport
//!
//! Talks to a relay-bridge sidecar that hosts the sign-protocol client.
//! Requests go out as `{"id", "method", "params"}` frames and are answered by
//! `{"id", "result"}` or `{"id", "error": {"code", "message"}}`. Relay events
//! arrive unsolicited as `{"event", "data"}` frames.

use super::{RelayTransport, async_trait};
use crate::{
    Error, ErrorReason, Metadata, PairingHandle, PairingUri, ProposalId, RelayEvent, RequestId,
    RequestOutcome, Result, Session, SessionNamespaces,
};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = DashMap<u64, oneshot::Sender<Result<Value>>>;

/// Bridge connection configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WebSocket URL of the bridge
    pub url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Relay events buffered per receiver
    pub event_buffer: usize,
}

impl BridgeConfig {
    /// Create a new config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout_secs: 30,
            event_buffer: 256,
        }
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Get WebSocket URL, mapping http(s) schemes to ws(s)
    pub fn ws_url(&self) -> String {
        self.url
            .replace("http://", "ws://")
            .replace("https://", "wss://")
    }
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundFrame {
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ErrorReason>,
    },
    Event(RelayEvent),
}

/// Relay transport backed by a bridge sidecar
pub struct BridgeTransport {
    config: BridgeConfig,
    sink: Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    events: broadcast::Sender<RelayEvent>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl BridgeTransport {
    /// Connect to the bridge and start the reader task
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        let url = config.ws_url();
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Network(format!("WebSocket connection failed: {e}")))?;

        info!(url = %url, "Connected to relay bridge");

        let (sink, stream) = ws_stream.split();
        let (events, _) = broadcast::channel(config.event_buffer);
        let pending = Arc::new(PendingMap::new());
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&pending),
            events.clone(),
            Arc::clone(&connected),
        ));

        Ok(Self {
            config,
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            events,
            connected,
            reader,
        })
    }

    /// Check if the bridge socket is still open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        if !self.is_connected() {
            return Err(Error::Network("bridge connection closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = serde_json::to_string(&OutboundFrame { id, method, params })?;
        let sent = self.sink.lock().await.send(Message::Text(frame.into())).await;
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(Error::Network(format!("failed to send {method}: {e}")));
        }

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let value = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(Error::Network("bridge connection closed".to_string())),
            Err(_) => {
                self.pending.remove(&id);
                return Err(Error::Network(format!("bridge request {method} timed out")));
            }
        };

        Ok(serde_json::from_value(value)?)
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<PendingMap>,
    events: broadcast::Sender<RelayEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Response { id, result, error }) => {
                    let outcome = match error {
                        Some(reason) => Err(Error::Relay(format!(
                            "{} (code {})",
                            reason.message, reason.code
                        ))),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    match pending.remove(&id) {
                        Some((_, tx)) => {
                            let _ = tx.send(outcome);
                        }
                        None => debug!(id, "Response for unknown request"),
                    }
                }
                Ok(InboundFrame::Event(event)) => {
                    let _ = events.send(event);
                }
                Err(e) => warn!(error = %e, "Malformed bridge frame"),
            },
            Ok(Message::Close(_)) => {
                info!("Bridge closed connection");
                break;
            }
            Ok(Message::Ping(_)) => {
                debug!("Received ping");
            }
            Err(e) => {
                error!(error = %e, "Bridge socket error");
                break;
            }
            _ => {}
        }
    }

    connected.store(false, Ordering::Release);

    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(Error::Network("bridge connection closed".to_string())));
        }
    }
    info!("Bridge disconnected");
}

fn into_approval_error(err: Error) -> Error {
    match err {
        Error::Relay(msg) => Error::Approval(msg),
        other => other,
    }
}

#[async_trait]
impl RelayTransport for BridgeTransport {
    async fn init(&self, metadata: &Metadata, project_id: &str) -> Result<()> {
        self.call::<Value>(
            "init",
            json!({ "metadata": metadata, "projectId": project_id }),
        )
        .await
        .map(|_| ())
    }

    async fn pair(&self, uri: &PairingUri) -> Result<Option<PairingHandle>> {
        self.call("pair", json!({ "uri": uri.as_str() })).await
    }

    async fn approve_session(
        &self,
        proposal_id: ProposalId,
        namespaces: SessionNamespaces,
    ) -> Result<Session> {
        self.call(
            "approveSession",
            json!({ "id": proposal_id, "namespaces": namespaces }),
        )
        .await
        .map_err(into_approval_error)
    }

    async fn reject_session(&self, proposal_id: ProposalId, reason: ErrorReason) -> Result<()> {
        self.call::<Value>("rejectSession", json!({ "id": proposal_id, "reason": reason }))
            .await
            .map(|_| ())
            .map_err(into_approval_error)
    }

    async fn disconnect_session(&self, topic: &str, reason: ErrorReason) -> Result<()> {
        self.call::<Value>(
            "disconnectSession",
            json!({ "topic": topic, "reason": reason }),
        )
        .await
        .map(|_| ())
        .map_err(|e| match e {
            Error::Relay(msg) => Error::Disconnect(msg),
            other => other,
        })
    }

    async fn respond_request(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()> {
        let response = match outcome {
            RequestOutcome::Result(value) => {
                json!({ "id": request_id, "jsonrpc": "2.0", "result": value })
            }
            RequestOutcome::Error(reason) => {
                json!({ "id": request_id, "jsonrpc": "2.0", "error": reason })
            }
        };
        self.call::<Value>(
            "respondSessionRequest",
            json!({ "topic": topic, "response": response }),
        )
        .await
        .map(|_| ())
    }

    async fn active_sessions(&self) -> Result<Vec<Session>> {
        self.call("getActiveSessions", json!({})).await
    }

    fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }
}
