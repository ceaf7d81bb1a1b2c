//! Relay client wrapper
//!
//! Single point of contact with the relay. Owns one transport for its whole
//! lifetime, initializes it exactly once, and pumps relay events to the
//! callbacks registered for each event class.

use crate::transport::RelayTransport;
use crate::{
    ActionRequest, DisconnectEvent, Error, ErrorReason, InterceptorConfig, Metadata,
    PairingHandle, PairingUri, Proposal, ProposalId, RelayEvent, RequestId, RequestOutcome,
    Result, Session, SessionNamespaces,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OnceCell, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback invoked for every event of one class
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle identifying a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Lifecycle of the underlying relay client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// `initialize` has not completed
    Uninitialized,
    /// Client constructed and pumping events
    Ready,
    /// Construction failed; not retried
    Failed(String),
}

impl ClientState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClientState::Ready)
    }
}

struct Subscribers<T> {
    entries: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Subscribers<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, id: SubscriptionId, callback: Callback<T>) {
        self.entries.write().push((id, callback));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn emit(&self, value: &T) {
        // Snapshot so callbacks may subscribe or unsubscribe re-entrantly
        let callbacks: Vec<Callback<T>> = self
            .entries
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }
}

struct EventHub {
    proposals: Subscribers<Proposal>,
    requests: Subscribers<ActionRequest>,
    disconnects: Subscribers<DisconnectEvent>,
    next_id: AtomicU64,
}

impl EventHub {
    fn new() -> Self {
        Self {
            proposals: Subscribers::new(),
            requests: Subscribers::new(),
            disconnects: Subscribers::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn dispatch(&self, event: &RelayEvent) {
        match event {
            RelayEvent::SessionProposal(proposal) => {
                debug!(proposal_id = proposal.id, peer = %proposal.proposer.name, "Session proposal");
                self.proposals.emit(proposal);
            }
            RelayEvent::SessionRequest(request) => {
                debug!(
                    topic = %request.topic,
                    chain_id = %request.chain_id,
                    method = %request.request.method,
                    "Session request"
                );
                self.requests.emit(request);
            }
            RelayEvent::SessionDelete(deleted) => {
                debug!(topic = %deleted.topic, "Session deleted by peer");
                self.disconnects.emit(deleted);
            }
        }
    }
}

/// Relay client wrapper
pub struct RelayClient {
    transport: Arc<dyn RelayTransport>,
    metadata: Metadata,
    project_id: String,
    init: OnceCell<std::result::Result<(), String>>,
    hub: Arc<EventHub>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl RelayClient {
    /// Create a client over `transport`; call [`RelayClient::initialize`] before use
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        metadata: Metadata,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            metadata,
            project_id: project_id.into(),
            init: OnceCell::new(),
            hub: Arc::new(EventHub::new()),
            pump: Mutex::new(None),
        }
    }

    /// Create from interceptor configuration
    pub fn from_config(config: &InterceptorConfig, transport: Arc<dyn RelayTransport>) -> Self {
        Self::new(transport, config.metadata.clone(), config.project_id.clone())
    }

    /// Identity presented to peers
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Initialize the underlying client
    ///
    /// Idempotent: concurrent and repeated calls share a single attempt. A
    /// failed attempt is final and every dependent operation then fails with
    /// [`Error::InitializationFailed`].
    pub async fn initialize(&self) -> Result<()> {
        let outcome = self
            .init
            .get_or_init(|| async {
                match self.transport.init(&self.metadata, &self.project_id).await {
                    Ok(()) => {
                        self.start_pump();
                        info!(name = %self.metadata.name, "Relay client initialized");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "Relay client initialization failed");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        outcome.clone().map_err(Error::InitializationFailed)
    }

    pub fn state(&self) -> ClientState {
        match self.init.get() {
            None => ClientState::Uninitialized,
            Some(Ok(())) => ClientState::Ready,
            Some(Err(reason)) => ClientState::Failed(reason.clone()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.init.get() {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(Error::InitializationFailed(reason.clone())),
            None => Err(Error::NotInitialized),
        }
    }

    fn start_pump(&self) {
        let mut rx = self.transport.events();
        let hub = Arc::clone(&self.hub);

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => hub.dispatch(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Relay event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Relay event pump stopped");
        });

        *self.pump.lock() = Some(handle);
    }

    // ========================================================================
    // Pairing
    // ========================================================================

    /// Pair with a peer's URI
    pub async fn pair(&self, uri: &str) -> Result<Option<PairingHandle>> {
        self.ensure_ready()?;

        let uri = PairingUri::parse(uri)?;
        if uri.is_expired() {
            return Err(Error::InvalidUri(format!(
                "pairing {} has expired",
                uri.topic
            )));
        }

        let handle = self.transport.pair(&uri).await?;
        match &handle {
            Some(h) => info!(pairing_topic = %h.topic, "Paired with peer"),
            None => warn!(pairing_topic = %uri.topic, "Relay returned no pairing"),
        }
        Ok(handle)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a callback for connection proposals
    pub fn subscribe_proposal(
        &self,
        callback: impl Fn(&Proposal) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.hub.next_id();
        self.hub.proposals.add(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe_proposal(&self, id: SubscriptionId) -> bool {
        self.hub.proposals.remove(id)
    }

    /// Register a callback for action requests
    pub fn subscribe_request(
        &self,
        callback: impl Fn(&ActionRequest) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.hub.next_id();
        self.hub.requests.add(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe_request(&self, id: SubscriptionId) -> bool {
        self.hub.requests.remove(id)
    }

    /// Register a callback for peer-side session deletion
    pub fn subscribe_disconnect(
        &self,
        callback: impl Fn(&DisconnectEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.hub.next_id();
        self.hub.disconnects.add(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe_disconnect(&self, id: SubscriptionId) -> bool {
        self.hub.disconnects.remove(id)
    }

    pub fn proposal_subscriber_count(&self) -> usize {
        self.hub.proposals.len()
    }

    pub fn request_subscriber_count(&self) -> usize {
        self.hub.requests.len()
    }

    pub fn disconnect_subscriber_count(&self) -> usize {
        self.hub.disconnects.len()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Settle a proposal into an active session
    pub async fn approve_session(
        &self,
        proposal_id: ProposalId,
        namespaces: SessionNamespaces,
    ) -> Result<Session> {
        self.ensure_ready()?;

        let session = self
            .transport
            .approve_session(proposal_id, namespaces)
            .await?;

        info!(
            proposal_id,
            topic = %session.topic,
            peer = %session.peer_metadata.name,
            "Session approved"
        );
        Ok(session)
    }

    /// Decline a pending proposal
    pub async fn reject_session(&self, proposal_id: ProposalId, reason: ErrorReason) -> Result<()> {
        self.ensure_ready()?;

        self.transport.reject_session(proposal_id, reason.clone()).await?;
        info!(proposal_id, code = reason.code, "Session proposal rejected");
        Ok(())
    }

    /// Tear down an active session
    ///
    /// Best-effort: failures are logged and never returned.
    pub async fn disconnect_session(&self, topic: &str, reason: ErrorReason) {
        if let Err(e) = self.ensure_ready() {
            warn!(topic, error = %e, "Skipping disconnect");
            return;
        }

        match self.transport.disconnect_session(topic, reason).await {
            Ok(()) => info!(topic, "Session disconnected"),
            Err(e) => warn!(topic, error = %e, "Disconnect failed, treating session as gone"),
        }
    }

    /// Answer a peer's action request
    pub async fn respond_request(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()> {
        self.ensure_ready()?;

        self.transport
            .respond_request(topic, request_id, outcome)
            .await?;
        debug!(topic, request_id, "Responded to session request");
        Ok(())
    }

    /// Sessions approved under this application's identity
    ///
    /// With `filter_address`, only sessions granting that address on some
    /// chain are returned.
    pub async fn get_active_sessions(&self, filter_address: Option<&str>) -> Result<Vec<Session>> {
        self.ensure_ready()?;

        let sessions = self.transport.active_sessions().await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.is_owned_by(&self.metadata))
            .filter(|s| filter_address.is_none_or(|address| s.has_account(address)))
            .collect())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}
