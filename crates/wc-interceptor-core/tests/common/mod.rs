//! Shared fixtures

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wc_interceptor_core::transport::{MemoryTransport, RelayTransport, async_trait};
use wc_interceptor_core::{
    ErrorReason, InterceptorConfig, Metadata, PairingHandle, PairingUri, ProposalId, RelayEvent,
    RequestId, RequestOutcome, Result, Session, SessionNamespaces, WalletConnectInterceptor,
};

pub const SYM_KEY: &str = "587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

pub const DAO_ACCOUNT: &str = "0xABC0000000000000000000000000000000000001";

pub fn pairing_uri(topic: &str) -> String {
    format!("wc:{topic}@2?relay-protocol=irn&symKey={SYM_KEY}")
}

pub fn dao_identity() -> Metadata {
    Metadata::new("DAO Governance", "governance", "https://app.dao.example")
}

pub fn peer(name: &str) -> Metadata {
    Metadata::new(name, "", format!("https://{}.example", name.to_lowercase().replace(' ', "-")))
}

pub fn config() -> InterceptorConfig {
    InterceptorConfig::new("test-project")
        .with_metadata(dao_identity())
        .with_supported_chains([1, 137])
        .with_handshake_timeout(Duration::from_secs(60))
        .with_poll_interval(Duration::from_secs(1))
}

/// Initialized interceptor over a fresh relay, with the DAO account connected
pub async fn interceptor() -> (MemoryTransport, WalletConnectInterceptor) {
    let relay = MemoryTransport::new();
    let interceptor = WalletConnectInterceptor::new(config(), Arc::new(relay.clone()))
        .expect("valid config");
    interceptor.initialize().await.expect("relay initializes");
    interceptor.context().set_account(Some(DAO_ACCOUNT));
    interceptor.context().set_active_chain(Some(1));
    (relay, interceptor)
}

/// Memory relay whose pairing and session lookups can be slowed down
///
/// A delayed lookup reads the relay before sleeping, so it returns the list
/// as it was when the lookup started.
#[derive(Clone)]
pub struct DelayedTransport {
    pub relay: MemoryTransport,
    pair_delay: Duration,
    lookup_delays: Arc<Mutex<VecDeque<Duration>>>,
}

impl DelayedTransport {
    pub fn new(relay: MemoryTransport) -> Self {
        Self {
            relay,
            pair_delay: Duration::ZERO,
            lookup_delays: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_pair_delay(mut self, delay: Duration) -> Self {
        self.pair_delay = delay;
        self
    }

    /// Delay the next session lookup by `delay`
    pub fn delay_next_lookup(&self, delay: Duration) {
        self.lookup_delays.lock().push_back(delay);
    }
}

#[async_trait]
impl RelayTransport for DelayedTransport {
    async fn init(&self, metadata: &Metadata, project_id: &str) -> Result<()> {
        self.relay.init(metadata, project_id).await
    }

    async fn pair(&self, uri: &PairingUri) -> Result<Option<PairingHandle>> {
        tokio::time::sleep(self.pair_delay).await;
        self.relay.pair(uri).await
    }

    async fn approve_session(
        &self,
        proposal_id: ProposalId,
        namespaces: SessionNamespaces,
    ) -> Result<Session> {
        self.relay.approve_session(proposal_id, namespaces).await
    }

    async fn reject_session(&self, proposal_id: ProposalId, reason: ErrorReason) -> Result<()> {
        self.relay.reject_session(proposal_id, reason).await
    }

    async fn disconnect_session(&self, topic: &str, reason: ErrorReason) -> Result<()> {
        self.relay.disconnect_session(topic, reason).await
    }

    async fn respond_request(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()> {
        self.relay.respond_request(topic, request_id, outcome).await
    }

    async fn active_sessions(&self) -> Result<Vec<Session>> {
        let sessions = self.relay.active_sessions().await?;
        let delay = self.lookup_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(sessions)
    }

    fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.relay.events()
    }
}

/// Initialized interceptor over `transport`, with the DAO account connected
pub async fn interceptor_over(transport: DelayedTransport) -> WalletConnectInterceptor {
    let interceptor =
        WalletConnectInterceptor::new(config(), Arc::new(transport)).expect("valid config");
    interceptor.initialize().await.expect("relay initializes");
    interceptor.context().set_account(Some(DAO_ACCOUNT));
    interceptor.context().set_active_chain(Some(1));
    interceptor
}
