//! Interceptor facade
//!
//! Wires one relay client into the session store and action multiplexer, and
//! hands each UI consumer an [`InterceptorHandle`] with its own handshake
//! coordinator.

use crate::client::{ClientState, RelayClient};
use crate::handshake::{HandshakeCoordinator, HandshakeState};
use crate::multiplexer::{ActionRequestMultiplexer, ActionSubscription};
use crate::store::{SessionStore, SessionSubscription};
use crate::transport::RelayTransport;
use crate::{
    ActionRequest, ErrorReason, InterceptorConfig, RequestOutcome, Result, Session, WalletContext,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// WalletConnect session interceptor
pub struct WalletConnectInterceptor {
    config: InterceptorConfig,
    client: Arc<RelayClient>,
    context: WalletContext,
    store: SessionStore,
    multiplexer: ActionRequestMultiplexer,
}

impl WalletConnectInterceptor {
    /// Build the interceptor over `transport`
    pub fn new(config: InterceptorConfig, transport: Arc<dyn RelayTransport>) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(RelayClient::from_config(&config, transport));
        let context = WalletContext::new(config.supported_chains.iter().copied());
        let store = SessionStore::new(Arc::clone(&client), context.clone());
        let multiplexer = ActionRequestMultiplexer::new(Arc::clone(&client), context.clone());

        Ok(Self {
            config,
            client,
            context,
            store,
            multiplexer,
        })
    }

    /// Initialize the relay client and load the current sessions
    pub async fn initialize(&self) -> Result<()> {
        self.client.initialize().await?;
        if let Err(e) = self.store.refresh_and_notify().await {
            warn!(error = %e, "Initial session load failed");
        }
        info!(
            name = %self.config.metadata.name,
            chains = ?self.config.supported_chains,
            "Interceptor ready"
        );
        Ok(())
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn context(&self) -> &WalletContext {
        &self.context
    }

    pub fn client(&self) -> &Arc<RelayClient> {
        &self.client
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> ClientState {
        self.client.state()
    }

    /// Handle for one UI consumer; `listener` receives every session list update
    pub fn handle(
        &self,
        listener: impl Fn(&[Session]) + Send + Sync + 'static,
    ) -> InterceptorHandle {
        InterceptorHandle {
            client: Arc::clone(&self.client),
            store: self.store.clone(),
            coordinator: HandshakeCoordinator::from_config(&self.config, Arc::clone(&self.client)),
            multiplexer: self.multiplexer.clone(),
            _subscription: self.store.subscribe(listener),
        }
    }
}

/// Per-consumer view of the interceptor
///
/// Dropping the handle unregisters its session listener.
pub struct InterceptorHandle {
    client: Arc<RelayClient>,
    store: SessionStore,
    coordinator: HandshakeCoordinator,
    multiplexer: ActionRequestMultiplexer,
    _subscription: SessionSubscription,
}

impl InterceptorHandle {
    /// Last session list pushed to listeners
    pub fn sessions(&self) -> Vec<Session> {
        self.store.sessions()
    }

    /// Connect to the peer behind `uri`
    pub async fn connect(&self, uri: &str, expected_peer: Option<&str>) -> Result<Session> {
        let session = self.coordinator.connect(uri, expected_peer).await?;
        let _ = self.store.refresh_and_notify().await;
        Ok(session)
    }

    /// Connect, abandoning the attempt when `cancel` fires
    pub async fn connect_with_cancel(
        &self,
        uri: &str,
        expected_peer: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Session> {
        let session = self
            .coordinator
            .connect_with_cancel(uri, expected_peer, cancel)
            .await?;
        let _ = self.store.refresh_and_notify().await;
        Ok(session)
    }

    /// Progress of this handle's most recent connection attempt
    pub fn handshake_state(&self) -> HandshakeState {
        self.coordinator.state()
    }

    /// Disconnect session `topic`; never fails
    pub async fn disconnect(&self, topic: &str) {
        self.client
            .disconnect_session(topic, ErrorReason::user_disconnected())
            .await;
        let _ = self.store.refresh_and_notify().await;
    }

    /// Receive action requests for the active chain
    pub fn on_action_request(
        &self,
        handler: impl Fn(&ActionRequest) + Send + Sync + 'static,
    ) -> ActionSubscription {
        self.multiplexer.on_action_request(handler)
    }

    /// Answer an action request
    pub async fn respond(&self, request: &ActionRequest, outcome: RequestOutcome) -> Result<()> {
        self.client
            .respond_request(&request.topic, request.id, outcome)
            .await
    }
}
