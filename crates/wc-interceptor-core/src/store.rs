//! Session store
//!
//! Keeps UI listeners informed of the DAO's active sessions. The list is
//! recomputed from the relay client on demand rather than mutated in place.
//!
//! While at least one listener is registered the store holds exactly one
//! proposal subscription and one disconnect subscription on the relay client.
//! The proposal subscription auto-approves incoming proposals for the
//! connected account.
//!
//! Refreshes are serialized: a refresh fetches and notifies before the next
//! one starts, so listeners always end on the newest list.

use crate::client::{RelayClient, SubscriptionId};
use crate::policy::build_approved_namespaces;
use crate::{DisconnectEvent, Error, Proposal, Result, Session, WalletContext};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Callback receiving the current session list
pub type SessionListener = Arc<dyn Fn(&[Session]) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: Vec<(u64, SessionListener)>,
    /// (proposal, disconnect) subscriptions on the relay client
    relay_subscriptions: Option<(SubscriptionId, SubscriptionId)>,
}

struct StoreInner {
    client: Arc<RelayClient>,
    context: WalletContext,
    registry: Mutex<Registry>,
    latest: RwLock<Vec<Session>>,
    /// Held across fetch and notify
    refresh_gate: tokio::sync::Mutex<()>,
    next_listener: AtomicU64,
}

/// Observable list of active sessions
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(client: Arc<RelayClient>, context: WalletContext) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                client,
                context,
                registry: Mutex::new(Registry::default()),
                latest: RwLock::new(Vec::new()),
                refresh_gate: tokio::sync::Mutex::new(()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Fetch this application's active sessions from the relay client
    ///
    /// With `filter_address` only sessions granting that account are returned.
    pub async fn refresh(&self, filter_address: Option<&str>) -> Result<Vec<Session>> {
        self.inner.refresh(filter_address).await
    }

    /// Refresh for the connected account and push the result to every listener
    pub async fn refresh_and_notify(&self) -> Result<Vec<Session>> {
        self.inner.refresh_and_notify().await
    }

    /// Push `sessions` to every live listener
    pub fn notify_listeners(&self, sessions: &[Session]) {
        self.inner.notify_listeners(sessions);
    }

    /// Register a listener; it stays registered until the guard is dropped
    pub fn subscribe(
        &self,
        listener: impl Fn(&[Session]) + Send + Sync + 'static,
    ) -> SessionSubscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.registry.lock();

        if registry.listeners.is_empty() && registry.relay_subscriptions.is_none() {
            registry.relay_subscriptions = Some(StoreInner::attach(&self.inner));
            debug!("Session store attached to relay client");
        }
        registry.listeners.push((id, Arc::new(listener)));

        SessionSubscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Last list pushed to listeners
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.latest.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.lock().listeners.len()
    }

    /// Whether the store currently holds its relay subscriptions
    pub fn is_attached(&self) -> bool {
        self.inner.registry.lock().relay_subscriptions.is_some()
    }
}

impl StoreInner {
    /// Register the proposal and disconnect callbacks; caller holds the registry lock
    fn attach(this: &Arc<Self>) -> (SubscriptionId, SubscriptionId) {
        let weak = Arc::downgrade(this);
        let on_proposal = this.client.subscribe_proposal(move |proposal: &Proposal| {
            if let Some(store) = weak.upgrade() {
                let proposal = proposal.clone();
                tokio::spawn(async move { store.handle_proposal(proposal).await });
            }
        });

        let weak = Arc::downgrade(this);
        let on_disconnect = this
            .client
            .subscribe_disconnect(move |event: &DisconnectEvent| {
                if let Some(store) = weak.upgrade() {
                    debug!(topic = %event.topic, "Refreshing sessions after peer disconnect");
                    tokio::spawn(async move {
                        let _ = store.refresh_and_notify().await;
                    });
                }
            });

        (on_proposal, on_disconnect)
    }

    fn remove_listener(&self, id: u64) {
        let mut registry = self.registry.lock();
        registry.listeners.retain(|(existing, _)| *existing != id);

        if !registry.listeners.is_empty() {
            return;
        }
        if let Some((on_proposal, on_disconnect)) = registry.relay_subscriptions.take() {
            self.client.unsubscribe_proposal(on_proposal);
            self.client.unsubscribe_disconnect(on_disconnect);
            debug!("Session store detached from relay client");
        }
    }

    fn notify_listeners(&self, sessions: &[Session]) {
        *self.latest.write() = sessions.to_vec();

        let listeners: Vec<SessionListener> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        debug!(
            sessions = sessions.len(),
            listeners = listeners.len(),
            "Notifying session listeners"
        );
        for listener in listeners {
            listener(sessions);
        }
    }

    async fn refresh(&self, filter_address: Option<&str>) -> Result<Vec<Session>> {
        self.client.get_active_sessions(filter_address).await
    }

    async fn refresh_and_notify(&self) -> Result<Vec<Session>> {
        let _gate = self.refresh_gate.lock().await;
        let account = self.context.account();
        match self.refresh(account.as_deref()).await {
            Ok(sessions) => {
                self.notify_listeners(&sessions);
                Ok(sessions)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh sessions");
                Err(e)
            }
        }
    }

    async fn handle_proposal(&self, proposal: Proposal) {
        let grant = match self.context.account() {
            Some(account) => build_approved_namespaces(
                &proposal,
                &account,
                &self.context.supported_chains(),
            ),
            None => Err(Error::UnsupportedAccounts("no account connected".to_string())),
        };

        let namespaces = match grant {
            Ok(namespaces) => namespaces,
            Err(e) => {
                warn!(
                    proposal_id = proposal.id,
                    peer = %proposal.proposer.name,
                    error = %e,
                    "Rejecting session proposal"
                );
                if let Err(e) = self
                    .client
                    .reject_session(proposal.id, e.reject_reason())
                    .await
                {
                    error!(proposal_id = proposal.id, error = %e, "Failed to reject proposal");
                }
                return;
            }
        };

        match self.client.approve_session(proposal.id, namespaces).await {
            Ok(session) => {
                info!(
                    topic = %session.topic,
                    peer = %session.peer_metadata.name,
                    "Auto-approved session proposal"
                );
            }
            Err(e) => {
                error!(proposal_id = proposal.id, error = %e, "Failed to approve proposal");
                return;
            }
        }

        let _ = self.refresh_and_notify().await;
    }
}

/// Listener registration; dropping it unsubscribes
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct SessionSubscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl SessionSubscription {
    /// Unsubscribe now
    pub fn cancel(self) {}
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(self.id);
        }
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("id", &self.id)
            .finish()
    }
}
