//! In-memory relay for testing and local development
//!
//! Simulates both the relay and the peer dApps on the other end of it.
//! Scripted peers propose a session once their pairing topic is paired;
//! helpers let a test push peer requests and peer-side disconnects.

use super::{RelayTransport, async_trait};
use crate::{
    ActionRequest, DisconnectEvent, EIP155_NAMESPACE, Error, ErrorReason, Metadata,
    PairingHandle, PairingUri, Proposal, ProposalId, ProposalNamespace, ProposalNamespaces,
    RelayEvent, RequestId, RequestOutcome, RequestPayload, Result, Session, SessionNamespaces,
    Topic,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// How the simulated relay answers `pair`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PairBehavior {
    /// Return a pairing handle
    #[default]
    Accept,
    /// Succeed without producing a pairing
    NoHandle,
    /// Fail with a relay error
    Reject(String),
}

/// A simulated dApp that proposes after its pairing is established
#[derive(Debug, Clone)]
pub struct PeerScript {
    pub metadata: Metadata,
    pub required_namespaces: ProposalNamespaces,
    pub optional_namespaces: ProposalNamespaces,
    pub propose_after: Duration,
}

impl PeerScript {
    /// Peer requiring `eth_sendTransaction` and `personal_sign` on mainnet
    pub fn new(metadata: Metadata) -> Self {
        let mut required = ProposalNamespaces::new();
        required.insert(
            EIP155_NAMESPACE.to_string(),
            ProposalNamespace {
                chains: vec!["eip155:1".to_string()],
                methods: vec![
                    "eth_sendTransaction".to_string(),
                    "personal_sign".to_string(),
                ],
                events: vec!["accountsChanged".to_string(), "chainChanged".to_string()],
            },
        );
        Self {
            metadata,
            required_namespaces: required,
            optional_namespaces: ProposalNamespaces::new(),
            propose_after: Duration::ZERO,
        }
    }

    /// Delay between pairing and proposal
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.propose_after = delay;
        self
    }

    /// Replace the required namespaces
    pub fn with_required(mut self, namespaces: ProposalNamespaces) -> Self {
        self.required_namespaces = namespaces;
        self
    }
}

/// Response recorded for an action request
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResponse {
    pub topic: Topic,
    pub request_id: RequestId,
    pub outcome: RequestOutcome,
}

#[derive(Debug, Default)]
struct MemoryState {
    identity: Option<Metadata>,
    init_calls: usize,
    init_failure: Option<String>,
    init_delay: Duration,
    pair_behavior: PairBehavior,
    pairings: HashMap<Topic, PairingHandle>,
    scripts: HashMap<Topic, PeerScript>,
    proposals: HashMap<ProposalId, Proposal>,
    sessions: Vec<Session>,
    approvals: usize,
    rejections: Vec<(ProposalId, ErrorReason)>,
    disconnects: Vec<(Topic, ErrorReason)>,
    responses: Vec<RecordedResponse>,
    next_proposal_id: ProposalId,
    next_request_id: RequestId,
}

/// In-memory relay transport
///
/// Clones share the same relay state, so a test can keep one handle to drive
/// the peer side while the interceptor owns another.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    events: broadcast::Sender<RelayEvent>,
}

impl MemoryTransport {
    /// Create an empty relay
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                next_proposal_id: 1,
                next_request_id: 1,
                ..Default::default()
            })),
            events,
        }
    }

    /// Relay whose client construction always fails
    pub fn with_failing_init(reason: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.state.lock().init_failure = Some(reason.into());
        transport
    }

    /// Make `init` take this long
    pub fn with_init_delay(self, delay: Duration) -> Self {
        self.state.lock().init_delay = delay;
        self
    }

    /// Change how `pair` answers
    pub fn set_pair_behavior(&self, behavior: PairBehavior) {
        self.state.lock().pair_behavior = behavior;
    }

    /// Register a peer that proposes once `pairing_topic` is paired
    pub fn script_peer(&self, pairing_topic: impl Into<Topic>, script: PeerScript) {
        self.state.lock().scripts.insert(pairing_topic.into(), script);
    }

    /// Emit a proposal from a peer on `pairing_topic`
    pub fn propose(
        &self,
        pairing_topic: impl Into<Topic>,
        proposer: Metadata,
        required_namespaces: ProposalNamespaces,
        optional_namespaces: ProposalNamespaces,
    ) -> ProposalId {
        let proposal = {
            let mut state = self.state.lock();
            let id = state.next_proposal_id;
            state.next_proposal_id += 1;

            let proposal = Proposal {
                id,
                pairing_topic: pairing_topic.into(),
                proposer,
                required_namespaces,
                optional_namespaces,
                expiry: Some(Utc::now() + chrono::Duration::minutes(5)),
            };
            state.proposals.insert(id, proposal.clone());
            proposal
        };

        let id = proposal.id;
        debug!(proposal_id = id, pairing_topic = %proposal.pairing_topic, "Peer proposed session");
        let _ = self.events.send(RelayEvent::SessionProposal(proposal));
        id
    }

    /// Emit an action request from the peer of session `topic`
    pub fn emit_request(
        &self,
        topic: impl Into<Topic>,
        chain_id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> RequestId {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_request_id;
            state.next_request_id += 1;
            id
        };

        let _ = self.events.send(RelayEvent::SessionRequest(ActionRequest {
            id,
            topic: topic.into(),
            chain_id: chain_id.into(),
            request: RequestPayload {
                method: method.into(),
                params,
            },
        }));
        id
    }

    /// Peer tears down session `topic`; returns whether it existed
    pub fn peer_disconnect(&self, topic: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let before = state.sessions.len();
            state.sessions.retain(|s| s.topic != topic);
            state.sessions.len() != before
        };

        if removed {
            let _ = self.events.send(RelayEvent::SessionDelete(DisconnectEvent {
                topic: topic.to_string(),
                reason: Some(ErrorReason::user_disconnected()),
            }));
        }
        removed
    }

    /// Insert a session directly, e.g. one settled by another wallet identity
    pub fn insert_session(&self, session: Session) {
        self.state.lock().sessions.push(session);
    }

    /// Drop a pending proposal as if it expired on the relay
    pub fn expire_proposal(&self, proposal_id: ProposalId) -> bool {
        self.state.lock().proposals.remove(&proposal_id).is_some()
    }

    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Number of successful approvals
    pub fn approval_count(&self) -> usize {
        self.state.lock().approvals
    }

    pub fn pending_proposals(&self) -> Vec<ProposalId> {
        let mut ids: Vec<_> = self.state.lock().proposals.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn rejections(&self) -> Vec<(ProposalId, ErrorReason)> {
        self.state.lock().rejections.clone()
    }

    pub fn disconnects(&self) -> Vec<(Topic, ErrorReason)> {
        self.state.lock().disconnects.clone()
    }

    pub fn responses(&self) -> Vec<RecordedResponse> {
        self.state.lock().responses.clone()
    }

    pub fn is_paired(&self, topic: &str) -> bool {
        self.state.lock().pairings.contains_key(topic)
    }

    /// Sessions held by the relay, regardless of owner
    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().sessions.clone()
    }

    fn require_init(state: &MemoryState) -> Result<Metadata> {
        state.identity.clone().ok_or(Error::NotInitialized)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn init(&self, metadata: &Metadata, project_id: &str) -> Result<()> {
        let delay = {
            let mut state = self.state.lock();
            state.init_calls += 1;
            state.init_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.init_failure {
            return Err(Error::Relay(reason.clone()));
        }
        if project_id.is_empty() {
            return Err(Error::Relay("missing project id".to_string()));
        }
        state.identity = Some(metadata.clone());
        Ok(())
    }

    async fn pair(&self, uri: &PairingUri) -> Result<Option<PairingHandle>> {
        let (handle, script) = {
            let mut state = self.state.lock();
            Self::require_init(&state)?;

            match &state.pair_behavior {
                PairBehavior::Accept => {}
                PairBehavior::NoHandle => return Ok(None),
                PairBehavior::Reject(reason) => return Err(Error::Relay(reason.clone())),
            }

            if uri.is_expired() {
                return Err(Error::Relay(format!("pairing {} has expired", uri.topic)));
            }

            let handle = PairingHandle {
                topic: uri.topic.clone(),
                expiry: uri.expiry,
                active: false,
            };
            state.pairings.insert(uri.topic.clone(), handle.clone());
            (handle, state.scripts.remove(&uri.topic))
        };

        if let Some(script) = script {
            let relay = self.clone();
            let pairing_topic = handle.topic.clone();
            tokio::spawn(async move {
                if !script.propose_after.is_zero() {
                    tokio::time::sleep(script.propose_after).await;
                }
                relay.propose(
                    pairing_topic,
                    script.metadata,
                    script.required_namespaces,
                    script.optional_namespaces,
                );
            });
        }

        Ok(Some(handle))
    }

    async fn approve_session(
        &self,
        proposal_id: ProposalId,
        namespaces: SessionNamespaces,
    ) -> Result<Session> {
        let mut state = self.state.lock();
        let identity = Self::require_init(&state)?;

        let proposal = state.proposals.remove(&proposal_id).ok_or_else(|| {
            Error::Approval(format!("proposal {proposal_id} is not pending"))
        })?;

        if let Some(pairing) = state.pairings.get_mut(&proposal.pairing_topic) {
            pairing.active = true;
        }

        let session = Session {
            topic: uuid::Uuid::new_v4().simple().to_string(),
            pairing_topic: proposal.pairing_topic,
            self_metadata: identity,
            peer_metadata: proposal.proposer,
            namespaces,
            acknowledged: true,
            expiry: Some(Utc::now() + chrono::Duration::days(7)),
        };

        state.sessions.push(session.clone());
        state.approvals += 1;
        Ok(session)
    }

    async fn reject_session(&self, proposal_id: ProposalId, reason: ErrorReason) -> Result<()> {
        let mut state = self.state.lock();
        Self::require_init(&state)?;

        if state.proposals.remove(&proposal_id).is_none() {
            return Err(Error::Approval(format!(
                "proposal {proposal_id} is not pending"
            )));
        }
        state.rejections.push((proposal_id, reason));
        Ok(())
    }

    async fn disconnect_session(&self, topic: &str, reason: ErrorReason) -> Result<()> {
        let mut state = self.state.lock();
        Self::require_init(&state)?;

        let before = state.sessions.len();
        state.sessions.retain(|s| s.topic != topic);
        if state.sessions.len() == before {
            return Err(Error::Disconnect(format!("no session for topic {topic}")));
        }
        state.disconnects.push((topic.to_string(), reason));
        Ok(())
    }

    async fn respond_request(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::require_init(&state)?;

        if !state.sessions.iter().any(|s| s.topic == topic) {
            return Err(Error::Relay(format!("no session for topic {topic}")));
        }
        state.responses.push(RecordedResponse {
            topic: topic.to_string(),
            request_id,
            outcome,
        });
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<Session>> {
        let state = self.state.lock();
        Self::require_init(&state)?;
        Ok(state.sessions.clone())
    }

    fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }
}
