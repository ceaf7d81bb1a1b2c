//! Relay transport abstraction
//!
//! The `RelayTransport` trait abstracts the sign-protocol client that talks to
//! the relay network, enabling different backends (in-memory simulation,
//! WebSocket bridge). Everything above this seam is protocol policy; the wire
//! protocol itself lives behind it.

use crate::{
    ErrorReason, Metadata, PairingHandle, PairingUri, ProposalId, RelayEvent, RequestId,
    RequestOutcome, Result, Session, SessionNamespaces,
};
use tokio::sync::broadcast;

pub use async_trait::async_trait;

pub mod memory;

#[cfg(feature = "bridge")]
pub mod bridge;

pub use memory::{MemoryTransport, PairBehavior, PeerScript};

#[cfg(feature = "bridge")]
pub use bridge::{BridgeConfig, BridgeTransport};

/// Sign-protocol client used by the relay client wrapper
///
/// Implementations own the relay connection. They must deliver events to
/// every receiver returned by [`RelayTransport::events`] in the order the
/// relay produced them.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Initialize the underlying client with this wallet's identity
    async fn init(&self, metadata: &Metadata, project_id: &str) -> Result<()>;

    /// Pair with a peer's URI
    ///
    /// `Ok(None)` means the relay accepted the call but produced no pairing.
    async fn pair(&self, uri: &PairingUri) -> Result<Option<PairingHandle>>;

    /// Settle a pending proposal into a session
    async fn approve_session(
        &self,
        proposal_id: ProposalId,
        namespaces: SessionNamespaces,
    ) -> Result<Session>;

    /// Decline a pending proposal
    async fn reject_session(&self, proposal_id: ProposalId, reason: ErrorReason) -> Result<()>;

    /// Tear down an active session
    async fn disconnect_session(&self, topic: &str, reason: ErrorReason) -> Result<()>;

    /// Answer a peer's action request
    async fn respond_request(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RequestOutcome,
    ) -> Result<()>;

    /// Every session the client currently holds, regardless of owner
    async fn active_sessions(&self) -> Result<Vec<Session>>;

    /// Subscribe to relay events
    fn events(&self) -> broadcast::Receiver<RelayEvent>;
}
