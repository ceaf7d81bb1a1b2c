//! Connection handshake coordinator
//!
//! Drives one connection attempt from a pasted pairing URI to an established
//! session:
//!
//! ```text
//! Idle ──► Pairing ──► AwaitingApproval ──► Established
//!             │               │
//!             └───────────────┴──────────► Failed
//! ```
//!
//! Approval itself happens in the session store's proposal subscriber. The
//! coordinator only pairs and then polls the relay client for a session on
//! the pairing topic, so it never holds a relay subscription of its own.

use crate::client::RelayClient;
use crate::{Error, InterceptorConfig, PairingHandle, Result, Session, Topic};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress of the most recent connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    Pairing,
    AwaitingApproval,
    /// Session topic
    Established(Topic),
    /// Failure description
    Failed(String),
}

/// A connection attempt waiting for its session to appear
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub pairing: PairingHandle,
    pub expected_peer: Option<String>,
    pub started_at: Instant,
}

impl ConnectionAttempt {
    fn new(pairing: PairingHandle, expected_peer: Option<&str>, started_at: Instant) -> Self {
        Self {
            pairing,
            expected_peer: expected_peer
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            started_at,
        }
    }

    /// Whether `peer_name` satisfies the caller's expectation
    ///
    /// Names are compared trimmed and case-insensitively. Without an
    /// expectation any peer is accepted.
    pub fn peer_matches(&self, peer_name: &str) -> bool {
        self.expected_peer
            .as_deref()
            .is_none_or(|expected| expected.eq_ignore_ascii_case(peer_name.trim()))
    }
}

/// Connection handshake coordinator
///
/// Each interceptor handle owns its own coordinator, so [`state`] reflects
/// only that handle's attempts.
///
/// [`state`]: HandshakeCoordinator::state
pub struct HandshakeCoordinator {
    client: Arc<RelayClient>,
    timeout: Duration,
    poll_interval: Duration,
    state: RwLock<HandshakeState>,
}

impl HandshakeCoordinator {
    pub fn new(client: Arc<RelayClient>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            timeout,
            poll_interval,
            state: RwLock::new(HandshakeState::Idle),
        }
    }

    pub fn from_config(config: &InterceptorConfig, client: Arc<RelayClient>) -> Self {
        Self::new(client, config.handshake_timeout, config.poll_interval)
    }

    /// State of the most recent attempt
    pub fn state(&self) -> HandshakeState {
        self.state.read().clone()
    }

    /// Pair with `uri` and wait for the resulting session
    ///
    /// Fails with a relay error when pairing fails, with
    /// [`Error::MetadataMismatch`] as soon as the session's peer name differs
    /// from `expected_peer`, and with [`Error::Timeout`] once the timeout has
    /// elapsed without a session.
    pub async fn connect(&self, uri: &str, expected_peer: Option<&str>) -> Result<Session> {
        self.run(uri, expected_peer, None).await
    }

    /// [`HandshakeCoordinator::connect`] that stops with [`Error::Cancelled`]
    /// when `cancel` fires
    pub async fn connect_with_cancel(
        &self,
        uri: &str,
        expected_peer: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Session> {
        self.run(uri, expected_peer, Some(&cancel)).await
    }

    async fn run(
        &self,
        uri: &str,
        expected_peer: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Session> {
        // The timeout covers pairing as well as approval
        let started_at = Instant::now();
        self.set_state(HandshakeState::Pairing);

        let pairing = match self.client.pair(uri).await {
            Ok(Some(pairing)) => pairing,
            Ok(None) => {
                return self.fail(Error::Relay("pairing produced no handle".to_string()));
            }
            Err(e) => return self.fail(e),
        };

        let attempt = ConnectionAttempt::new(pairing, expected_peer, started_at);
        self.set_state(HandshakeState::AwaitingApproval);
        info!(
            pairing_topic = %attempt.pairing.topic,
            expected_peer = attempt.expected_peer.as_deref().unwrap_or("<any>"),
            "Waiting for session approval"
        );

        match self.await_session(&attempt, cancel).await {
            Ok(session) => {
                info!(
                    topic = %session.topic,
                    peer = %session.peer_metadata.name,
                    "Session established"
                );
                self.set_state(HandshakeState::Established(session.topic.clone()));
                Ok(session)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn await_session(
        &self,
        attempt: &ConnectionAttempt,
        cancel: Option<&CancellationToken>,
    ) -> Result<Session> {
        loop {
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }

            match self.client.get_active_sessions(None).await {
                Ok(sessions) => {
                    let found = sessions
                        .into_iter()
                        .find(|s| s.pairing_topic == attempt.pairing.topic);

                    if let Some(session) = found {
                        if attempt.peer_matches(&session.peer_metadata.name) {
                            return Ok(session);
                        }
                        return Err(Error::MetadataMismatch {
                            expected: attempt.expected_peer.clone().unwrap_or_default(),
                            actual: session.peer_metadata.name,
                        });
                    }
                }
                Err(e) => debug!(error = %e, "Session lookup failed, retrying"),
            }

            let elapsed = attempt.started_at.elapsed();
            if elapsed > self.timeout {
                return Err(Error::Timeout {
                    waited_secs: elapsed.as_secs(),
                });
            }
        }
    }

    fn set_state(&self, state: HandshakeState) {
        *self.state.write() = state;
    }

    fn fail(&self, error: Error) -> Result<Session> {
        warn!(error = %error, "Connection attempt failed");
        self.set_state(HandshakeState::Failed(error.to_string()));
        Err(error)
    }
}
