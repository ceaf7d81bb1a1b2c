//! # WalletConnect Session Interceptor
//!
//! Lets a DAO governance front-end act as a WalletConnect *wallet* toward
//! external dApps. A user pastes a pairing URI from a dApp; the interceptor
//! pairs with it over the relay, auto-approves the session for the DAO
//! account, and routes the dApp's transaction and signing requests back to
//! the governance UI, where they can be turned into proposals.
//!
//! ## Components
//!
//! - **Relay Client**: one lazily initialized relay client with a fixed
//!   application identity, pumping relay events to subscribers
//! - **Session Store**: observable list of this application's sessions, with
//!   automatic approval of incoming proposals
//! - **Handshake Coordinator**: pair, then poll until the session appears,
//!   the peer turns out to be the wrong one, or the attempt times out
//! - **Approval Policy**: namespace grant for the connected account across
//!   every supported chain
//! - **Action Multiplexer**: chain-filtered fan-out of peer requests
//!
//! ## Flow
//!
//! ```text
//! dApp ──► pairing URI ──► Handshake ──► Relay
//!                              │           │
//!                              │      session_proposal
//!                              │           ▼
//!                              │     Session Store ──► approve
//!                              ▼           │
//!                         Established ◄────┘
//!                              │
//! dApp ──► session_request ──► Multiplexer ──► governance UI
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wc_interceptor_core::{InterceptorConfig, WalletConnectInterceptor};
//! use wc_interceptor_core::transport::{BridgeConfig, BridgeTransport};
//!
//! let transport = BridgeTransport::connect(BridgeConfig::new("ws://localhost:9000")).await?;
//! let interceptor = WalletConnectInterceptor::new(
//!     InterceptorConfig::new("project-id").with_supported_chains([1, 137]),
//!     Arc::new(transport),
//! )?;
//! interceptor.initialize().await?;
//!
//! interceptor.context().set_account(Some("0xDAO..."));
//! interceptor.context().set_active_chain(Some(1));
//!
//! let handle = interceptor.handle(|sessions| println!("{} sessions", sessions.len()));
//! let _requests = handle.on_action_request(|req| println!("{}", req.request.method));
//! let session = handle.connect("wc:...", Some("Snapshot")).await?;
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod handshake;
pub mod interceptor;
pub mod multiplexer;
pub mod policy;
pub mod store;
pub mod transport;
pub mod types;
pub mod uri;

pub use client::{ClientState, RelayClient, SubscriptionId};
pub use config::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_POLL_INTERVAL, InterceptorConfig, default_identity,
};
pub use context::WalletContext;
pub use error::{Error, Result};
pub use handshake::{ConnectionAttempt, HandshakeCoordinator, HandshakeState};
pub use interceptor::{InterceptorHandle, WalletConnectInterceptor};
pub use multiplexer::{ActionRequestMultiplexer, ActionSubscription};
pub use policy::build_approved_namespaces;
pub use store::{SessionStore, SessionSubscription};
pub use types::*;
pub use uri::PairingUri;
