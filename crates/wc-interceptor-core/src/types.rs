//! Core types for the session interceptor
//!
//! Wire names follow the WalletConnect sign data structures (camelCase).

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Relay-assigned session or pairing identifier
pub type Topic = String;

/// Relay-assigned proposal identifier
pub type ProposalId = u64;

/// Relay-assigned request identifier
pub type RequestId = u64;

/// The only chain-account namespace this wallet serves
pub const EIP155_NAMESPACE: &str = "eip155";

/// Events granted to every session
pub const SESSION_EVENTS: [&str; 2] = ["accountsChanged", "chainChanged"];

/// Identity descriptor advertised by either side of a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

impl Metadata {
    /// Create a new descriptor without icons
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            icons: Vec::new(),
        }
    }

    /// Add an icon URL
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icons.push(icon.into());
        self
    }

    /// Whether `other` describes the same application.
    ///
    /// Name and URL identify an application; description and icons are
    /// presentation details that may drift between releases.
    pub fn same_identity(&self, other: &Metadata) -> bool {
        self.name == other.name && self.url.trim_end_matches('/') == other.url.trim_end_matches('/')
    }
}

/// CAIP-2 chain identifier, e.g. `eip155:137`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    pub namespace: String,
    pub reference: String,
}

impl ChainId {
    /// EVM chain with the given numeric id
    pub fn eip155(id: u64) -> Self {
        Self {
            namespace: EIP155_NAMESPACE.to_string(),
            reference: id.to_string(),
        }
    }

    /// Numeric reference for EVM chains
    pub fn eip155_id(&self) -> Option<u64> {
        if self.namespace == EIP155_NAMESPACE {
            self.reference.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((namespace, reference))
                if !namespace.is_empty() && !reference.is_empty() && !reference.contains(':') =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    reference: reference.to_string(),
                })
            }
            _ => Err(Error::Serialization(format!("invalid chain id: {s}"))),
        }
    }
}

/// CAIP-10 account identifier, e.g. `eip155:1:0xabc`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    pub chain: ChainId,
    pub address: String,
}

impl AccountId {
    pub fn new(chain: ChainId, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(reference), Some(address))
                if !namespace.is_empty() && !reference.is_empty() && !address.is_empty() =>
            {
                Ok(Self {
                    chain: ChainId {
                        namespace: namespace.to_string(),
                        reference: reference.to_string(),
                    },
                    address: address.to_string(),
                })
            }
            _ => Err(Error::Serialization(format!("invalid account id: {s}"))),
        }
    }
}

/// Capabilities a peer asks for under one namespace
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Requested namespaces keyed by namespace name
pub type ProposalNamespaces = BTreeMap<String, ProposalNamespace>;

/// Capabilities granted under one namespace
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    pub accounts: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Granted namespaces keyed by namespace name
pub type SessionNamespaces = BTreeMap<String, SessionNamespace>;

/// A peer's request to establish a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: ProposalId,
    pub pairing_topic: Topic,
    pub proposer: Metadata,
    #[serde(default)]
    pub required_namespaces: ProposalNamespaces,
    #[serde(default)]
    pub optional_namespaces: ProposalNamespaces,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(id: ProposalId, pairing_topic: impl Into<Topic>, proposer: Metadata) -> Self {
        Self {
            id,
            pairing_topic: pairing_topic.into(),
            proposer,
            required_namespaces: ProposalNamespaces::new(),
            optional_namespaces: ProposalNamespaces::new(),
            expiry: None,
        }
    }

    /// Require a namespace
    pub fn with_required(mut self, namespace: impl Into<String>, ns: ProposalNamespace) -> Self {
        self.required_namespaces.insert(namespace.into(), ns);
        self
    }

    /// Request an optional namespace
    pub fn with_optional(mut self, namespace: impl Into<String>, ns: ProposalNamespace) -> Self {
        self.optional_namespaces.insert(namespace.into(), ns);
        self
    }
}

/// An established connection between this wallet and a peer dApp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: Topic,
    pub pairing_topic: Topic,
    /// Identity this wallet presented when approving
    pub self_metadata: Metadata,
    /// Identity advertised by the peer (untrusted)
    pub peer_metadata: Metadata,
    pub namespaces: SessionNamespaces,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// All granted accounts across namespaces
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.namespaces
            .values()
            .flat_map(|ns| ns.accounts.iter().map(String::as_str))
    }

    /// Whether any granted account belongs to `address`
    pub fn has_account(&self, address: &str) -> bool {
        self.accounts().any(|account| {
            account
                .parse::<AccountId>()
                .map(|id| id.address.eq_ignore_ascii_case(address))
                .unwrap_or(false)
        })
    }

    /// Whether the session was approved by a wallet with this identity
    pub fn is_owned_by(&self, identity: &Metadata) -> bool {
        self.self_metadata.same_identity(identity)
    }
}

/// Method call carried by an action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Transaction-like object carried by `eth_sendTransaction` style requests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionCall {
    #[serde(default)]
    pub from: Option<String>,
    pub to: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Signing/transaction request relayed from a connected peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub id: RequestId,
    pub topic: Topic,
    pub chain_id: String,
    pub request: RequestPayload,
}

impl ActionRequest {
    /// Transaction object from the first param, if the request carries one
    pub fn transaction(&self) -> Option<TransactionCall> {
        let first = match &self.request.params {
            serde_json::Value::Array(items) => items.first()?.clone(),
            obj @ serde_json::Value::Object(_) => obj.clone(),
            _ => return None,
        };
        serde_json::from_value(first).ok()
    }
}

/// Peer-facing error reason (WalletConnect SDK codes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReason {
    pub code: i64,
    pub message: String,
}

impl ErrorReason {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(5000, "User rejected.")
    }

    pub fn unsupported_chains() -> Self {
        Self::new(5100, "Unsupported chains.")
    }

    pub fn unsupported_accounts() -> Self {
        Self::new(5103, "Unsupported accounts.")
    }

    pub fn unsupported_namespace_key() -> Self {
        Self::new(5104, "Unsupported namespace key.")
    }

    pub fn user_disconnected() -> Self {
        Self::new(6000, "User disconnected.")
    }
}

/// Answer to an action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Result(serde_json::Value),
    Error(ErrorReason),
}

/// Session torn down by the peer or the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    pub topic: Topic,
    #[serde(default)]
    pub reason: Option<ErrorReason>,
}

/// Relay-level pairing established for a URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingHandle {
    pub topic: Topic,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active: bool,
}

/// Events pushed by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    SessionProposal(Proposal),
    SessionRequest(ActionRequest),
    SessionDelete(DisconnectEvent),
}
