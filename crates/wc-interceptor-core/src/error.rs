//! Error types for the session interceptor

use crate::types::ErrorReason;
use thiserror::Error;

/// Interceptor errors
#[derive(Debug, Error)]
pub enum Error {
    // ============ Relay Errors ============
    /// Relay client has not been initialized yet
    #[error("Relay client not initialized")]
    NotInitialized,

    /// Relay client failed to initialize and will not become ready
    #[error("Relay client initialization failed: {0}")]
    InitializationFailed(String),

    /// Malformed or expired pairing URI
    #[error("Invalid pairing URI: {0}")]
    InvalidUri(String),

    /// Relay rejected the call
    #[error("Relay error: {0}")]
    Relay(String),

    /// Relay unreachable or connection dropped
    #[error("Network error: {0}")]
    Network(String),

    // ============ Handshake Errors ============
    /// Connected peer is not the one the caller expected
    #[error("Peer metadata mismatch: expected {expected:?}, got {actual:?}")]
    MetadataMismatch { expected: String, actual: String },

    /// No matching session appeared in time
    #[error("Timed out after {waited_secs}s waiting for session approval")]
    Timeout { waited_secs: u64 },

    /// Connection attempt abandoned by the caller
    #[error("Connection attempt cancelled")]
    Cancelled,

    // ============ Approval Errors ============
    /// Proposal is no longer pending on the relay
    #[error("Approval failed: {0}")]
    Approval(String),

    /// Proposal requires a namespace this wallet does not serve
    #[error("Unsupported namespace: {0}")]
    UnsupportedNamespace(String),

    /// No account available to grant
    #[error("Unsupported accounts: {0}")]
    UnsupportedAccounts(String),

    // ============ Session Errors ============
    /// Session teardown failed
    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    // ============ Internal Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error belongs to the relay category (client state or transport)
    pub fn is_relay_error(&self) -> bool {
        matches!(
            self,
            Error::NotInitialized
                | Error::InitializationFailed(_)
                | Error::InvalidUri(_)
                | Error::Relay(_)
                | Error::Network(_)
        )
    }

    /// Check if retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Relay(_) | Error::Timeout { .. } | Error::Cancelled
        )
    }

    /// Reason sent to a peer when this error causes a proposal to be rejected
    pub fn reject_reason(&self) -> ErrorReason {
        match self {
            Error::UnsupportedNamespace(_) => ErrorReason::unsupported_namespace_key(),
            Error::UnsupportedAccounts(_) => ErrorReason::unsupported_accounts(),
            Error::InvalidConfig(_) => ErrorReason::unsupported_chains(),
            _ => ErrorReason::user_rejected(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
