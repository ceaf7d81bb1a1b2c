//! Interceptor configuration

use crate::{Error, Metadata, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wait for a paired peer's session to appear
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between session lookups while waiting
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Identity presented to every peer
pub fn default_identity() -> Metadata {
    Metadata::new(
        "DAO Governance",
        "Governance app connecting DAOs to external dApps",
        "https://app.dao.example",
    )
    .with_icon("https://app.dao.example/icon.svg")
}

/// Interceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Relay project identifier
    pub project_id: String,
    /// Identity presented to peers
    pub metadata: Metadata,
    /// EVM chain ids the DAO can act on
    pub supported_chains: Vec<u64>,
    /// Upper bound on pairing-to-approval wait
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
    /// Session lookup interval while waiting for approval
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            metadata: default_identity(),
            // mainnet, optimism, polygon, base, arbitrum, sepolia
            supported_chains: vec![1, 10, 137, 8453, 42161, 11155111],
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl InterceptorConfig {
    /// Create with a relay project id and default identity
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Set the identity presented to peers
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set supported chain ids
    pub fn with_supported_chains(mut self, chains: impl IntoIterator<Item = u64>) -> Self {
        self.supported_chains = chains.into_iter().collect();
        self
    }

    /// Set handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::InvalidConfig("project_id is empty".to_string()));
        }
        if self.metadata.name.is_empty() || self.metadata.url.is_empty() {
            return Err(Error::InvalidConfig(
                "metadata needs a name and url".to_string(),
            ));
        }
        if self.supported_chains.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one supported chain is required".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval is zero".to_string()));
        }
        if self.handshake_timeout < self.poll_interval {
            return Err(Error::InvalidConfig(format!(
                "handshake_timeout ({:?}) shorter than poll_interval ({:?})",
                self.handshake_timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
