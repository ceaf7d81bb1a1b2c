//! Pairing URI parsing
//!
//! A pairing URI has the form
//! `wc:<topic>@2?relay-protocol=irn&symKey=<64 hex chars>[&expiryTimestamp=<unix secs>]`.

use crate::{Error, Result, Topic};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "wc:";
const SUPPORTED_VERSION: u32 = 2;
const SYM_KEY_LEN: usize = 32;

/// Validated pairing URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingUri {
    pub topic: Topic,
    pub version: u32,
    pub relay_protocol: String,
    #[serde(skip_serializing)]
    pub sym_key: String,
    pub expiry: Option<DateTime<Utc>>,
    pub methods: Vec<String>,
    #[serde(skip)]
    raw: String,
}

impl PairingUri {
    /// Parse and validate a pairing URI
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::InvalidUri("missing wc: scheme".to_string()))?;

        let (head, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (topic, version) = head
            .split_once('@')
            .ok_or_else(|| Error::InvalidUri("missing protocol version".to_string()))?;

        if topic.is_empty() || !topic.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidUri(format!("invalid topic: {topic:?}")));
        }

        let version: u32 = version
            .parse()
            .map_err(|_| Error::InvalidUri(format!("invalid version: {version:?}")))?;
        if version != SUPPORTED_VERSION {
            return Err(Error::InvalidUri(format!(
                "unsupported protocol version {version}, expected {SUPPORTED_VERSION}"
            )));
        }

        let mut relay_protocol = None;
        let mut sym_key = None;
        let mut expiry = None;
        let mut methods = Vec::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "relay-protocol" => relay_protocol = Some(value.to_string()),
                "symKey" => sym_key = Some(value.to_string()),
                "expiryTimestamp" => {
                    let secs: i64 = value
                        .parse()
                        .map_err(|_| Error::InvalidUri(format!("invalid expiry: {value:?}")))?;
                    expiry = Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                        Error::InvalidUri(format!("expiry out of range: {secs}"))
                    })?);
                }
                "methods" => {
                    // `methods=[wc_sessionPropose],[wc_authRequest]`
                    methods = value
                        .split(',')
                        .map(|m| m.trim_matches(|c| c == '[' || c == ']'))
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }

        let relay_protocol = relay_protocol
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidUri("missing relay-protocol".to_string()))?;

        let sym_key =
            sym_key.ok_or_else(|| Error::InvalidUri("missing symKey".to_string()))?;
        let key_bytes = hex::decode(&sym_key)
            .map_err(|e| Error::InvalidUri(format!("invalid symKey: {e}")))?;
        if key_bytes.len() != SYM_KEY_LEN {
            return Err(Error::InvalidUri(format!(
                "symKey must be {SYM_KEY_LEN} bytes, got {}",
                key_bytes.len()
            )));
        }

        Ok(Self {
            topic: topic.to_string(),
            version,
            relay_protocol,
            sym_key,
            expiry,
            methods,
            raw: raw.to_string(),
        })
    }

    /// Original URI text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check if the pairing offer has lapsed
    pub fn is_expired(&self) -> bool {
        self.expiry.map(|at| Utc::now() > at).unwrap_or(false)
    }
}

impl FromStr for PairingUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
