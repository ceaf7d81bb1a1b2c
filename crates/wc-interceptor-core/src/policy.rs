//! Session approval policy
//!
//! Computes the namespace grant offered to a connecting peer. The grant is
//! always the full set of supported chains for the single connected account,
//! restricted to exactly the methods the peer required.

use crate::{
    AccountId, ChainId, EIP155_NAMESPACE, Error, Proposal, Result, SESSION_EVENTS,
    SessionNamespace, SessionNamespaces,
};

/// Build the namespaces granted for `proposal`
///
/// Fails with [`Error::UnsupportedNamespace`] when the proposal requires a
/// namespace other than `eip155`, [`Error::UnsupportedAccounts`] without an
/// account, and [`Error::InvalidConfig`] without supported chains.
pub fn build_approved_namespaces(
    proposal: &Proposal,
    account_address: &str,
    supported_chain_ids: &[u64],
) -> Result<SessionNamespaces> {
    if let Some(other) = proposal
        .required_namespaces
        .keys()
        .find(|ns| ns.as_str() != EIP155_NAMESPACE)
    {
        return Err(Error::UnsupportedNamespace(other.clone()));
    }

    let account_address = account_address.trim();
    if account_address.is_empty() {
        return Err(Error::UnsupportedAccounts(
            "no account connected".to_string(),
        ));
    }

    if supported_chain_ids.is_empty() {
        return Err(Error::InvalidConfig("no supported chains".to_string()));
    }

    let chains: Vec<ChainId> = supported_chain_ids
        .iter()
        .copied()
        .map(ChainId::eip155)
        .collect();

    let accounts = chains
        .iter()
        .map(|chain| AccountId::new(chain.clone(), account_address).to_string())
        .collect();

    let mut methods: Vec<String> = Vec::new();
    if let Some(required) = proposal.required_namespaces.get(EIP155_NAMESPACE) {
        for method in &required.methods {
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }
    }

    let mut namespaces = SessionNamespaces::new();
    namespaces.insert(
        EIP155_NAMESPACE.to_string(),
        SessionNamespace {
            chains: chains.iter().map(ToString::to_string).collect(),
            accounts,
            methods,
            events: SESSION_EVENTS.iter().map(|e| e.to_string()).collect(),
        },
    );

    Ok(namespaces)
}
