//! Wallet context supplied by the application layer
//!
//! Holds the connected account, the chain the user is currently viewing, and
//! the chains the DAO can act on. Cloned handles share the same state.

use crate::ChainId;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ContextState {
    account: Option<String>,
    active_chain: Option<u64>,
    supported_chains: Vec<u64>,
}

/// Shared account/chain selection
#[derive(Debug, Clone, Default)]
pub struct WalletContext {
    state: Arc<RwLock<ContextState>>,
}

impl WalletContext {
    /// Create a context with the chains the DAO supports
    pub fn new(supported_chains: impl IntoIterator<Item = u64>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ContextState {
                supported_chains: supported_chains.into_iter().collect(),
                ..Default::default()
            })),
        }
    }

    /// Set or clear the connected account
    pub fn set_account(&self, account: Option<impl Into<String>>) {
        self.state.write().account = account.map(Into::into);
    }

    pub fn account(&self) -> Option<String> {
        self.state.read().account.clone()
    }

    /// Set or clear the chain the user is viewing
    pub fn set_active_chain(&self, chain: Option<u64>) {
        self.state.write().active_chain = chain;
    }

    pub fn active_chain(&self) -> Option<u64> {
        self.state.read().active_chain
    }

    /// Active chain as a namespace-qualified id
    pub fn active_chain_id(&self) -> Option<ChainId> {
        self.active_chain().map(ChainId::eip155)
    }

    pub fn supported_chains(&self) -> Vec<u64> {
        self.state.read().supported_chains.clone()
    }
}
