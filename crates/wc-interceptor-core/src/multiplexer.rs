//! Action request multiplexer
//!
//! Fans signing and transaction requests from connected peers out to UI
//! handlers, forwarding only requests addressed to the chain the user is
//! currently viewing. Requests for any other chain are dropped; there is no
//! queue and no replay.

use crate::client::{RelayClient, SubscriptionId};
use crate::{ActionRequest, ChainId, WalletContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback receiving forwarded action requests
pub type ActionHandler = Arc<dyn Fn(&ActionRequest) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    handlers: Vec<(u64, ActionHandler)>,
    relay_subscription: Option<SubscriptionId>,
}

struct MultiplexerInner {
    client: Arc<RelayClient>,
    context: WalletContext,
    registry: Mutex<HandlerRegistry>,
    next_handler: AtomicU64,
}

impl MultiplexerInner {
    fn on_request(&self, event: &ActionRequest) -> usize {
        let active = self.context.active_chain_id();
        let target = event.chain_id.parse::<ChainId>().ok();
        let on_active_chain = match (
            target.as_ref().and_then(ChainId::eip155_id),
            active.as_ref().and_then(ChainId::eip155_id),
        ) {
            (Some(target), Some(active)) => target == active,
            _ => false,
        };

        if !on_active_chain {
            let active = active.map(|chain| chain.to_string());
            debug!(
                topic = %event.topic,
                chain_id = %event.chain_id,
                active_chain = active.as_deref().unwrap_or("<none>"),
                "Dropping request for inactive chain"
            );
            return 0;
        }

        let handlers: Vec<ActionHandler> = self
            .registry
            .lock()
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    fn remove_handler(&self, id: u64) {
        let mut registry = self.registry.lock();
        registry.handlers.retain(|(existing, _)| *existing != id);

        if !registry.handlers.is_empty() {
            return;
        }
        if let Some(subscription) = registry.relay_subscription.take() {
            self.client.unsubscribe_request(subscription);
            debug!("Action multiplexer detached from relay client");
        }
    }
}

/// Chain-filtered fan-out of action requests
#[derive(Clone)]
pub struct ActionRequestMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl ActionRequestMultiplexer {
    pub fn new(client: Arc<RelayClient>, context: WalletContext) -> Self {
        Self {
            inner: Arc::new(MultiplexerInner {
                client,
                context,
                registry: Mutex::new(HandlerRegistry::default()),
                next_handler: AtomicU64::new(1),
            }),
        }
    }

    /// Forward `event` to every handler if it targets the active chain
    ///
    /// Returns the number of handlers invoked.
    pub fn on_request(&self, event: &ActionRequest) -> usize {
        self.inner.on_request(event)
    }

    /// Register a handler; it stays registered until the guard is dropped
    pub fn on_action_request(
        &self,
        handler: impl Fn(&ActionRequest) + Send + Sync + 'static,
    ) -> ActionSubscription {
        let id = self.inner.next_handler.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.registry.lock();

        if registry.relay_subscription.is_none() {
            let weak = Arc::downgrade(&self.inner);
            registry.relay_subscription = Some(self.inner.client.subscribe_request(
                move |event: &ActionRequest| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_request(event);
                    }
                },
            ));
            debug!("Action multiplexer attached to relay client");
        }
        registry.handlers.push((id, Arc::new(handler)));

        ActionSubscription {
            multiplexer: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.registry.lock().handlers.len()
    }
}

/// Handler registration; dropping it unsubscribes
#[must_use = "dropping the subscription unregisters the handler"]
pub struct ActionSubscription {
    multiplexer: Weak<MultiplexerInner>,
    id: u64,
}

impl ActionSubscription {
    /// Unregister now
    pub fn cancel(self) {}
}

impl Drop for ActionSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.multiplexer.upgrade() {
            inner.remove_handler(self.id);
        }
    }
}

impl std::fmt::Debug for ActionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSubscription")
            .field("id", &self.id)
            .finish()
    }
}
