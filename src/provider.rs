use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::{ConnectorError, ProviderRpcError},
    types::{AccountRecord, ProviderEvent, ProviderOptions, RequestArguments},
};

pub type ProviderResult<T> = Result<T, ProviderRpcError>;

/// Callback invoked synchronously, on the emitting call, for every provider event.
pub type EventListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Runtime object of an external wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for an account. `None` means the wallet answered without one.
    async fn connect(&self) -> ProviderResult<Option<AccountRecord>>;

    async fn request(&self, args: RequestArguments) -> ProviderResult<Value>;

    fn on(&self, listener: EventListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    /// Drop the session; listeners see a disconnect event without an error.
    async fn disconnect(&self);
}

/// Loads and constructs a provider from the connector's options.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn WalletProvider>, ConnectorError>;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, EventListener)>,
}

/// Listener registry shared by provider implementations.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Listeners>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, listener: EventListener) -> ListenerId {
        let mut listeners = self.lock();
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners.entries.push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.lock().entries.retain(|(entry, _)| *entry != id);
    }

    pub fn listener_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Every listener has run by the time this returns.
    pub fn emit(&self, event: ProviderEvent) {
        // Listeners run outside the lock so they may register or remove listeners themselves.
        let listeners: Vec<EventListener> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
