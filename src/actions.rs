//! Host framework side of the connector: the `Actions` contract and an in-process store.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::types::{ConnectorState, StateUpdate};

/// Calls a connector is allowed to make into its host framework.
pub trait Actions: Send + Sync + 'static {
    /// Mark an activation as pending and return the handle that cancels it.
    fn start_activation(&self) -> CancelActivation;
    fn update(&self, update: StateUpdate);
    fn reset_state(&self);
}

/// One-shot handle returned by [`Actions::start_activation`].
pub struct CancelActivation(Box<dyn FnOnce() + Send + Sync>);

impl CancelActivation {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Box::new(cancel))
    }

    pub fn cancel(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for CancelActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelActivation")
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    nonce: u64,
    state: ConnectorState,
}

/// Store holding the host-side connection state, observable through a watch channel.
#[derive(Debug, Clone)]
pub struct ConnectorStore {
    inner: Arc<RwLock<StoreInner>>,
    tx: Arc<watch::Sender<ConnectorState>>,
}

impl Default for ConnectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectorState::default());
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            tx: Arc::new(tx),
        }
    }

    pub fn snapshot(&self) -> ConnectorState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.tx.subscribe()
    }

    fn mutate(&self, f: impl FnOnce(&mut StoreInner)) {
        // A poisoned lock only means a panicking writer; the state itself is plain data.
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut inner);
        self.tx.send_replace(inner.state.clone());
    }
}

impl Actions for ConnectorStore {
    fn start_activation(&self) -> CancelActivation {
        let mut started = 0;
        self.mutate(|inner| {
            inner.nonce += 1;
            started = inner.nonce;
            inner.state.activating = true;
        });
        debug!(nonce = started, "activation started");

        let store = self.clone();
        CancelActivation::new(move || {
            store.mutate(|inner| {
                // Only the most recent activation may clear the pending flag.
                if inner.nonce == started {
                    inner.state.activating = false;
                }
            });
        })
    }

    fn update(&self, update: StateUpdate) {
        if update.chain_id == Some(0) {
            warn!("ignoring state update with chain id 0");
            return;
        }

        self.mutate(|inner| {
            let state = &mut inner.state;
            if let Some(chain_id) = update.chain_id {
                state.chain_id = Some(chain_id);
            }
            if let Some(accounts) = update.accounts {
                state.accounts = Some(accounts);
            }
            if state.activating && state.chain_id.is_some() && state.accounts.is_some() {
                state.activating = false;
            }
        });
    }

    fn reset_state(&self) {
        self.mutate(|inner| {
            inner.nonce += 1;
            inner.state = ConnectorState::default();
        });
        debug!("connection state reset");
    }
}
