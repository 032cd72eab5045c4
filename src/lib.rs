//! Wallet connector adapting a lazily created UniPass-style provider to a host dapp framework.

pub mod actions;
pub mod config;
pub mod connector;
pub mod error;
pub mod implementations;
pub mod layers;
pub mod provider;
pub mod types;
pub mod wallet;

pub use actions::{Actions, CancelActivation, ConnectorStore};
pub use connector::{ErrorHandler, UniPassConnector};
pub use error::{ConnectorError, ProviderRpcError};
pub use provider::{ProviderFactory, WalletProvider};
pub use types::{AccountRecord, ProviderEvent, ProviderOptions, StateUpdate};
