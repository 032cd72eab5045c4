use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::error::ProviderRpcError;

/// Chain reported when the options leave `chain_id` unset (Polygon mainnet).
pub const DEFAULT_CHAIN_ID: u64 = 137;

/// Address returned by the provider plus whatever metadata it attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub address: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl AccountRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Options handed to the provider factory untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub rpc_urls: BTreeMap<u64, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProviderOptions {
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_rpc_url(mut self, chain_id: u64, url: impl Into<String>) -> Self {
        self.rpc_urls.insert(chain_id, url.into());
        self
    }

    /// Chain id the connector reports after a successful connect.
    pub fn reported_chain_id(&self) -> u64 {
        self.chain_id.unwrap_or(DEFAULT_CHAIN_ID)
    }
}

/// Event emitted by a provider outside of any pending call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Disconnect(Option<ProviderRpcError>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn switch_chain(chain_id: u64) -> Self {
        Self::new(
            SWITCH_CHAIN_METHOD,
            json!([{ "chainId": format!("{chain_id:#x}") }]),
        )
    }
}

pub const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";

/// Partial state pushed to the host framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<String>>,
}

impl StateUpdate {
    pub fn connected(chain_id: u64, address: impl Into<String>) -> Self {
        Self {
            chain_id: Some(chain_id),
            accounts: Some(vec![address.into()]),
        }
    }
}

/// Host-side connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorState {
    pub chain_id: Option<u64>,
    pub accounts: Option<Vec<String>>,
    pub activating: bool,
}

impl ConnectorState {
    pub fn is_connected(&self) -> bool {
        self.chain_id.is_some() && self.accounts.as_ref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct SwitchChainParams {
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionOut {
    pub connected: bool,
    pub activating: bool,
    pub chain_id: Option<u64>,
    pub accounts: Vec<String>,
}

impl From<ConnectorState> for ConnectionOut {
    fn from(state: ConnectorState) -> Self {
        Self {
            connected: state.is_connected(),
            activating: state.activating,
            chain_id: state.chain_id,
            accounts: state.accounts.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountOut {
    pub account: Option<AccountRecord>,
}
