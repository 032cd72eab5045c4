use ethers::providers::{ProviderError, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the configuration and JSON-RPC front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("wallet error: {0}")]
    Wallet(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug)]
pub struct JsonRpcErrorPayload {
    pub code: i32,
    pub message: String,
    pub data: Value,
}

impl JsonRpcErrorPayload {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: json!({}),
        }
    }
}

impl AppError {
    pub fn to_json_rpc(&self) -> JsonRpcErrorPayload {
        match self {
            AppError::Config(msg) => JsonRpcErrorPayload::new(-32001, msg.clone()),
            AppError::InvalidInput(msg) => JsonRpcErrorPayload::new(-32602, msg.clone()),
            AppError::Wallet(msg) => JsonRpcErrorPayload::new(-32030, msg.clone()),
            AppError::Io(msg) => JsonRpcErrorPayload::new(-32040, msg.clone()),
            AppError::Serialization(msg) => JsonRpcErrorPayload::new(-32700, msg.clone()),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// EIP-1193 style error reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(Self::DISCONNECTED, message)
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self.code, Self::DISCONNECTED | Self::CHAIN_DISCONNECTED)
    }
}

impl From<ProviderError> for ProviderRpcError {
    fn from(err: ProviderError) -> Self {
        // Node-reported errors keep their code; anything else means the transport is gone.
        if let Some(resp) = err.as_error_response() {
            return Self {
                code: resp.code,
                message: resp.message.clone(),
                data: resp.data.clone(),
            };
        }
        Self::disconnected(err.to_string())
    }
}

/// Outcome of a single connector attempt. Logged by the connector, never returned to callers.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("provider initialization failed: {0}")]
    Initialization(String),
    #[error("no accounts returned")]
    NoAccounts,
    #[error("provider not initialized")]
    NotInitialized,
    #[error("provider error: {0}")]
    Provider(#[from] ProviderRpcError),
}
