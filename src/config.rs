use crate::{
    error::{AppError, AppResult},
    types::{DEFAULT_CHAIN_ID, ProviderOptions},
};
use dotenvy::dotenv;
use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, path::Path};

const DEFAULT_CONFIG_PATH: &str = "Config.toml";

/// Strongly-typed configuration derived from a `Config.toml` or environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub eth_rpc_url: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Extra transports keyed by decimal chain id, used for chain switching.
    #[serde(default)]
    pub rpc_urls: BTreeMap<String, String>,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

impl AppConfig {
    /// Load configuration, preferring a user-provided config file and falling back to env vars.
    pub fn load() -> AppResult<Self> {
        dotenv().ok();

        let configured_path =
            env::var("CONNECTOR_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config_path = Path::new(&configured_path);

        if config_path.exists() {
            let raw = fs::read_to_string(config_path)
                .map_err(|err| AppError::Config(format!("failed to read config file: {err}")))?;
            return Self::from_toml(&raw);
        }

        Self::from_env()
    }

    pub fn from_toml(raw: &str) -> AppResult<Self> {
        let mut cfg: AppConfig = toml::from_str(raw)
            .map_err(|err| AppError::Config(format!("failed to parse config file: {err}")))?;
        cfg.apply_chain_id_default();
        Ok(cfg)
    }

    /// Helper used when no config file is present.
    fn from_env() -> AppResult<Self> {
        let eth_rpc_url = env::var("ETH_RPC_URL")
            .map_err(|_| AppError::Config("ETH_RPC_URL missing (config file not found)".into()))?;

        let private_key = env::var("PRIVATE_KEY").ok();
        let chain_id = env::var("CHAIN_ID")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CHAIN_ID);
        let rpc_urls = match env::var("RPC_URLS") {
            Ok(raw) => parse_rpc_urls(&raw)?,
            Err(_) => BTreeMap::new(),
        };

        let mut cfg = Self {
            eth_rpc_url,
            private_key,
            chain_id,
            rpc_urls,
        };
        cfg.apply_chain_id_default();
        Ok(cfg)
    }

    /// Ensure we never surface a zero chain id from user input.
    fn apply_chain_id_default(&mut self) {
        if self.chain_id == 0 {
            self.chain_id = DEFAULT_CHAIN_ID;
        }
    }

    /// Build the options forwarded to the provider. `eth_rpc_url` serves the configured chain.
    pub fn provider_options(&self) -> AppResult<ProviderOptions> {
        let mut options = ProviderOptions::default().with_chain_id(self.chain_id);
        for (chain, url) in &self.rpc_urls {
            let chain_id = chain
                .trim()
                .parse::<u64>()
                .map_err(|err| AppError::Config(format!("invalid chain id `{chain}`: {err}")))?;
            options = options.with_rpc_url(chain_id, url.clone());
        }
        Ok(options.with_rpc_url(self.chain_id, self.eth_rpc_url.clone()))
    }
}

/// Parse `RPC_URLS` in the form `10=https://...,56=https://...`.
fn parse_rpc_urls(raw: &str) -> AppResult<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(chain, url)| (chain.trim().to_string(), url.trim().to_string()))
                .ok_or_else(|| AppError::Config(format!("malformed RPC_URLS entry: {entry}")))
        })
        .collect()
}
