use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use ethers::{
    providers::{Http, JsonRpcClient, Provider, ProviderError},
    types::Address,
    utils::to_checksum,
};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{ConnectorError, ProviderRpcError},
    provider::{
        EventEmitter, EventListener, ListenerId, ProviderFactory, ProviderResult, WalletProvider,
    },
    types::{AccountRecord, ProviderEvent, ProviderOptions, RequestArguments, SWITCH_CHAIN_METHOD},
    wallet::WalletManager,
};

/// Wallet provider backed by one ethers transport per configured chain.
///
/// With a local signer the signer's address is the account; otherwise the node is asked via
/// `eth_requestAccounts`. Chain switching is resolved locally against the known transports.
#[derive(Debug)]
pub struct EthersWalletProvider<P> {
    transports: BTreeMap<u64, Arc<Provider<P>>>,
    active_chain: RwLock<u64>,
    wallet: RwLock<WalletManager>,
    events: EventEmitter,
}

impl<P: JsonRpcClient + 'static> EthersWalletProvider<P> {
    pub fn new(
        transports: BTreeMap<u64, Provider<P>>,
        chain_id: u64,
        wallet: WalletManager,
    ) -> Result<Self, ConnectorError> {
        if !transports.contains_key(&chain_id) {
            return Err(ConnectorError::Initialization(format!(
                "no rpc url configured for chain {chain_id}"
            )));
        }

        Ok(Self {
            transports: transports
                .into_iter()
                .map(|(chain, provider)| (chain, Arc::new(provider)))
                .collect(),
            active_chain: RwLock::new(chain_id),
            wallet: RwLock::new(wallet),
            events: EventEmitter::new(),
        })
    }

    pub async fn active_chain_id(&self) -> u64 {
        *self.active_chain.read().await
    }

    async fn active_transport(&self) -> ProviderResult<Arc<Provider<P>>> {
        let chain_id = self.active_chain_id().await;
        self.transports.get(&chain_id).cloned().ok_or_else(|| {
            ProviderRpcError::new(
                ProviderRpcError::CHAIN_DISCONNECTED,
                format!("no transport for chain {chain_id}"),
            )
        })
    }

    /// Transport-level failures end the session, so listeners are told about them.
    fn transport_error(&self, err: ProviderError) -> ProviderRpcError {
        let err = ProviderRpcError::from(err);
        if err.is_disconnect() {
            warn!("wallet transport failed: {err}");
            self.events.emit(ProviderEvent::Disconnect(Some(err.clone())));
        }
        err
    }

    async fn switch_chain(&self, params: &Value) -> ProviderResult<Value> {
        let chain_id = parse_switch_params(params)?;
        if !self.transports.contains_key(&chain_id) {
            return Err(ProviderRpcError::new(
                ProviderRpcError::UNRECOGNIZED_CHAIN,
                format!("Unrecognized chain ID {chain_id:#x}"),
            ));
        }

        *self.active_chain.write().await = chain_id;
        self.wallet.write().await.rebind_chain(chain_id);
        info!(chain_id, "switched active chain");
        Ok(Value::Null)
    }

    fn account_record(address: String, source: &str, chain_id: u64) -> AccountRecord {
        AccountRecord::new(address)
            .with_metadata("source", json!(source))
            .with_metadata("chainId", json!(chain_id))
    }
}

/// Extract the chain id from `[{"chainId": "0x.."}]`.
fn parse_switch_params(params: &Value) -> ProviderResult<u64> {
    let raw = params
        .get(0)
        .and_then(|param| param.get("chainId"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderRpcError::new(ProviderRpcError::INVALID_PARAMS, "missing chainId parameter")
        })?;

    let digits = raw.strip_prefix("0x").ok_or_else(|| {
        ProviderRpcError::new(
            ProviderRpcError::INVALID_PARAMS,
            format!("chainId must be a 0x-prefixed hex string, got {raw}"),
        )
    })?;

    u64::from_str_radix(digits, 16).map_err(|err| {
        ProviderRpcError::new(
            ProviderRpcError::INVALID_PARAMS,
            format!("invalid chainId {raw}: {err}"),
        )
    })
}

#[async_trait]
impl<P: JsonRpcClient + 'static> WalletProvider for EthersWalletProvider<P> {
    async fn connect(&self) -> ProviderResult<Option<AccountRecord>> {
        let chain_id = self.active_chain_id().await;
        if let Some(address) = self.wallet.read().await.address() {
            return Ok(Some(Self::account_record(address, "local-signer", chain_id)));
        }

        let transport = self.active_transport().await?;
        let accounts: Vec<Address> = transport
            .request("eth_requestAccounts", ())
            .await
            .map_err(|err| self.transport_error(err))?;
        debug!(count = accounts.len(), "node returned accounts");

        Ok(accounts
            .first()
            .map(|address| Self::account_record(to_checksum(address, None), "rpc", chain_id)))
    }

    async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        if args.method == SWITCH_CHAIN_METHOD {
            return self.switch_chain(&args.params).await;
        }

        let transport = self.active_transport().await?;
        transport
            .request::<Value, Value>(&args.method, args.params)
            .await
            .map_err(|err| self.transport_error(err))
    }

    fn on(&self, listener: EventListener) -> ListenerId {
        self.events.on(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.events.remove_listener(id)
    }

    async fn disconnect(&self) {
        info!("disconnecting wallet provider");
        self.events.emit(ProviderEvent::Disconnect(None));
    }
}

/// Builds [`EthersWalletProvider`] over HTTP transports from the connector options.
#[derive(Debug, Clone, Default)]
pub struct EthersProviderFactory {
    wallet: WalletManager,
}

impl EthersProviderFactory {
    pub fn new(wallet: WalletManager) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl ProviderFactory for EthersProviderFactory {
    async fn create(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn WalletProvider>, ConnectorError> {
        let chain_id = options.reported_chain_id();

        let mut transports = BTreeMap::new();
        for (chain, url) in &options.rpc_urls {
            let provider = Provider::<Http>::try_from(url.as_str()).map_err(|err| {
                ConnectorError::Initialization(format!("invalid rpc url for chain {chain}: {err}"))
            })?;
            transports.insert(*chain, provider);
        }

        let mut wallet = self.wallet.clone();
        wallet.rebind_chain(chain_id);

        let provider = EthersWalletProvider::new(transports, chain_id, wallet)?;
        info!(chain_id, chains = provider.transports.len(), "wallet provider constructed");
        Ok(Arc::new(provider))
    }
}
