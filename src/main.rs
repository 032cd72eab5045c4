use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use unipass_connector::{
    actions::ConnectorStore,
    config::AppConfig,
    connector::UniPassConnector,
    error::AppResult,
    implementations::ethers_provider::EthersProviderFactory,
    layers::{
        rpc::RpcServer,
        service::{ServiceContext, ServiceLayer},
    },
    wallet::WalletManager,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("fatal error: {err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    init_tracing();

    info!("loading configuration");
    let config = AppConfig::load()?;
    let options = config.provider_options()?;

    info!("initialising wallet manager");
    let wallet = WalletManager::from_config(&config)?;
    if let Some(address) = wallet.address() {
        info!(%address, "using local signer");
    }
    let factory = Arc::new(EthersProviderFactory::new(wallet));

    let store = ConnectorStore::new();
    let connector = UniPassConnector::new(Arc::new(store.clone()), options, factory)
        .with_error_handler(|err| warn!(code = err.code, "wallet disconnected: {}", err.message));

    let service_ctx = Arc::new(ServiceContext::new(store, connector));
    let service = ServiceLayer::new(service_ctx);

    info!(chain_id = config.chain_id, "starting JSON-RPC stdio server");
    let server = RpcServer::new(service);
    server.run_stdio().await
}

/// Logs go to stderr; stdout carries the JSON-RPC stream.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .init();
}
