use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    actions::ConnectorStore,
    connector::UniPassConnector,
    error::{AppError, AppResult},
    types::{AccountOut, ConnectionOut, SwitchChainParams},
};

/// Shared context that higher layers pass around. Keeps the host store and the connector.
pub struct ServiceContext {
    pub store: ConnectorStore,
    pub connector: UniPassConnector<ConnectorStore>,
}

impl ServiceContext {
    pub fn new(store: ConnectorStore, connector: UniPassConnector<ConnectorStore>) -> Self {
        Self { store, connector }
    }
}

/// Middle layer that runs connector operations and reports the resulting host state.
#[derive(Clone)]
pub struct ServiceLayer {
    ctx: Arc<ServiceContext>,
}

impl ServiceLayer {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn activate(&self) -> AppResult<ConnectionOut> {
        self.ctx.connector.activate().await;
        Ok(self.report("activate"))
    }

    #[instrument(skip(self))]
    pub async fn connect_eagerly(&self) -> AppResult<ConnectionOut> {
        self.ctx.connector.connect_eagerly().await;
        Ok(self.report("connect_eagerly"))
    }

    #[instrument(skip(self), fields(chain_id = params.chain_id))]
    pub async fn switch_chain(&self, params: SwitchChainParams) -> AppResult<ConnectionOut> {
        if params.chain_id == 0 {
            return Err(AppError::InvalidInput("chain_id must be non-zero".into()));
        }
        self.ctx.connector.switch_chain_id(params.chain_id).await;
        Ok(self.report("switch_chain"))
    }

    /// Ends the provider session when one exists; host state is reset either way.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> AppResult<ConnectionOut> {
        match self.ctx.connector.provider() {
            // The connector's disconnect listener resets the store before this returns.
            Some(provider) => provider.disconnect().await,
            None => self.ctx.connector.reset_state(),
        }
        Ok(self.report("disconnect"))
    }

    pub async fn get_state(&self) -> AppResult<ConnectionOut> {
        Ok(self.ctx.store.snapshot().into())
    }

    pub async fn get_account(&self) -> AppResult<AccountOut> {
        Ok(AccountOut {
            account: self.ctx.connector.account().await,
        })
    }

    fn report(&self, operation: &str) -> ConnectionOut {
        let out = ConnectionOut::from(self.ctx.store.snapshot());
        info!(operation, connected = out.connected, chain_id = ?out.chain_id, "operation finished");
        out
    }
}
