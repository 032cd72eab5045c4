use std::str::FromStr;

use ethers::{
    signers::{LocalWallet, Signer},
    utils::to_checksum,
};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
};

/// Optional local signer that stands in for the wallet's account when configured.
#[derive(Debug, Clone, Default)]
pub struct WalletManager {
    signer: Option<LocalWallet>,
}

impl WalletManager {
    pub fn new(signer: Option<LocalWallet>) -> Self {
        Self { signer }
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        match config.private_key {
            Some(ref key) => Self::from_private_key(key, config.chain_id),
            None => Ok(Self::new(None)),
        }
    }

    pub fn from_private_key(key: &str, chain_id: u64) -> AppResult<Self> {
        let trimmed = key.trim().trim_start_matches("0x");
        let wallet = LocalWallet::from_str(trimmed)
            .map_err(|err| AppError::Wallet(format!("failed to parse private key: {err}")))?;
        Ok(Self::new(Some(wallet.with_chain_id(chain_id))))
    }

    /// Checksummed address of the configured signer.
    pub fn address(&self) -> Option<String> {
        self.signer
            .as_ref()
            .map(|wallet| to_checksum(&wallet.address(), None))
    }

    /// Rebind the signer to another chain after a switch.
    pub fn rebind_chain(&mut self, chain_id: u64) {
        if let Some(wallet) = self.signer.take() {
            self.signer = Some(wallet.with_chain_id(chain_id));
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.signer.as_ref().map(Signer::chain_id)
    }
}
