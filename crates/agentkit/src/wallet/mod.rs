//! The wallet contract every custody backend satisfies, plus the per-family refinements.

pub mod evm;
pub mod keys;
pub mod lifecycle;
pub mod svm;

use crate::config::{AgentKitConfig, WalletConfig};
use crate::errors::{WalletError, WalletResult};
use crate::network::{NetworkIdentity, ProtocolFamily};
use alloy::primitives::U256;
use async_trait::async_trait;
use evm::{EvmWallet, EvmWalletProvider};
use svm::SvmWallet;

/// Minimal capability shared by every backend on every chain family.
///
/// A provider is only handed out by an async factory, so every method may assume construction
/// (remote account lookup, chain verification) already finished.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn address(&self) -> String;
    fn network(&self) -> &NetworkIdentity;
    fn name(&self) -> &'static str;

    /// Native balance in base units (wei, lamports).
    async fn balance(&self) -> WalletResult<U256>;

    /// Transfer `amount` base units of the native asset to `to`.
    ///
    /// Signs, submits and waits for finality as one unit. Returns the chain-native identifier.
    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String>;
}

/// Gives action providers access to the account-based surface when the wallet has one.
pub trait AsEvmWallet {
    fn as_evm(&self) -> Option<&dyn EvmWalletProvider>;
}

/// The wallet selected by configuration.
pub enum Wallet {
    Evm(EvmWallet),
    Svm(SvmWallet),
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("backend", &self.name())
            .field("network", self.network())
            .field("address", &self.address())
            .finish()
    }
}

impl Wallet {
    /// Build the configured backend for the configured network.
    ///
    /// Missing credentials are reported before any network I/O.
    pub async fn from_config(cfg: &AgentKitConfig) -> WalletResult<Self> {
        if matches!(cfg.wallet, WalletConfig::Unconfigured) {
            return Err(WalletError::Configuration(
                "no wallet backend configured; set PRIVATE_KEY, MNEMONIC_PHRASE or CDP_API_KEY_ID, \
                 or add a [wallet] table to the config file"
                    .into(),
            ));
        }
        let chain = cfg.chain()?;
        tracing::info!(
            backend = cfg.wallet.backend_name(),
            network = chain.network_id,
            "building wallet"
        );
        match chain.family {
            ProtocolFamily::Evm => Ok(Self::Evm(EvmWallet::from_config(cfg, chain).await?)),
            ProtocolFamily::Svm => Ok(Self::Svm(SvmWallet::from_config(cfg, chain).await?)),
            ProtocolFamily::Unknown => Err(WalletError::UnsupportedNetwork(
                chain.network_id.to_owned(),
            )),
        }
    }

    pub const fn as_svm(&self) -> Option<&SvmWallet> {
        match self {
            Self::Svm(w) => Some(w),
            Self::Evm(_) => None,
        }
    }

    fn inner(&self) -> &dyn WalletProvider {
        match self {
            Self::Evm(w) => w,
            Self::Svm(w) => w,
        }
    }
}

impl AsEvmWallet for Wallet {
    fn as_evm(&self) -> Option<&dyn EvmWalletProvider> {
        match self {
            Self::Evm(w) => Some(w),
            Self::Svm(_) => None,
        }
    }
}

#[async_trait]
impl WalletProvider for Wallet {
    fn address(&self) -> String {
        self.inner().address()
    }

    fn network(&self) -> &NetworkIdentity {
        self.inner().network()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn balance(&self) -> WalletResult<U256> {
        self.inner().balance().await
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        self.inner().native_transfer(to, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalKeyConfig, SmartWalletConfig};

    #[tokio::test]
    async fn unconfigured_wallet_is_a_configuration_error() {
        let cfg = AgentKitConfig::default();
        assert!(matches!(
            Wallet::from_config(&cfg).await,
            Err(WalletError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn unknown_network_is_rejected_before_any_io() {
        let cfg = AgentKitConfig {
            network_id: Some("not-a-chain".into()),
            wallet: WalletConfig::Local(LocalKeyConfig::default()),
            ..AgentKitConfig::default()
        };
        assert!(matches!(
            Wallet::from_config(&cfg).await,
            Err(WalletError::UnsupportedNetwork(_))
        ));
    }

    #[tokio::test]
    async fn missing_local_key_is_a_configuration_error() {
        let cfg = AgentKitConfig {
            network_id: Some("solana-devnet".into()),
            wallet: WalletConfig::Local(LocalKeyConfig::default()),
            ..AgentKitConfig::default()
        };
        assert!(matches!(
            Wallet::from_config(&cfg).await,
            Err(WalletError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn smart_wallet_needs_api_credentials() {
        let cfg = AgentKitConfig {
            wallet: WalletConfig::Smart(SmartWalletConfig::default()),
            ..AgentKitConfig::default()
        };
        assert!(matches!(
            Wallet::from_config(&cfg).await,
            Err(WalletError::Configuration(_))
        ));
    }
}
