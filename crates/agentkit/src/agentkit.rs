//! The orchestrator: one wallet, an ordered provider list, and the flat action set they yield
//! on the wallet's network.

use crate::action::{Action, ActionProvider, Erc20ActionProvider, WalletActionProvider};
use crate::config::AgentKitConfig;
use crate::errors::WalletResult;
use crate::wallet::{AsEvmWallet, Wallet, WalletProvider};
use serde_json::Value;
use std::sync::Arc;

/// Provider names split by whether they run on the wallet's network, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPartition {
    pub supported: Vec<String>,
    pub unsupported: Vec<String>,
}

pub struct AgentKit<W: ?Sized> {
    wallet: Arc<W>,
    providers: Vec<Box<dyn ActionProvider<W>>>,
}

impl<W: ?Sized> std::fmt::Debug for AgentKit<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKit")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<W: WalletProvider + 'static> AgentKit<W> {
    /// An empty provider list registers the wallet provider alone.
    pub fn new(wallet: Arc<W>, providers: Vec<Box<dyn ActionProvider<W>>>) -> Self {
        let providers = if providers.is_empty() {
            vec![Box::new(WalletActionProvider) as Box<dyn ActionProvider<W>>]
        } else {
            providers
        };
        Self { wallet, providers }
    }

    pub const fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    pub fn partition(&self) -> ProviderPartition {
        let network = self.wallet.network();
        let mut out = ProviderPartition::default();
        for p in &self.providers {
            if p.supports_network(network) {
                out.supported.push(p.name().to_owned());
            } else {
                out.unsupported.push(p.name().to_owned());
            }
        }
        out
    }

    /// Bind every supported provider's operations to the wallet.
    ///
    /// Excluded providers are reported in a single warning; exclusion never fails the call.
    pub fn actions(&self) -> ActionSet<W> {
        let network = self.wallet.network();
        let mut actions = vec![];
        let mut excluded = vec![];
        for p in &self.providers {
            if p.supports_network(network) {
                actions.extend(p.actions().iter().map(|spec| spec.bind(&self.wallet)));
            } else {
                excluded.push(p.name());
            }
        }
        if !excluded.is_empty() {
            tracing::warn!(
                network = %network,
                excluded = ?excluded,
                "action providers not supported on this network were skipped"
            );
        }
        ActionSet { actions }
    }
}

impl AgentKit<Wallet> {
    /// Build the configured wallet and register the built-in providers.
    pub async fn from_config(cfg: &AgentKitConfig) -> WalletResult<Self> {
        let wallet = Arc::new(Wallet::from_config(cfg).await?);
        Ok(Self::new(wallet, default_providers()))
    }
}

/// Built-in providers in registration order.
pub fn default_providers<W>() -> Vec<Box<dyn ActionProvider<W>>>
where
    W: WalletProvider + AsEvmWallet + 'static,
{
    vec![Box::new(WalletActionProvider), Box::new(Erc20ActionProvider)]
}

/// Flat, order-preserving view over the bound operations.
pub struct ActionSet<W: ?Sized> {
    actions: Vec<Action<W>>,
}

impl<W: ?Sized> std::fmt::Debug for ActionSet<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<W: ?Sized> ActionSet<W> {
    /// First action registered under `name`. Names are not deduplicated.
    pub fn get(&self, name: &str) -> Option<&Action<W>> {
        self.actions.iter().find(|a| a.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(Action::name).collect()
    }

    pub fn tool_schemas(&self) -> Value {
        Value::Array(self.actions.iter().map(Action::tool_schema).collect())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action<W>> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<'a, W: ?Sized> IntoIterator for &'a ActionSet<W> {
    type Item = &'a Action<W>;
    type IntoIter = std::slice::Iter<'a, Action<W>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionSpec, NetworkSupport, TableActionProvider};
    use crate::network::{NetworkIdentity, ProtocolFamily};
    use crate::test_support::{LogCapture, MockWallet};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Empty {}

    fn op(name: &'static str) -> ActionSpec<MockWallet> {
        ActionSpec::new::<Empty, _, _>(name, "", json!({}), |_w, _a| async move { Ok(String::new()) })
    }

    fn table(
        name: &str,
        support: NetworkSupport,
        ops: &[&'static str],
    ) -> Box<dyn ActionProvider<MockWallet>> {
        Box::new(TableActionProvider::new(
            name,
            support,
            ops.iter().copied().map(op).collect(),
        ))
    }

    fn mixed_kit() -> eyre::Result<AgentKit<MockWallet>> {
        Ok(AgentKit::new(
            Arc::new(MockWallet::evm("base-sepolia")?),
            vec![
                table(
                    "evm_tools",
                    NetworkSupport::Families(vec![ProtocolFamily::Evm]),
                    &["deploy_token", "mint_nft"],
                ),
                table(
                    "solana_tools",
                    NetworkSupport::NetworkIds(vec!["solana-devnet".into()]),
                    &["swap_jupiter"],
                ),
            ],
        ))
    }

    #[test]
    fn unsupported_providers_are_excluded_with_one_warning() -> eyre::Result<()> {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let kit = mixed_kit()?;
        let set = kit.actions();
        assert_eq!(set.names(), vec!["deploy_token", "mint_nft"]);
        assert_eq!(logs.count_containing("\"level\":\"WARN\""), 1);
        assert_eq!(logs.count_containing("solana_tools"), 1);
        Ok(())
    }

    #[test]
    fn no_warning_when_every_provider_is_supported() -> eyre::Result<()> {
        let logs = LogCapture::new();
        let _guard = logs.install();
        let kit = AgentKit::new(Arc::new(MockWallet::svm("solana-devnet")?), vec![]);
        assert_eq!(kit.actions().len(), 2);
        assert_eq!(logs.count_containing("\"level\":\"WARN\""), 0);
        Ok(())
    }

    #[test]
    fn composition_is_deterministic() -> eyre::Result<()> {
        let kit = mixed_kit()?;
        let first = kit.actions().names();
        for _ in 0..5 {
            assert_eq!(kit.actions().names(), first);
        }
        assert_eq!(
            kit.partition(),
            ProviderPartition {
                supported: vec!["evm_tools".into()],
                unsupported: vec!["solana_tools".into()],
            }
        );
        Ok(())
    }

    #[test]
    fn empty_registration_defaults_to_wallet_actions() -> eyre::Result<()> {
        let kit = AgentKit::new(Arc::new(MockWallet::evm("base-sepolia")?), vec![]);
        assert_eq!(kit.actions().names(), vec!["get_wallet_details", "native_transfer"]);
        Ok(())
    }

    #[test]
    fn built_in_providers_follow_the_wallet_family() -> eyre::Result<()> {
        let evm = AgentKit::new(Arc::new(MockWallet::evm("base-sepolia")?), default_providers());
        assert_eq!(
            evm.actions().names(),
            vec!["get_wallet_details", "native_transfer", "get_erc20_balance", "erc20_transfer"]
        );
        let svm = AgentKit::new(Arc::new(MockWallet::svm("solana-devnet")?), default_providers());
        assert_eq!(svm.partition().unsupported, vec!["erc20".to_owned()]);
        Ok(())
    }

    #[test]
    fn malformed_wallet_identity_leaves_an_empty_set() {
        let kit = AgentKit::new(
            Arc::new(MockWallet::with_identity(NetworkIdentity::default())),
            default_providers(),
        );
        assert!(kit.actions().is_empty());
        assert_eq!(kit.partition().unsupported.len(), 2);
    }

    #[tokio::test]
    async fn bound_actions_reach_the_shared_wallet() -> eyre::Result<()> {
        let wallet = Arc::new(MockWallet::evm("base-sepolia")?);
        let kit = AgentKit::new(Arc::clone(&wallet), vec![]);
        let set = kit.actions();
        let transfer = set
            .get("native_transfer")
            .ok_or_else(|| eyre::eyre!("missing native_transfer"))?;
        transfer
            .invoke(json!({ "to": "0x0000000000000000000000000000000000000002", "value": "1" }))
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        assert_eq!(wallet.transfers().len(), 1);
        let schemas = set.tool_schemas();
        assert_eq!(
            schemas.pointer("/1/name").and_then(Value::as_str),
            Some("native_transfer")
        );
        Ok(())
    }
}
