use super::{to_json, ActionProvider, ActionResult, ActionSpec, NetworkSupport};
use crate::amount::{format_units, parse_units};
use crate::errors::ToolError;
use crate::network::NetworkIdentity;
use crate::wallet::WalletProvider;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Operations every wallet supports on every network.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletActionProvider;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NativeTransferArgs {
    to: String,
    /// Whole units of the native asset ("0.01").
    value: String,
}

async fn get_wallet_details<W: WalletProvider + ?Sized>(w: Arc<W>, _args: NoArgs) -> ActionResult {
    let network = w.network().clone();
    let chain = network.chain().map_err(ToolError::from)?;
    let balance = w.balance().await.map_err(ToolError::from)?;
    to_json(&json!({
        "address": w.address(),
        "provider": w.name(),
        "network": network,
        "nativeSymbol": chain.native_symbol,
        "nativeBalance": format_units(balance, chain.native_decimals),
        "nativeBalanceBaseUnits": balance.to_string(),
    }))
}

async fn native_transfer<W: WalletProvider + ?Sized>(
    w: Arc<W>,
    args: NativeTransferArgs,
) -> ActionResult {
    let chain = w.network().chain().map_err(ToolError::from)?;
    let base = parse_units(&args.value, chain.native_decimals).map_err(ToolError::from)?;
    if base.is_zero() {
        return Err(ToolError::invalid_arguments("value must be greater than zero"));
    }
    let id = w
        .native_transfer(&args.to, &base.to_string())
        .await
        .map_err(ToolError::from)?;
    tracing::info!(backend = w.name(), network = chain.network_id, id = %id, "native transfer confirmed");
    to_json(&json!({
        "id": id,
        "to": args.to,
        "value": args.value,
        "symbol": chain.native_symbol,
        "explorerUrl": chain.explorer_tx_url(&id),
    }))
}

impl<W: WalletProvider + 'static> ActionProvider<W> for WalletActionProvider {
    fn name(&self) -> &str {
        "wallet"
    }

    fn supports_network(&self, network: &NetworkIdentity) -> bool {
        NetworkSupport::Any.matches(network)
    }

    fn actions(&self) -> Vec<ActionSpec<W>> {
        vec![
            ActionSpec::new::<NoArgs, _, _>(
                "get_wallet_details",
                "Address, backend, network and native balance of the connected wallet.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
                get_wallet_details::<W>,
            ),
            ActionSpec::new::<NativeTransferArgs, _, _>(
                "native_transfer",
                "Send the network's native asset and wait for confirmation. `value` is in whole units (e.g. 0.01 ETH).",
                json!({
                    "type": "object",
                    "properties": {
                        "to": { "type": "string", "description": "Destination address." },
                        "value": { "type": "string", "description": "Amount in whole units of the native asset." }
                    },
                    "required": ["to", "value"],
                    "additionalProperties": false
                }),
                native_transfer::<W>,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockWallet;
    use serde_json::Value;

    fn action(name: &str, w: &Arc<MockWallet>) -> eyre::Result<super::super::Action<MockWallet>> {
        let specs = <WalletActionProvider as ActionProvider<MockWallet>>::actions(&WalletActionProvider);
        specs
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.bind(w))
            .ok_or_else(|| eyre::eyre!("no action {name}"))
    }

    #[tokio::test]
    async fn transfer_converts_whole_units_to_base_units() -> eyre::Result<()> {
        let w = Arc::new(MockWallet::evm("base-sepolia")?);
        let out = action("native_transfer", &w)?
            .invoke(json!({ "to": "0x0000000000000000000000000000000000000001", "value": "0.5" }))
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        assert_eq!(
            w.transfers(),
            vec![(
                "0x0000000000000000000000000000000000000001".to_owned(),
                "500000000000000000".to_owned()
            )]
        );
        let v: Value = serde_json::from_str(&out)?;
        assert_eq!(v.get("symbol").and_then(Value::as_str), Some("ETH"));
        Ok(())
    }

    #[tokio::test]
    async fn lamports_use_nine_decimals() -> eyre::Result<()> {
        let w = Arc::new(MockWallet::svm("solana-devnet")?);
        action("native_transfer", &w)?
            .invoke(json!({ "to": "11111111111111111111111111111111", "value": "1.5" }))
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        assert_eq!(
            w.transfers().first().map(|t| t.1.clone()),
            Some("1500000000".to_owned())
        );
        Ok(())
    }

    #[tokio::test]
    async fn zero_value_is_rejected_without_sending() -> eyre::Result<()> {
        let w = Arc::new(MockWallet::evm("base-sepolia")?);
        let err = action("native_transfer", &w)?
            .invoke(json!({ "to": "0x0000000000000000000000000000000000000001", "value": "0" }))
            .await
            .err();
        assert_eq!(err.map(|e| e.code), Some("invalid_arguments"));
        assert!(w.transfers().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn details_report_the_formatted_balance() -> eyre::Result<()> {
        let w = Arc::new(MockWallet::evm("base-sepolia")?);
        let out = action("get_wallet_details", &w)?
            .invoke(Value::Null)
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        let v: Value = serde_json::from_str(&out)?;
        assert_eq!(v.get("nativeBalance").and_then(Value::as_str), Some("1.25"));
        assert_eq!(
            v.pointer("/network/networkId").and_then(Value::as_str),
            Some("base-sepolia")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_fields_are_invalid_arguments() -> eyre::Result<()> {
        let w = Arc::new(MockWallet::evm("base-sepolia")?);
        let err = action("get_wallet_details", &w)?
            .invoke(json!({ "verbose": true }))
            .await
            .err();
        assert_eq!(err.map(|e| e.code), Some("invalid_arguments"));
        Ok(())
    }
}
