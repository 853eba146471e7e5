use super::{to_json, ActionProvider, ActionResult, ActionSpec, NetworkSupport};
use crate::amount::{format_units, parse_units};
use crate::chains::evm::IERC20;
use crate::errors::ToolError;
use crate::network::{explorer_tx_url, NetworkIdentity, ProtocolFamily};
use crate::wallet::evm::{parse_address, read_call, EvmTransaction, EvmWalletProvider};
use crate::wallet::{AsEvmWallet, WalletProvider};
use alloy::primitives::Bytes;
use alloy::sol_types::SolCall as _;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Fungible-token operations for account-based networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Erc20ActionProvider;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BalanceArgs {
    contract_address: String,
    /// Defaults to the wallet's own address.
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferArgs {
    contract_address: String,
    destination: String,
    /// Whole token units; scaled by the token's on-chain decimals.
    amount: String,
}

fn evm_of<W: AsEvmWallet + ?Sized>(w: &W) -> Result<&dyn EvmWalletProvider, ToolError> {
    w.as_evm().ok_or_else(|| {
        ToolError::new(
            "unsupported_operation",
            "erc20 actions need an account-based wallet",
        )
    })
}

async fn get_erc20_balance<W>(w: Arc<W>, args: BalanceArgs) -> ActionResult
where
    W: AsEvmWallet + Send + Sync + ?Sized,
{
    let evm = evm_of(w.as_ref())?;
    let token = parse_address(&args.contract_address)?;
    let owner = match args.address.as_deref() {
        Some(a) => parse_address(a)?,
        None => evm.evm_address(),
    };
    let balance = read_call(evm, token, &IERC20::balanceOfCall { account: owner }).await?;
    let decimals = read_call(evm, token, &IERC20::decimalsCall {}).await?;
    to_json(&json!({
        "token": token.to_checksum(None),
        "owner": owner.to_checksum(None),
        "decimals": decimals,
        "balance": format_units(balance, u32::from(decimals)),
        "balanceBaseUnits": balance.to_string(),
    }))
}

async fn erc20_transfer<W>(w: Arc<W>, args: TransferArgs) -> ActionResult
where
    W: AsEvmWallet + Send + Sync + ?Sized,
{
    let evm = evm_of(w.as_ref())?;
    let token = parse_address(&args.contract_address)?;
    let to = parse_address(&args.destination)?;
    let decimals = read_call(evm, token, &IERC20::decimalsCall {}).await?;
    let value = parse_units(&args.amount, u32::from(decimals))?;
    if value.is_zero() {
        return Err(ToolError::invalid_arguments("amount must be greater than zero"));
    }
    let data = IERC20::transferCall { to, value }.abi_encode();
    let id = evm
        .send_transaction(EvmTransaction::call(token, Bytes::from(data)))
        .await?;
    tracing::info!(backend = evm.name(), token = %token, id = %id, "erc20 transfer confirmed");
    let explorer = explorer_tx_url(evm.network(), &id).ok();
    to_json(&json!({
        "id": id,
        "token": token.to_checksum(None),
        "to": to.to_checksum(None),
        "amount": args.amount,
        "explorerUrl": explorer,
    }))
}

impl<W> ActionProvider<W> for Erc20ActionProvider
where
    W: WalletProvider + AsEvmWallet + 'static,
{
    fn name(&self) -> &str {
        "erc20"
    }

    fn supports_network(&self, network: &NetworkIdentity) -> bool {
        NetworkSupport::Families(vec![ProtocolFamily::Evm]).matches(network)
    }

    fn actions(&self) -> Vec<ActionSpec<W>> {
        vec![
            ActionSpec::new::<BalanceArgs, _, _>(
                "get_erc20_balance",
                "Token balance of the wallet (or `address`) in whole units.",
                json!({
                    "type": "object",
                    "properties": {
                        "contract_address": { "type": "string", "description": "ERC-20 contract." },
                        "address": { "type": "string", "description": "Holder; defaults to the wallet." }
                    },
                    "required": ["contract_address"],
                    "additionalProperties": false
                }),
                get_erc20_balance::<W>,
            ),
            ActionSpec::new::<TransferArgs, _, _>(
                "erc20_transfer",
                "Transfer ERC-20 tokens and wait for confirmation. `amount` is in whole token units.",
                json!({
                    "type": "object",
                    "properties": {
                        "contract_address": { "type": "string" },
                        "destination": { "type": "string" },
                        "amount": { "type": "string", "description": "Whole units, e.g. 1.5" }
                    },
                    "required": ["contract_address", "destination", "amount"],
                    "additionalProperties": false
                }),
                erc20_transfer::<W>,
            ),
        ]
    }
}
