use super::ServiceClient;
use crate::config::IntentWalletConfig;
use crate::errors::{WalletError, WalletResult};
use crate::wallet::evm::{Call, EvmTransaction};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use eyre::Context as _;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Asset the settlement layer must deliver on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputToken {
    pub address: Address,
    pub chain_id: u64,
    pub amount: U256,
}

/// What the relayer is asked to settle: an asset delivery, or a call on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntentTarget {
    #[serde(rename = "outputTokens")]
    OutputTokens(Vec<OutputToken>),
    #[serde(rename = "chainId")]
    ChainId(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentRequest {
    pub account: Address,
    pub calls: Vec<Call>,
    #[serde(flatten)]
    pub target: IntentTarget,
}

impl IntentRequest {
    /// Native transfers (positive value, no calldata) become an output-token intent for the
    /// native asset. Everything else, zero-value calls included, only names the chain.
    pub fn for_transaction(account: Address, chain_id: u64, tx: &EvmTransaction) -> Self {
        let calls = vec![Call::from(tx)];
        let target = if tx.is_native_transfer() {
            IntentTarget::OutputTokens(vec![OutputToken {
                address: Address::ZERO,
                chain_id,
                amount: tx.value,
            }])
        } else {
            IntentTarget::ChainId(chain_id)
        };
        Self {
            account,
            calls,
            target,
        }
    }
}

/// An intent built by the relayer, waiting for the owner's signature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedIntent {
    pub intent: Value,
    pub intent_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentReceipt {
    pub success: bool,
    pub tx_hash: Option<String>,
}

/// Cross-chain intent relayer.
#[async_trait]
pub trait IntentApi: Send + Sync {
    /// Counterfactual account address owned by `owner`.
    async fn account_address(&self, owner: Address, chain_id: u64) -> eyre::Result<Address>;
    async fn prepare_intent(&self, req: &IntentRequest) -> eyre::Result<PreparedIntent>;
    /// Returns the user-intent hash to poll with.
    async fn send_intent(&self, intent: &Value, signature: &str) -> eyre::Result<B256>;
    async fn execution_receipt(&self, ui_hash: B256) -> eyre::Result<Option<IntentReceipt>>;
    async fn chain_abstracted_balance(
        &self,
        account: Address,
        tokens: &[String],
        chain_ids: &[u64],
    ) -> eyre::Result<Value>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionReceiptWire {
    status: String,
    #[serde(default)]
    receipt: Option<ReceiptWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptWire {
    #[serde(default)]
    transaction_hash: Option<String>,
}

impl From<ExecutionReceiptWire> for IntentReceipt {
    fn from(w: ExecutionReceiptWire) -> Self {
        Self {
            success: w.status.eq_ignore_ascii_case("success"),
            tx_hash: w
                .receipt
                .and_then(|r| r.transaction_hash)
                .filter(|h| !h.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentIntent {
    output_ui_hash: UiHash,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiHash {
    ui_hash: B256,
}

/// [`IntentApi`] over the relayer's JSON-RPC endpoint.
#[derive(Debug)]
pub struct HttpIntentApi {
    svc: ServiceClient,
    path: String,
    next_id: AtomicU64,
}

impl HttpIntentApi {
    pub fn from_config(cfg: &IntentWalletConfig) -> WalletResult<Self> {
        let project_id = cfg
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                WalletError::Configuration("intent backend needs ZERODEV_PROJECT_ID".into())
            })?;
        let svc = ServiceClient::new(&cfg.relayer_url, &[]).map_err(WalletError::configuration)?;
        Ok(Self {
            svc,
            path: format!("/api/v3/{project_id}"),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> eyre::Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let env: RpcEnvelope = self.svc.post(&self.path, &body, &[]).await?;
        if let Some(e) = env.error {
            eyre::bail!("{method} failed ({}): {}", e.code, e.message);
        }
        serde_json::from_value(env.result).with_context(|| format!("decode {method} result"))
    }
}

#[async_trait]
impl IntentApi for HttpIntentApi {
    async fn account_address(&self, owner: Address, chain_id: u64) -> eyre::Result<Address> {
        self.rpc(
            "ui_getAccountAddress",
            json!([{ "owner": owner, "chainId": chain_id }]),
        )
        .await
    }

    async fn prepare_intent(&self, req: &IntentRequest) -> eyre::Result<PreparedIntent> {
        self.rpc("ui_getIntent", json!([req])).await
    }

    async fn send_intent(&self, intent: &Value, signature: &str) -> eyre::Result<B256> {
        let sent: SentIntent = self
            .rpc(
                "ui_sendUserIntent",
                json!([{ "intent": intent, "signature": signature }]),
            )
            .await?;
        Ok(sent.output_ui_hash.ui_hash)
    }

    async fn execution_receipt(&self, ui_hash: B256) -> eyre::Result<Option<IntentReceipt>> {
        let r: Option<ExecutionReceiptWire> = self
            .rpc("ui_getUserIntentExecutionReceipt", json!([ui_hash]))
            .await?;
        Ok(r.map(IntentReceipt::from))
    }

    async fn chain_abstracted_balance(
        &self,
        account: Address,
        tokens: &[String],
        chain_ids: &[u64],
    ) -> eyre::Result<Value> {
        self.rpc(
            "ui_getCAB",
            json!([{ "accountAddress": account, "tokenTickers": tokens, "networks": chain_ids }]),
        )
        .await
    }
}
