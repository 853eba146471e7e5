use crate::retry::{try_all_with_backoff, BackoffConfig};
use crate::wallet::evm::EvmTransaction;
use crate::wallet::lifecycle::TxReceipt;
use alloy::{
    network::{ReceiptResponse, TransactionBuilder as _},
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest},
    sol,
};
use async_trait::async_trait;
use eyre::Context as _;
use alloy::transports::http::reqwest::Client;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

sol! {
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function transfer(address to, uint256 value) returns (bool);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Everything the account-based backends need from a node. Reads may be retried across
/// endpoints; `send_raw` is attempted once.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn chain_id(&self) -> eyre::Result<u64>;
    async fn balance(&self, addr: Address) -> eyre::Result<U256>;
    async fn pending_nonce(&self, addr: Address) -> eyre::Result<u64>;
    async fn fee_estimate(&self) -> eyre::Result<FeeEstimate>;
    async fn gas_price(&self) -> eyre::Result<u128>;
    async fn estimate_gas(&self, from: Address, tx: &EvmTransaction) -> eyre::Result<u64>;
    async fn send_raw(&self, raw: &[u8]) -> eyre::Result<()>;
    async fn receipt(&self, hash: B256) -> eyre::Result<Option<TxReceipt>>;
    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes>;
}

pub fn compute_eip1559_fees(base_fee: u128, gas_price: u128) -> FeeEstimate {
    // priority: max(1.5 gwei, gas_price / 10); max fee: 2 * base + priority
    let min_priority: u128 = 1_500_000_000;
    let priority = std::cmp::max(min_priority, gas_price / 10);
    let max_fee = base_fee
        .saturating_mul(2)
        .saturating_add(priority)
        .max(base_fee.saturating_add(priority));
    FeeEstimate {
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority,
    }
}

fn broadcast_err_is_ok(err: &eyre::Report) -> bool {
    let s = format!("{err:#}").to_lowercase();
    s.contains("already known")
        || s.contains("known transaction")
        || s.contains("already imported")
        || s.contains("already in mempool")
}

pub fn to_request(from: Address, tx: &EvmTransaction) -> TransactionRequest {
    let mut req = TransactionRequest::default()
        .with_from(from)
        .with_to(tx.to)
        .with_value(tx.value)
        .with_input(tx.data.clone());
    req.nonce = tx.nonce;
    req.gas = tx.gas_limit;
    req.chain_id = tx.chain_id;
    req
}

fn receipt_from_alloy(r: &TransactionReceipt) -> TxReceipt {
    let fee = u128::from(r.gas_used).saturating_mul(r.effective_gas_price);
    let id = format!("{:#x}", r.transaction_hash);
    let mut out = if ReceiptResponse::status(r) {
        TxReceipt::confirmed(id, r.block_number)
    } else {
        TxReceipt::failed(id, r.block_number)
    };
    out.fee_paid = Some(fee.to_string());
    out
}

/// [`EvmRpc`] over JSON-RPC endpoints, primary first.
#[derive(Debug, Clone)]
pub struct AlloyRpc {
    urls: Vec<String>,
    backoff: BackoffConfig,
}

impl AlloyRpc {
    pub fn new(urls: Vec<String>) -> eyre::Result<Self> {
        if urls.is_empty() {
            eyre::bail!("no rpc endpoints configured");
        }
        Ok(Self {
            urls,
            backoff: BackoffConfig::default(),
        })
    }

    fn provider_for_url(url: &str) -> eyre::Result<RootProvider> {
        let u: reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .connect_timeout(DEFAULT_RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    async fn with_fallback<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(RootProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: std::future::Future<Output = eyre::Result<T>> + Send,
    {
        try_all_with_backoff(
            &self.urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                let f = &f;
                async move {
                    let p = Self::provider_for_url(&u)?;
                    f(p).await
                }
            },
            context_label,
        )
        .await
    }
}

#[async_trait]
impl EvmRpc for AlloyRpc {
    async fn chain_id(&self) -> eyre::Result<u64> {
        self.with_fallback("get chain id", |p| async move {
            p.get_chain_id().await.context("get chain id")
        })
        .await
    }

    async fn balance(&self, addr: Address) -> eyre::Result<U256> {
        self.with_fallback("get balance", |p| async move {
            p.get_balance(addr).await.context("get balance")
        })
        .await
    }

    async fn pending_nonce(&self, addr: Address) -> eyre::Result<u64> {
        self.with_fallback("get nonce", |p| async move {
            p.get_transaction_count(addr)
                .pending()
                .await
                .context("get nonce")
        })
        .await
    }

    async fn fee_estimate(&self) -> eyre::Result<FeeEstimate> {
        self.with_fallback("estimate fees", |p| async move {
            let base_fee = p
                .get_block_by_number(BlockNumberOrTag::Pending)
                .await
                .context("get pending block")?
                .and_then(|b| b.header.base_fee_per_gas.map(u128::from))
                .ok_or_else(|| eyre::eyre!("chain does not report a base fee"))?;
            let gp = p.get_gas_price().await.context("get gas price")?;
            Ok(compute_eip1559_fees(base_fee, gp))
        })
        .await
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        self.with_fallback("get gas price", |p| async move {
            p.get_gas_price().await.context("get gas price")
        })
        .await
    }

    async fn estimate_gas(&self, from: Address, tx: &EvmTransaction) -> eyre::Result<u64> {
        let req = to_request(from, tx);
        self.with_fallback("estimate gas", |p| {
            let req = req.clone();
            async move { p.estimate_gas(req).await.context("estimate gas") }
        })
        .await
    }

    async fn send_raw(&self, raw: &[u8]) -> eyre::Result<()> {
        let url = self
            .urls
            .first()
            .ok_or_else(|| eyre::eyre!("no rpc endpoints configured"))?;
        let p = Self::provider_for_url(url)?;
        match p.send_raw_transaction(raw).await {
            Ok(_pending) => Ok(()),
            Err(e) => {
                let ae: eyre::Report = e.into();
                if broadcast_err_is_ok(&ae) {
                    Ok(())
                } else {
                    Err(ae).context("broadcast raw tx")
                }
            }
        }
    }

    async fn receipt(&self, hash: B256) -> eyre::Result<Option<TxReceipt>> {
        self.with_fallback("get tx receipt", |p| async move {
            let r = p
                .get_transaction_receipt(hash)
                .await
                .context("get transaction receipt")?;
            Ok(r.as_ref().map(receipt_from_alloy))
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        let req = TransactionRequest::default().with_to(to).with_input(data);
        self.with_fallback("eth_call", |p| {
            let req = req.clone();
            async move { p.call(req).await.context("eth_call") }
        })
        .await
    }
}
