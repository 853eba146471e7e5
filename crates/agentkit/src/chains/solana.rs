use crate::retry::{try_all_with_backoff, BackoffConfig};
use async_trait::async_trait;
use eyre::Context as _;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::time::Duration;

/// Lamports reserved for the base fee when checking a transfer against the balance.
pub const FEE_RESERVE_LAMPORTS: u64 = 5_000;

const fn compute_budget_program_id() -> Pubkey {
    // Base58("ComputeBudget111111111111111111111111111111")
    Pubkey::new_from_array([
        3, 6, 70, 111, 229, 33, 23, 50, 255, 236, 173, 186, 114, 195, 155, 231, 188, 140, 229, 187,
        197, 247, 18, 107, 44, 67, 155, 58, 64, 0, 0, 0,
    ])
}

fn set_compute_unit_limit(units: u32) -> Instruction {
    let mut data = Vec::with_capacity(1 + 4);
    data.push(2);
    data.extend_from_slice(&units.to_le_bytes());
    Instruction {
        program_id: compute_budget_program_id(),
        accounts: vec![],
        data,
    }
}

fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(1 + 8);
    data.push(3);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: compute_budget_program_id(),
        accounts: vec![],
        data,
    }
}

/// Prefix compute-budget instructions unless the caller already supplied some.
pub fn with_compute_budget(
    limit: Option<u32>,
    price_micro_lamports: Option<u64>,
    mut instructions: Vec<Instruction>,
) -> Vec<Instruction> {
    if instructions
        .iter()
        .any(|ix| ix.program_id == compute_budget_program_id())
    {
        return instructions;
    }
    let mut prefix: Vec<Instruction> = vec![];
    if let Some(l) = limit.filter(|l| *l > 0) {
        prefix.push(set_compute_unit_limit(l));
    }
    if let Some(p) = price_micro_lamports.filter(|p| *p > 0) {
        prefix.push(set_compute_unit_price(p));
    }
    prefix.append(&mut instructions);
    prefix
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    /// Reached `confirmed` commitment or better.
    pub confirmed: bool,
    pub err: Option<String>,
}

/// Everything the instruction-based backends need from a cluster.
#[async_trait]
pub trait SvmRpc: Send + Sync {
    async fn genesis_hash(&self) -> eyre::Result<Hash>;
    async fn latest_blockhash(&self) -> eyre::Result<Hash>;
    async fn balance(&self, owner: &Pubkey) -> eyre::Result<u64>;
    async fn send_transaction(&self, tx: &VersionedTransaction) -> eyre::Result<Signature>;
    async fn signature_status(&self, sig: &Signature) -> eyre::Result<Option<SignatureStatus>>;
}

#[derive(Debug, Clone)]
pub struct SolanaRpc {
    urls: Vec<String>,
    backoff: BackoffConfig,
}

impl SolanaRpc {
    pub fn new(urls: Vec<String>) -> eyre::Result<Self> {
        if urls.is_empty() {
            eyre::bail!("no rpc endpoints configured");
        }
        Ok(Self {
            urls,
            backoff: BackoffConfig::default(),
        })
    }

    fn rpc_for_url(url: &str) -> RpcClient {
        RpcClient::new_with_timeout_and_commitment(
            url.to_owned(),
            Duration::from_secs(20),
            CommitmentConfig::confirmed(),
        )
    }

    /// Client for the primary endpoint, for callers that need the raw connection.
    pub fn client(&self) -> Option<RpcClient> {
        self.urls.first().map(|u| Self::rpc_for_url(u))
    }

    async fn with_fallback<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(RpcClient) -> Fut + Sync,
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
                async move { f(Self::rpc_for_url(&u)).await }
            },
            context_label,
        )
        .await
    }
}

#[async_trait]
impl SvmRpc for SolanaRpc {
    async fn genesis_hash(&self) -> eyre::Result<Hash> {
        self.with_fallback("get genesis hash", |rpc| async move {
            rpc.get_genesis_hash().await.context("get genesis hash")
        })
        .await
    }

    async fn latest_blockhash(&self) -> eyre::Result<Hash> {
        self.with_fallback("latest blockhash", |rpc| async move {
            rpc.get_latest_blockhash()
                .await
                .context("latest blockhash")
        })
        .await
    }

    async fn balance(&self, owner: &Pubkey) -> eyre::Result<u64> {
        let k = *owner;
        self.with_fallback("get balance", |rpc| async move {
            rpc.get_balance(&k).await.context("get balance")
        })
        .await
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> eyre::Result<Signature> {
        let url = self
            .urls
            .first()
            .ok_or_else(|| eyre::eyre!("no rpc endpoints configured"))?;
        Self::rpc_for_url(url)
            .send_transaction(tx)
            .await
            .context("send tx")
    }

    async fn signature_status(&self, sig: &Signature) -> eyre::Result<Option<SignatureStatus>> {
        let s = *sig;
        self.with_fallback("get signature status", |rpc| async move {
            let resp = rpc
                .get_signature_statuses(&[s])
                .await
                .context("get signature statuses")?;
            Ok(resp.value.into_iter().next().flatten().map(|st| {
                SignatureStatus {
                    slot: st.slot,
                    confirmed: st.satisfies_commitment(CommitmentConfig::confirmed()),
                    err: st.err.map(|e| e.to_string()),
                }
            }))
        })
        .await
    }
}
