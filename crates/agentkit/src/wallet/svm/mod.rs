//! Instruction-based chain family: versioned transactions signed into fixed signer slots,
//! confirmed by signature status.

pub mod custodial;
pub mod local;

use crate::amount::parse_base_units;
use crate::chains::solana::{with_compute_budget, SignatureStatus, SolanaRpc, SvmRpc, FEE_RESERVE_LAMPORTS};
use crate::config::{AgentKitConfig, ConfirmationConfig, SolanaConfig, WalletConfig};
use crate::errors::{WalletError, WalletResult};
use crate::network::{ChainConfig, NetworkIdentity, ProtocolFamily};
use crate::remote::custodial::HttpCustodialApi;
use crate::retry::{poll_confirmation, Polled};
use crate::wallet::keys;
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::WalletProvider;
use alloy::primitives::U256;
use async_trait::async_trait;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_system_interface::instruction as system_instruction;
use std::sync::Arc;

pub use custodial::CustodialSvmWallet;
pub use local::LocalSvmWallet;

/// Instruction-based refinement of [`WalletProvider`].
#[async_trait]
pub trait SvmWalletProvider: WalletProvider {
    fn public_key(&self) -> Pubkey;

    /// The cluster connection, for callers building their own instructions.
    fn rpc(&self) -> Arc<dyn SvmRpc>;

    /// Fill this wallet's signer slot. Other slots are left as they are.
    async fn sign_transaction(&self, tx: VersionedTransaction) -> WalletResult<VersionedTransaction>;

    /// Broadcast a fully signed transaction once and wait for `confirmed`. Returns the signature.
    async fn send_transaction(&self, tx: &VersionedTransaction) -> WalletResult<String>;

    async fn sign_and_send_transaction(&self, tx: VersionedTransaction) -> WalletResult<String> {
        let signed = self.sign_transaction(tx).await?;
        self.send_transaction(&signed).await
    }

    async fn get_signature_status(&self, signature: &str) -> WalletResult<Option<SignatureStatus>>;

    async fn wait_for_signature_result(&self, signature: &str) -> WalletResult<TxReceipt>;
}

pub fn parse_pubkey(s: &str) -> WalletResult<Pubkey> {
    s.trim()
        .parse::<Pubkey>()
        .map_err(|e| WalletError::InvalidInput(format!("invalid solana address {s:?}: {e}")))
}

pub fn parse_signature(s: &str) -> WalletResult<Signature> {
    s.trim()
        .parse::<Signature>()
        .map_err(|e| WalletError::InvalidInput(format!("invalid signature {s:?}: {e}")))
}

fn parse_lamports(amount: &str) -> WalletResult<u64> {
    let v = parse_base_units(amount)?;
    u64::try_from(v)
        .ok()
        .ok_or_else(|| WalletError::InvalidInput(format!("{amount} lamports does not fit in u64")))
}

/// Put `sig` into the slot `signer` occupies among the message's required signers.
pub(crate) fn place_signature(
    tx: &mut VersionedTransaction,
    signer: &Pubkey,
    sig: Signature,
) -> WalletResult<()> {
    let required = usize::from(tx.message.header().num_required_signatures);
    let idx = tx
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|k| k == signer)
        .ok_or_else(|| {
            WalletError::InvalidInput(format!("{signer} is not a required signer of this transaction"))
        })?;
    if tx.signatures.len() < required {
        tx.signatures.resize(required, Signature::default());
    }
    let slot = tx
        .signatures
        .get_mut(idx)
        .ok_or_else(|| WalletError::InvalidState("signer slot out of range".into()))?;
    *slot = sig;
    Ok(())
}

fn is_fully_signed(tx: &VersionedTransaction) -> bool {
    let required = usize::from(tx.message.header().num_required_signatures);
    tx.signatures.len() >= required
        && tx
            .signatures
            .iter()
            .take(required)
            .all(|s| *s != Signature::default())
}

/// Cluster handle shared by the SVM backends: verified genesis, client, compute budget and the
/// confirmation policy.
pub struct SvmContext {
    chain: &'static ChainConfig,
    network: NetworkIdentity,
    rpc: Arc<dyn SvmRpc>,
    solana: SolanaConfig,
    confirmation: ConfirmationConfig,
}

impl std::fmt::Debug for SvmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvmContext")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl SvmContext {
    /// Fails unless the cluster's genesis hash is the chain id the table lists for `chain`.
    pub async fn connect(
        chain: &'static ChainConfig,
        rpc: Arc<dyn SvmRpc>,
        solana: SolanaConfig,
        confirmation: ConfirmationConfig,
    ) -> WalletResult<Self> {
        if chain.family != ProtocolFamily::Svm {
            return Err(WalletError::UnsupportedNetwork(chain.network_id.to_owned()));
        }
        let genesis = rpc.genesis_hash().await.map_err(WalletError::rpc)?.to_string();
        if genesis != chain.chain_id {
            return Err(WalletError::Configuration(format!(
                "rpc endpoint reports genesis {genesis}, expected {} for {}",
                chain.chain_id, chain.network_id
            )));
        }
        Ok(Self {
            chain,
            network: chain.identity(),
            rpc,
            solana,
            confirmation,
        })
    }

    pub fn default_rpc(cfg: &AgentKitConfig, chain: &ChainConfig) -> WalletResult<Arc<dyn SvmRpc>> {
        let rpc = SolanaRpc::new(cfg.rpc_urls(chain)).map_err(WalletError::configuration)?;
        Ok(Arc::new(rpc))
    }

    pub const fn chain(&self) -> &'static ChainConfig {
        self.chain
    }

    pub const fn network(&self) -> &NetworkIdentity {
        &self.network
    }

    pub fn rpc(&self) -> Arc<dyn SvmRpc> {
        Arc::clone(&self.rpc)
    }

    pub async fn balance(&self, owner: &Pubkey) -> WalletResult<U256> {
        let lamports = self.rpc.balance(owner).await.map_err(WalletError::rpc)?;
        Ok(U256::from(lamports))
    }

    /// Unsigned system transfer with the configured compute budget, after checking that
    /// `from` can cover the amount plus the fee reserve.
    pub async fn transfer_transaction(
        &self,
        from: &Pubkey,
        to: &str,
        amount: &str,
    ) -> WalletResult<VersionedTransaction> {
        let to = parse_pubkey(to)?;
        let lamports = parse_lamports(amount)?;
        let have = self.rpc.balance(from).await.map_err(WalletError::rpc)?;
        let need = lamports.saturating_add(FEE_RESERVE_LAMPORTS);
        if have < need {
            return Err(WalletError::InsufficientFunds {
                have: have.to_string(),
                need: need.to_string(),
            });
        }
        let ixs = with_compute_budget(
            self.solana.compute_unit_limit,
            self.solana.compute_unit_price_micro_lamports,
            vec![system_instruction::transfer(from, &to, lamports)],
        );
        let blockhash = self.rpc.latest_blockhash().await.map_err(WalletError::rpc)?;
        let message = VersionedMessage::Legacy(Message::new_with_blockhash(&ixs, Some(from), &blockhash));
        let required = usize::from(message.header().num_required_signatures);
        Ok(VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message,
        })
    }

    /// Broadcast once; a rejected broadcast is reported, never replayed.
    pub async fn send(
        &self,
        tx: &VersionedTransaction,
        backend: &'static str,
    ) -> WalletResult<String> {
        if !is_fully_signed(tx) {
            return Err(WalletError::InvalidInput(
                "transaction is missing required signatures".into(),
            ));
        }
        let mut lc = Lifecycle::new(backend);
        lc.signed()?;
        let sig = self
            .rpc
            .send_transaction(tx)
            .await
            .map_err(WalletError::submission)?;
        let id = sig.to_string();
        lc.submitted(&id)?;
        let receipt = self.wait_for_signature(&sig).await?;
        Ok(lc.finish(receipt)?.id)
    }

    pub async fn signature_status(&self, sig: &Signature) -> WalletResult<Option<SignatureStatus>> {
        self.rpc.signature_status(sig).await.map_err(WalletError::rpc)
    }

    /// Wait until the signature reaches `confirmed` or lands with an error.
    pub async fn wait_for_signature(&self, sig: &Signature) -> WalletResult<TxReceipt> {
        let rpc = &self.rpc;
        let id = sig.to_string();
        let polled = poll_confirmation(
            &id,
            self.confirmation.timeout(),
            self.confirmation.poll_interval(),
            || async move {
                let status = rpc.signature_status(sig).await?;
                Ok::<_, eyre::Report>(status.filter(|s| s.confirmed || s.err.is_some()))
            },
        )
        .await;
        match polled {
            Polled::Ready(s) if s.err.is_some() => {
                tracing::warn!(signature = %sig, slot = s.slot, error = ?s.err, "transaction failed");
                Ok(TxReceipt::failed(sig.to_string(), Some(s.slot)))
            }
            Polled::Ready(s) => Ok(TxReceipt::confirmed(sig.to_string(), Some(s.slot))),
            Polled::TimedOut(waited) => Err(WalletError::confirmation_timeout(&sig.to_string(), waited)),
        }
    }
}

/// The SVM backend chosen by configuration.
#[derive(Debug)]
pub enum SvmWallet {
    Local(LocalSvmWallet),
    Custodial(CustodialSvmWallet),
}

macro_rules! dispatch {
    ($self:ident, $w:ident => $body:expr) => {
        match $self {
            SvmWallet::Local($w) => $body,
            SvmWallet::Custodial($w) => $body,
        }
    };
}

impl SvmWallet {
    pub async fn from_config(
        cfg: &AgentKitConfig,
        chain: &'static ChainConfig,
    ) -> WalletResult<Self> {
        match &cfg.wallet {
            WalletConfig::Unconfigured => Err(WalletError::Configuration(
                "no wallet backend configured".into(),
            )),
            WalletConfig::Local(k) => {
                let keypair = keys::solana_keypair(k)?;
                let ctx = Self::context(cfg, chain).await?;
                Ok(Self::Local(LocalSvmWallet::new(keypair, ctx)))
            }
            WalletConfig::Custodial(c) => {
                let api = Arc::new(HttpCustodialApi::from_config(c)?);
                let ctx = Self::context(cfg, chain).await?;
                let w = CustodialSvmWallet::connect(
                    api,
                    c.address.as_deref(),
                    c.idempotency_key.as_deref(),
                    ctx,
                )
                .await?;
                Ok(Self::Custodial(w))
            }
            WalletConfig::Smart(_) | WalletConfig::Intent(_) => Err(WalletError::UnsupportedNetwork(
                format!(
                    "{} backend only runs on evm networks, not {}",
                    cfg.wallet.backend_name(),
                    chain.network_id
                ),
            )),
        }
    }

    async fn context(cfg: &AgentKitConfig, chain: &'static ChainConfig) -> WalletResult<SvmContext> {
        SvmContext::connect(chain, SvmContext::default_rpc(cfg, chain)?, cfg.solana, cfg.confirmation)
            .await
    }
}

#[async_trait]
impl WalletProvider for SvmWallet {
    fn address(&self) -> String {
        dispatch!(self, w => w.address())
    }

    fn network(&self) -> &NetworkIdentity {
        dispatch!(self, w => w.network())
    }

    fn name(&self) -> &'static str {
        dispatch!(self, w => w.name())
    }

    async fn balance(&self) -> WalletResult<U256> {
        dispatch!(self, w => w.balance().await)
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        dispatch!(self, w => w.native_transfer(to, amount).await)
    }
}

#[async_trait]
impl SvmWalletProvider for SvmWallet {
    fn public_key(&self) -> Pubkey {
        dispatch!(self, w => w.public_key())
    }

    fn rpc(&self) -> Arc<dyn SvmRpc> {
        dispatch!(self, w => SvmWalletProvider::rpc(w))
    }

    async fn sign_transaction(&self, tx: VersionedTransaction) -> WalletResult<VersionedTransaction> {
        dispatch!(self, w => w.sign_transaction(tx).await)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> WalletResult<String> {
        dispatch!(self, w => w.send_transaction(tx).await)
    }

    async fn get_signature_status(&self, signature: &str) -> WalletResult<Option<SignatureStatus>> {
        dispatch!(self, w => w.get_signature_status(signature).await)
    }

    async fn wait_for_signature_result(&self, signature: &str) -> WalletResult<TxReceipt> {
        dispatch!(self, w => w.wait_for_signature_result(signature).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{svm_context, MockSvmRpc};
    use solana_keypair::Keypair;
    use solana_signer::Signer as _;

    #[tokio::test]
    async fn genesis_mismatch_is_a_configuration_error() -> eyre::Result<()> {
        let rpc = Arc::new(MockSvmRpc::new().with_genesis(solana_sdk::hash::Hash::new_unique()));
        let chain = crate::network::chain_by_network_id("solana-devnet")?;
        let res = SvmContext::connect(
            chain,
            rpc,
            SolanaConfig::default(),
            ConfirmationConfig::default(),
        )
        .await;
        assert!(matches!(res, Err(WalletError::Configuration(_))));
        Ok(())
    }

    #[tokio::test]
    async fn transfer_checks_balance_against_the_fee_reserve() -> eyre::Result<()> {
        let rpc = Arc::new(MockSvmRpc::new().with_balance(1_000));
        let ctx = svm_context(&rpc).await?;
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique().to_string();
        match ctx.transfer_transaction(&from, &to, "1000").await {
            Err(WalletError::InsufficientFunds { have, need }) => {
                assert_eq!(have, "1000");
                assert_eq!(need, "6000");
            }
            other => eyre::bail!("unexpected: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn transfer_carries_the_compute_budget_and_empty_slots() -> eyre::Result<()> {
        let rpc = Arc::new(MockSvmRpc::new());
        let ctx = svm_context(&rpc).await?;
        let from = Pubkey::new_unique();
        let tx = ctx
            .transfer_transaction(&from, &Pubkey::new_unique().to_string(), "10")
            .await?;
        assert_eq!(tx.signatures, vec![Signature::default()]);
        assert_eq!(tx.message.instructions().len(), 3);
        assert_eq!(tx.message.static_account_keys().first(), Some(&from));
        Ok(())
    }

    #[tokio::test]
    async fn unsigned_transactions_are_not_broadcast() -> eyre::Result<()> {
        let rpc = Arc::new(MockSvmRpc::new());
        let ctx = svm_context(&rpc).await?;
        let from = Pubkey::new_unique();
        let tx = ctx
            .transfer_transaction(&from, &Pubkey::new_unique().to_string(), "10")
            .await?;
        assert!(matches!(
            ctx.send(&tx, "test").await,
            Err(WalletError::InvalidInput(_))
        ));
        assert!(rpc.sent().is_empty());
        Ok(())
    }

    #[test]
    fn signature_lands_in_the_signers_slot() -> eyre::Result<()> {
        let payer = Keypair::new();
        let cosigner = Keypair::new();
        let ix = system_instruction::transfer(&cosigner.pubkey(), &Pubkey::new_unique(), 1);
        let message = VersionedMessage::Legacy(Message::new_with_blockhash(
            &[ix],
            Some(&payer.pubkey()),
            &solana_sdk::hash::Hash::new_unique(),
        ));
        let mut tx = VersionedTransaction {
            signatures: vec![],
            message,
        };
        let sig = cosigner.sign_message(&tx.message.serialize());
        place_signature(&mut tx, &cosigner.pubkey(), sig)?;
        assert_eq!(tx.signatures.len(), 2);
        assert_eq!(tx.signatures.get(1), Some(&sig));
        assert_eq!(tx.signatures.first(), Some(&Signature::default()));
        assert!(place_signature(&mut tx, &Pubkey::new_unique(), sig).is_err());
        Ok(())
    }
}
