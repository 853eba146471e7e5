use super::{parse_signature, place_signature, SvmContext, SvmWalletProvider};
use crate::chains::solana::{SignatureStatus, SvmRpc};
use crate::errors::WalletResult;
use crate::network::NetworkIdentity;
use crate::wallet::lifecycle::TxReceipt;
use crate::wallet::WalletProvider;
use alloy::primitives::U256;
use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use solana_signer::Signer as _;
use std::sync::Arc;

const NAME: &str = "local_svm";

/// Keypair held in this process.
pub struct LocalSvmWallet {
    keypair: Keypair,
    ctx: SvmContext,
}

impl std::fmt::Debug for LocalSvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSvmWallet")
            .field("public_key", &self.keypair.pubkey())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl LocalSvmWallet {
    pub const fn new(keypair: Keypair, ctx: SvmContext) -> Self {
        Self { keypair, ctx }
    }
}

#[async_trait]
impl WalletProvider for LocalSvmWallet {
    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn network(&self) -> &NetworkIdentity {
        self.ctx.network()
    }

    fn name(&self) -> &'static str {
        NAME
    }

    async fn balance(&self) -> WalletResult<U256> {
        self.ctx.balance(&self.keypair.pubkey()).await
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        let tx = self
            .ctx
            .transfer_transaction(&self.keypair.pubkey(), to, amount)
            .await?;
        self.sign_and_send_transaction(tx).await
    }
}

#[async_trait]
impl SvmWalletProvider for LocalSvmWallet {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn rpc(&self) -> Arc<dyn SvmRpc> {
        self.ctx.rpc()
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> WalletResult<VersionedTransaction> {
        let sig = self.keypair.sign_message(&tx.message.serialize());
        place_signature(&mut tx, &self.keypair.pubkey(), sig)?;
        Ok(tx)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> WalletResult<String> {
        self.ctx.send(tx, NAME).await
    }

    async fn get_signature_status(&self, signature: &str) -> WalletResult<Option<SignatureStatus>> {
        self.ctx.signature_status(&parse_signature(signature)?).await
    }

    async fn wait_for_signature_result(&self, signature: &str) -> WalletResult<TxReceipt> {
        self.ctx.wait_for_signature(&parse_signature(signature)?).await
    }
}
