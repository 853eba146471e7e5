use super::{parse_pubkey, parse_signature, place_signature, SvmContext, SvmWalletProvider};
use crate::chains::solana::{SignatureStatus, SvmRpc};
use crate::errors::{WalletError, WalletResult};
use crate::network::{NetworkIdentity, ProtocolFamily};
use crate::remote::custodial::CustodialApi;
use crate::wallet::evm::custodial::resolve_account;
use crate::wallet::lifecycle::TxReceipt;
use crate::wallet::WalletProvider;
use alloy::primitives::U256;
use async_trait::async_trait;
use base64::Engine as _;
use bincode::Options as _;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;

const NAME: &str = "custodial_svm";

/// Upper bound on a signed transaction returned by the custody service.
const MAX_SIGNED_TX_BYTES: u64 = 64 * 1024;

/// Keys held by a remote custody service; it fills our signer slot and we broadcast.
pub struct CustodialSvmWallet {
    api: Arc<dyn CustodialApi>,
    public_key: Pubkey,
    ctx: SvmContext,
}

impl std::fmt::Debug for CustodialSvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialSvmWallet")
            .field("public_key", &self.public_key)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl CustodialSvmWallet {
    pub async fn connect(
        api: Arc<dyn CustodialApi>,
        address: Option<&str>,
        idempotency_key: Option<&str>,
        ctx: SvmContext,
    ) -> WalletResult<Self> {
        let addr =
            resolve_account(api.as_ref(), ProtocolFamily::Svm, address, idempotency_key).await?;
        let public_key = parse_pubkey(&addr)?;
        tracing::info!(address = %public_key, network = %ctx.network(), "custodial svm account ready");
        Ok(Self {
            api,
            public_key,
            ctx,
        })
    }

    /// Ask the service to sign, then keep only its signature for our slot. The returned
    /// transaction must carry the message we sent, unchanged.
    async fn remote_signature(
        &self,
        tx: &VersionedTransaction,
    ) -> WalletResult<solana_sdk::signature::Signature> {
        let bytes = bincode::serialize(tx).map_err(WalletError::signing)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let signed_b64 = self
            .api
            .sign_solana_transaction(&self.public_key.to_string(), &encoded)
            .await
            .map_err(WalletError::signing)?;
        let signed_bytes = base64::engine::general_purpose::STANDARD
            .decode(signed_b64.trim())
            .map_err(|e| WalletError::Signing(format!("signed transaction is not base64: {e}")))?;
        let signed: VersionedTransaction = bincode::DefaultOptions::new()
            .with_limit(MAX_SIGNED_TX_BYTES)
            .deserialize(&signed_bytes)
            .map_err(|e| WalletError::Signing(format!("decode signed transaction: {e}")))?;
        if signed.message != tx.message {
            return Err(WalletError::Signing(
                "custody service changed the transaction message".into(),
            ));
        }

        let message = tx.message.serialize();
        let required = usize::from(tx.message.header().num_required_signatures);
        let idx = tx
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|k| *k == self.public_key)
            .ok_or_else(|| {
                WalletError::InvalidInput(format!(
                    "{} is not a required signer of this transaction",
                    self.public_key
                ))
            })?;
        let sig = *signed
            .signatures
            .get(idx)
            .ok_or_else(|| WalletError::Signing("custody service left our slot empty".into()))?;
        if !sig.verify(self.public_key.as_ref(), &message) {
            return Err(WalletError::Signing(
                "custody service returned an invalid signature".into(),
            ));
        }
        Ok(sig)
    }
}

#[async_trait]
impl WalletProvider for CustodialSvmWallet {
    fn address(&self) -> String {
        self.public_key.to_string()
    }

    fn network(&self) -> &NetworkIdentity {
        self.ctx.network()
    }

    fn name(&self) -> &'static str {
        NAME
    }

    async fn balance(&self) -> WalletResult<U256> {
        self.ctx.balance(&self.public_key).await
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        let tx = self
            .ctx
            .transfer_transaction(&self.public_key, to, amount)
            .await?;
        self.sign_and_send_transaction(tx).await
    }
}

#[async_trait]
impl SvmWalletProvider for CustodialSvmWallet {
    fn public_key(&self) -> Pubkey {
        self.public_key
    }

    fn rpc(&self) -> Arc<dyn SvmRpc> {
        self.ctx.rpc()
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> WalletResult<VersionedTransaction> {
        let sig = self.remote_signature(&tx).await?;
        place_signature(&mut tx, &self.public_key, sig)?;
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
