use super::{
    native_transfer_tx, parse_address, parse_tx_hash, EvmContext, EvmTransaction,
    EvmWalletProvider, UnsignedEvmTx,
};
use crate::errors::{WalletError, WalletResult};
use crate::network::{NetworkIdentity, ProtocolFamily};
use crate::remote::custodial::CustodialApi;
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::WalletProvider;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NAME: &str = "custodial_evm";

/// Attach to `address`, or create an account under an idempotency key (random when unset).
pub(crate) async fn resolve_account(
    api: &dyn CustodialApi,
    family: ProtocolFamily,
    address: Option<&str>,
    idempotency_key: Option<&str>,
) -> WalletResult<String> {
    let account = match address.map(str::trim).filter(|a| !a.is_empty()) {
        Some(a) => api.get_account(family, a).await,
        None => {
            let key = idempotency_key
                .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned);
            tracing::info!(%family, "creating custodial account");
            api.create_account(family, &key).await
        }
    }
    .map_err(WalletError::rpc)?;
    Ok(account.address)
}

/// Keys held by a remote custody service; transactions are signed there and broadcast here.
pub struct CustodialEvmWallet {
    api: Arc<dyn CustodialApi>,
    address: Address,
    ctx: EvmContext,
}

impl std::fmt::Debug for CustodialEvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialEvmWallet")
            .field("address", &self.address)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl CustodialEvmWallet {
    pub async fn connect(
        api: Arc<dyn CustodialApi>,
        address: Option<&str>,
        idempotency_key: Option<&str>,
        ctx: EvmContext,
    ) -> WalletResult<Self> {
        let addr = resolve_account(api.as_ref(), ProtocolFamily::Evm, address, idempotency_key)
            .await?;
        let address = parse_address(&addr)?;
        tracing::info!(address = %address, network = %ctx.network(), "custodial evm account ready");
        Ok(Self { api, address, ctx })
    }

    fn account(&self) -> String {
        self.address.to_checksum(None)
    }

    /// Remote signature over the unsigned payload; nothing is broadcast.
    async fn sign_prepared(&self, tx: &EvmTransaction) -> WalletResult<Vec<u8>> {
        let unsigned = UnsignedEvmTx::from_prepared(tx)?;
        self.api
            .sign_evm_transaction(&self.account(), &unsigned.encoded_for_signing())
            .await
            .map_err(WalletError::signing)
    }
}

#[async_trait]
impl WalletProvider for CustodialEvmWallet {
    fn address(&self) -> String {
        self.account()
    }

    fn network(&self) -> &NetworkIdentity {
        self.ctx.network()
    }

    fn name(&self) -> &'static str {
        NAME
    }

    async fn balance(&self) -> WalletResult<U256> {
        self.ctx.balance(self.address).await
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        self.send_transaction(native_transfer_tx(to, amount)?).await
    }
}

#[async_trait]
impl EvmWalletProvider for CustodialEvmWallet {
    fn evm_address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> WalletResult<String> {
        self.api
            .sign_evm_message(&self.account(), message)
            .await
            .map_err(WalletError::signing)
    }

    async fn sign_typed_data(&self, typed_data: &Value) -> WalletResult<String> {
        self.api
            .sign_evm_typed_data(&self.account(), typed_data)
            .await
            .map_err(WalletError::signing)
    }

    async fn sign_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        let prepared = self.ctx.prepare(self.address, tx, NAME).await?;
        let raw = self.sign_prepared(&prepared).await?;
        Ok(format!("0x{}", hex::encode(raw)))
    }

    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        let mut lc = Lifecycle::new(NAME);
        let prepared = self.ctx.prepare(self.address, tx, NAME).await?;
        let raw = self.sign_prepared(&prepared).await?;
        lc.signed()?;
        let receipt = self.ctx.submit_signed(&mut lc, &raw).await?;
        Ok(receipt.id)
    }

    async fn wait_for_transaction_receipt(&self, id: &str) -> WalletResult<TxReceipt> {
        self.ctx.wait_for_receipt(parse_tx_hash(id)?).await
    }

    async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes> {
        self.ctx.read_contract(to, calldata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{evm_context, MockCustodialApi, MockEvmRpc};

    async fn wallet(
        api: &Arc<MockCustodialApi>,
        rpc: &Arc<MockEvmRpc>,
    ) -> eyre::Result<CustodialEvmWallet> {
        let ctx = evm_context(rpc).await?;
        Ok(CustodialEvmWallet::connect(Arc::clone(api) as _, None, Some("idem-1"), ctx).await?)
    }

    #[tokio::test]
    async fn creates_an_account_with_the_idempotency_key() -> eyre::Result<()> {
        let api = Arc::new(MockCustodialApi::new());
        let rpc = Arc::new(MockEvmRpc::new(84_532));
        let w = wallet(&api, &rpc).await?;
        assert_eq!(api.idempotency_keys(), vec!["idem-1".to_owned()]);
        assert_eq!(w.evm_address(), api.evm_address());
        Ok(())
    }

    #[tokio::test]
    async fn attaches_to_an_existing_account_without_creating() -> eyre::Result<()> {
        let api = Arc::new(MockCustodialApi::new());
        let rpc = Arc::new(MockEvmRpc::new(84_532));
        let existing = format!("{:#x}", api.evm_address());
        let ctx = evm_context(&rpc).await?;
        CustodialEvmWallet::connect(Arc::clone(&api) as _, Some(&existing), None, ctx).await?;
        assert!(api.idempotency_keys().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn signer_receives_the_exact_unsigned_payload() -> eyre::Result<()> {
        let api = Arc::new(MockCustodialApi::new());
        let rpc = Arc::new(MockEvmRpc::new(84_532));
        let w = wallet(&api, &rpc).await?;
        let tx = EvmTransaction {
            nonce: Some(7),
            gas_limit: Some(30_000),
            max_fee_per_gas: Some(100),
            max_priority_fee_per_gas: Some(2),
            ..EvmTransaction::native(Address::repeat_byte(5), U256::from(9_u64))
        };
        let expected = UnsignedEvmTx::from_prepared(&EvmTransaction {
            chain_id: Some(84_532),
            ..tx.clone()
        })?
        .encoded_for_signing();
        let id = w.send_transaction(tx).await?;
        assert_eq!(api.signed_evm_payloads(), vec![expected]);
        let sent = rpc.sent();
        let raw = sent.first().ok_or_else(|| eyre::eyre!("nothing broadcast"))?;
        assert_eq!(id, format!("{:#x}", alloy::primitives::keccak256(raw)));
        Ok(())
    }

    #[tokio::test]
    async fn signing_refusal_means_nothing_is_broadcast() -> eyre::Result<()> {
        let api = Arc::new(MockCustodialApi::new().refusing_to_sign());
        let rpc = Arc::new(MockEvmRpc::new(84_532));
        let w = wallet(&api, &rpc).await?;
        let res = w.native_transfer(&format!("{:#x}", Address::repeat_byte(5)), "10").await;
        assert!(matches!(res, Err(WalletError::Signing(_))));
        assert!(rpc.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn message_signing_is_delegated() -> eyre::Result<()> {
        let api = Arc::new(MockCustodialApi::new());
        let rpc = Arc::new(MockEvmRpc::new(84_532));
        let w = wallet(&api, &rpc).await?;
        let sig = w.sign_message(b"hi").await?;
        assert!(sig.starts_with("0x"));
        Ok(())
    }
}
