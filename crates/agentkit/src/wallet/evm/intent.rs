use super::{
    native_transfer_tx, settled_receipt, settled_tx_hash, sign_hash_with, sign_message_with,
    sign_typed_data_with, signature_hex, EvmContext, EvmTransaction,
    EvmWalletProvider,
};
use crate::errors::{WalletError, WalletResult};
use crate::network::NetworkIdentity;
use crate::remote::intent::{IntentApi, IntentRequest};
use crate::retry::{poll_confirmation, Polled};
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::WalletProvider;
use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NAME: &str = "intent_wallet";

/// Account whose sends are settled by a cross-chain intent relayer.
pub struct IntentEvmWallet {
    api: Arc<dyn IntentApi>,
    owner: PrivateKeySigner,
    address: Address,
    ctx: EvmContext,
}

impl std::fmt::Debug for IntentEvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentEvmWallet")
            .field("address", &self.address)
            .field("owner", &self.owner.address())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl IntentEvmWallet {
    pub async fn connect(
        api: Arc<dyn IntentApi>,
        owner: PrivateKeySigner,
        ctx: EvmContext,
    ) -> WalletResult<Self> {
        let address = api
            .account_address(owner.address(), ctx.chain_id())
            .await
            .map_err(WalletError::rpc)?;
        tracing::info!(address = %address, network = %ctx.network(), "intent account ready");
        Ok(Self {
            api,
            owner,
            address,
            ctx,
        })
    }

    /// Balance of `tokens` aggregated across every chain the relayer can source from.
    pub async fn chain_abstracted_balance(&self, tokens: &[String]) -> WalletResult<Value> {
        self.api
            .chain_abstracted_balance(self.address, tokens, &[self.ctx.chain_id()])
            .await
            .map_err(WalletError::rpc)
    }

    async fn execute(&self, req: IntentRequest) -> WalletResult<String> {
        let mut lc = Lifecycle::new(NAME);
        let prepared = self
            .api
            .prepare_intent(&req)
            .await
            .map_err(WalletError::submission)?;
        let signature = signature_hex(&sign_hash_with(&self.owner, &prepared.intent_hash)?);
        lc.signed()?;

        let ui_hash = self
            .api
            .send_intent(&prepared.intent, &signature)
            .await
            .map_err(WalletError::submission)?;
        let ui_id = format!("{ui_hash:#x}");
        lc.submitted(&ui_id)?;

        let api = &self.api;
        let confirm = self.ctx.confirmation();
        let polled = poll_confirmation(&ui_id, confirm.timeout(), confirm.poll_interval(), || {
            api.execution_receipt(ui_hash)
        })
        .await;
        let receipt = match polled {
            Polled::Ready(r) if r.success => settled_receipt(NAME, true, r.tx_hash),
            Polled::Ready(r) => TxReceipt::failed(r.tx_hash.unwrap_or(ui_id), None),
            Polled::TimedOut(waited) => return Err(WalletError::confirmation_timeout(&ui_id, waited)),
        };
        Ok(lc.finish(receipt)?.id)
    }
}

#[async_trait]
impl WalletProvider for IntentEvmWallet {
    fn address(&self) -> String {
        self.address.to_checksum(None)
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
impl EvmWalletProvider for IntentEvmWallet {
    fn evm_address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &[u8]) -> WalletResult<String> {
        sign_message_with(&self.owner, message)
    }

    async fn sign_typed_data(&self, typed_data: &Value) -> WalletResult<String> {
        sign_typed_data_with(&self.owner, typed_data)
    }

    async fn sign_transaction(&self, _tx: EvmTransaction) -> WalletResult<String> {
        Err(WalletError::unsupported(NAME, "sign_transaction"))
    }

    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        let req = IntentRequest::for_transaction(self.address, self.ctx.chain_id(), &tx);
        self.execute(req).await
    }

    async fn wait_for_transaction_receipt(&self, id: &str) -> WalletResult<TxReceipt> {
        self.ctx.wait_for_receipt(settled_tx_hash(NAME, id)?).await
    }

    async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes> {
        self.ctx.read_contract(to, calldata).await
    }
}
