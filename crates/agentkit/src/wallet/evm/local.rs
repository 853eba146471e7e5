use super::{
    native_transfer_tx, parse_tx_hash, sign_hash_with, sign_message_with, sign_typed_data_with,
    EvmContext, EvmTransaction, EvmWalletProvider, UnsignedEvmTx,
};
use crate::errors::WalletResult;
use crate::network::NetworkIdentity;
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::WalletProvider;
use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;

const NAME: &str = "local_evm";

/// Externally owned account whose key lives in this process.
#[derive(Debug)]
pub struct LocalEvmWallet {
    signer: PrivateKeySigner,
    ctx: EvmContext,
}

impl LocalEvmWallet {
    pub const fn new(signer: PrivateKeySigner, ctx: EvmContext) -> Self {
        Self { signer, ctx }
    }

    fn sign_prepared(&self, tx: &EvmTransaction) -> WalletResult<Vec<u8>> {
        let unsigned = UnsignedEvmTx::from_prepared(tx)?;
        let sig = sign_hash_with(&self.signer, &unsigned.signature_hash())?;
        Ok(unsigned.into_raw(sig))
    }
}

#[async_trait]
impl WalletProvider for LocalEvmWallet {
    fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }

    fn network(&self) -> &NetworkIdentity {
        self.ctx.network()
    }

    fn name(&self) -> &'static str {
        NAME
    }

    async fn balance(&self) -> WalletResult<U256> {
        self.ctx.balance(self.signer.address()).await
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        self.send_transaction(native_transfer_tx(to, amount)?).await
    }
}

#[async_trait]
impl EvmWalletProvider for LocalEvmWallet {
    fn evm_address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_message(&self, message: &[u8]) -> WalletResult<String> {
        sign_message_with(&self.signer, message)
    }

    async fn sign_typed_data(&self, typed_data: &Value) -> WalletResult<String> {
        sign_typed_data_with(&self.signer, typed_data)
    }

    async fn sign_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        let prepared = self.ctx.prepare(self.signer.address(), tx, NAME).await?;
        let raw = self.sign_prepared(&prepared)?;
        Ok(format!("0x{}", hex::encode(raw)))
    }

    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        let mut lc = Lifecycle::new(NAME);
        let prepared = self.ctx.prepare(self.signer.address(), tx, NAME).await?;
        let raw = self.sign_prepared(&prepared)?;
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
