use super::custodial::resolve_account;
use super::{
    native_transfer_tx, parse_address, settled_receipt, settled_tx_hash, sign_hash_with,
    signature_hex, Call, EvmContext, EvmTransaction, EvmWalletProvider,
};
use crate::errors::{WalletError, WalletResult};
use crate::network::{NetworkIdentity, ProtocolFamily};
use crate::remote::custodial::CustodialApi;
use crate::remote::smart_account::{SmartAccountApi, UserOperationStatus};
use crate::retry::{poll_confirmation, Polled};
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::WalletProvider;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NAME: &str = "smart_wallet";

/// Signs user-operation hashes on behalf of the smart account (its validator key).
pub enum SmartOwner {
    Local(PrivateKeySigner),
    Custodial {
        api: Arc<dyn CustodialApi>,
        address: Address,
    },
}

impl std::fmt::Debug for SmartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(s) => f.debug_tuple("Local").field(&s.address()).finish(),
            Self::Custodial { address, .. } => f.debug_tuple("Custodial").field(address).finish(),
        }
    }
}

impl SmartOwner {
    /// Owner held by the custody service, attached or created like a custodial wallet.
    pub async fn custodial(
        api: Arc<dyn CustodialApi>,
        address: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> WalletResult<Self> {
        let addr =
            resolve_account(api.as_ref(), ProtocolFamily::Evm, address, idempotency_key).await?;
        Ok(Self::Custodial {
            address: parse_address(&addr)?,
            api,
        })
    }

    pub fn address(&self) -> Address {
        match self {
            Self::Local(s) => s.address(),
            Self::Custodial { address, .. } => *address,
        }
    }

    async fn sign_hash(&self, hash: B256) -> WalletResult<String> {
        match self {
            Self::Local(s) => Ok(signature_hex(&sign_hash_with(s, &hash)?)),
            Self::Custodial { api, address } => api
                .sign_evm_hash(&address.to_checksum(None), hash)
                .await
                .map_err(WalletError::signing),
        }
    }
}

/// Smart-contract account. Every send is a user operation, optionally sponsored by a paymaster.
pub struct SmartEvmWallet {
    api: Arc<dyn SmartAccountApi>,
    owner: SmartOwner,
    address: Address,
    paymaster_url: Option<String>,
    ctx: EvmContext,
}

impl std::fmt::Debug for SmartEvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartEvmWallet")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("paymaster", &self.paymaster_url.is_some())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl SmartEvmWallet {
    pub async fn connect(
        api: Arc<dyn SmartAccountApi>,
        owner: SmartOwner,
        smart_account: Option<&str>,
        paymaster_url: Option<String>,
        ctx: EvmContext,
    ) -> WalletResult<Self> {
        let account = match smart_account.map(str::trim).filter(|a| !a.is_empty()) {
            Some(a) => api.get_smart_account(a).await,
            None => {
                let key = uuid::Uuid::new_v4().to_string();
                api.create_smart_account(owner.address(), &key).await
            }
        }
        .map_err(WalletError::rpc)?;
        let address = parse_address(&account.address)?;
        tracing::info!(
            address = %address,
            owner = %owner.address(),
            network = %ctx.network(),
            sponsored = paymaster_url.is_some(),
            "smart account ready"
        );
        Ok(Self {
            api,
            owner,
            address,
            paymaster_url,
            ctx,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }

    /// Execute `calls` atomically as one user operation and wait for it to settle.
    ///
    /// Returns the bundle transaction hash, or [`super::MISSING_TX_HASH`] when the service
    /// reports success without one.
    pub async fn send_user_operation(&self, calls: Vec<Call>) -> WalletResult<String> {
        if calls.is_empty() {
            return Err(WalletError::InvalidInput(
                "user operation needs at least one call".into(),
            ));
        }
        let account = self.address.to_checksum(None);
        let mut lc = Lifecycle::new(NAME);
        let network_id = self.ctx.chain().network_id;
        let op_hash = self
            .api
            .prepare_user_operation(&account, network_id, &calls, self.paymaster_url.as_deref())
            .await
            .map_err(WalletError::submission)?;

        let signature = self.owner.sign_hash(op_hash).await?;
        lc.signed()?;

        self.api
            .send_user_operation(&account, op_hash, &signature)
            .await
            .map_err(WalletError::submission)?;
        let op_id = format!("{op_hash:#x}");
        lc.submitted(&op_id)?;

        let api = &self.api;
        let account_ref = account.as_str();
        let confirm = self.ctx.confirmation();
        let polled = poll_confirmation(&op_id, confirm.timeout(), confirm.poll_interval(), || async move {
            let status = api.user_operation_status(account_ref, op_hash).await?;
            Ok::<_, eyre::Report>(match status {
                UserOperationStatus::Pending => None,
                settled => Some(settled),
            })
        })
        .await;

        let receipt = match polled {
            Polled::TimedOut(waited) => return Err(WalletError::confirmation_timeout(&op_id, waited)),
            Polled::Ready(UserOperationStatus::Complete { tx_hash }) => {
                settled_receipt(NAME, true, tx_hash)
            }
            Polled::Ready(UserOperationStatus::Failed { tx_hash }) => {
                TxReceipt::failed(tx_hash.unwrap_or(op_id), None)
            }
            Polled::Ready(UserOperationStatus::Pending) => {
                return Err(WalletError::InvalidState(format!(
                    "user operation {op_id} reported pending after settling"
                )));
            }
        };
        Ok(lc.finish(receipt)?.id)
    }
}

#[async_trait]
impl WalletProvider for SmartEvmWallet {
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
impl EvmWalletProvider for SmartEvmWallet {
    fn evm_address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, _message: &[u8]) -> WalletResult<String> {
        Err(WalletError::unsupported(NAME, "sign_message"))
    }

    async fn sign_typed_data(&self, _typed_data: &Value) -> WalletResult<String> {
        Err(WalletError::unsupported(NAME, "sign_typed_data"))
    }

    async fn sign_transaction(&self, _tx: EvmTransaction) -> WalletResult<String> {
        Err(WalletError::unsupported(NAME, "sign_transaction"))
    }

    /// Translated into a single-call user operation.
    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        self.send_user_operation(vec![Call::from(&tx)]).await
    }

    async fn wait_for_transaction_receipt(&self, id: &str) -> WalletResult<TxReceipt> {
        self.ctx.wait_for_receipt(settled_tx_hash(NAME, id)?).await
    }

    async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes> {
        self.ctx.read_contract(to, calldata).await
    }
}
