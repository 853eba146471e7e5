//! Account-based chain family: pending transactions, the shared preparation and confirmation
//! path, and the closed set of custody backends.

pub mod custodial;
pub mod intent;
pub mod local;
pub mod smart;

use crate::amount::parse_base_units;
use crate::chains::evm::{AlloyRpc, EvmRpc};
use crate::config::{AgentKitConfig, ConfirmationConfig, GasConfig, WalletConfig};
use crate::errors::{WalletError, WalletResult};
use crate::network::{ChainConfig, NetworkIdentity};
use crate::remote::custodial::HttpCustodialApi;
use crate::remote::intent::HttpIntentApi;
use crate::retry::{poll_confirmation, Polled};
use crate::wallet::keys;
use crate::wallet::lifecycle::{Lifecycle, TxReceipt};
use crate::wallet::{AsEvmWallet, WalletProvider};
use alloy::consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718 as _;
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{keccak256, Address, Bytes, Signature, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync as _;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use custodial::CustodialEvmWallet;
pub use intent::IntentEvmWallet;
pub use local::LocalEvmWallet;
pub use smart::{SmartEvmWallet, SmartOwner};

/// Returned by the smart and intent backends when a settled operation carries no transaction
/// hash. Never returned for a failed operation. It names no transaction, so
/// `wait_for_transaction_receipt` answers it with `UnsupportedOperation`.
pub const MISSING_TX_HASH: &str = "0x";

/// Gas used by a plain value transfer; the limit used when estimation fails for one.
const TRANSFER_GAS: u64 = 21_000;

/// A transaction the caller wants executed. Unset fields are filled during preparation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvmTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
    /// Legacy pricing. Only used when no EIP-1559 fee is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl EvmTransaction {
    pub fn native(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            ..Self::default()
        }
    }

    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            ..Self::default()
        }
    }

    /// Positive value and no calldata.
    pub fn is_native_transfer(&self) -> bool {
        self.value > U256::ZERO && self.data.is_empty()
    }

    /// The caller priced the transaction, so estimation must not touch the fee fields.
    pub const fn has_fee_params(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.gas_price.is_some()
    }
}

/// One call in a smart-account batch or intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl From<&EvmTransaction> for Call {
    fn from(tx: &EvmTransaction) -> Self {
        Self {
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
        }
    }
}

/// A fully prepared transaction in its signable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedEvmTx {
    Eip1559(TxEip1559),
    Legacy(TxLegacy),
}

fn missing(field: &str) -> WalletError {
    WalletError::InvalidInput(format!("prepared transaction is missing {field}"))
}

impl UnsignedEvmTx {
    pub fn from_prepared(tx: &EvmTransaction) -> WalletResult<Self> {
        let chain_id = tx.chain_id.ok_or_else(|| missing("chain id"))?;
        let nonce = tx.nonce.ok_or_else(|| missing("nonce"))?;
        let gas_limit = tx.gas_limit.ok_or_else(|| missing("gas limit"))?;
        if let Some(max_fee_per_gas) = tx.max_fee_per_gas {
            return Ok(Self::Eip1559(TxEip1559 {
                chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas: tx
                    .max_priority_fee_per_gas
                    .unwrap_or(0)
                    .min(max_fee_per_gas),
                to: TxKind::Call(tx.to),
                value: tx.value,
                access_list: AccessList::default(),
                input: tx.data.clone(),
            }));
        }
        let gas_price = tx.gas_price.ok_or_else(|| missing("fee parameters"))?;
        Ok(Self::Legacy(TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(tx.to),
            value: tx.value,
            input: tx.data.clone(),
        }))
    }

    /// EIP-2718 payload a signer commits to. Remote signers receive exactly these bytes.
    pub fn encoded_for_signing(&self) -> Vec<u8> {
        match self {
            Self::Eip1559(t) => t.encoded_for_signing(),
            Self::Legacy(t) => t.encoded_for_signing(),
        }
    }

    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::Eip1559(t) => t.signature_hash(),
            Self::Legacy(t) => t.signature_hash(),
        }
    }

    pub fn into_envelope(self, sig: Signature) -> TxEnvelope {
        match self {
            Self::Eip1559(t) => t.into_signed(sig).into(),
            Self::Legacy(t) => t.into_signed(sig).into(),
        }
    }

    /// Raw signed bytes ready for `eth_sendRawTransaction`.
    pub fn into_raw(self, sig: Signature) -> Vec<u8> {
        self.into_envelope(sig).encoded_2718()
    }
}

/// Account-based refinement of [`WalletProvider`].
#[async_trait]
pub trait EvmWalletProvider: WalletProvider {
    fn evm_address(&self) -> Address;

    /// EIP-191 signature over `message`, hex.
    async fn sign_message(&self, message: &[u8]) -> WalletResult<String>;

    /// EIP-712 signature over a JSON typed-data document, hex.
    async fn sign_typed_data(&self, typed_data: &Value) -> WalletResult<String>;

    /// Prepare and sign without broadcasting; returns the raw signed envelope, hex.
    async fn sign_transaction(&self, tx: EvmTransaction) -> WalletResult<String>;

    /// Sign, submit and wait for the receipt. Returns the transaction hash.
    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String>;

    async fn wait_for_transaction_receipt(&self, id: &str) -> WalletResult<TxReceipt>;

    /// `eth_call` against the current state. There is no write path.
    async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes>;
}

/// Typed view call through any EVM wallet.
pub async fn read_call<W, C>(wallet: &W, to: Address, call: &C) -> WalletResult<C::Return>
where
    W: EvmWalletProvider + ?Sized,
    C: SolCall + Sync,
{
    let out = wallet
        .read_contract(to, Bytes::from(call.abi_encode()))
        .await?;
    C::abi_decode_returns(&out).map_err(WalletError::rpc)
}

pub fn parse_address(s: &str) -> WalletResult<Address> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| WalletError::InvalidInput(format!("invalid evm address {s:?}: {e}")))
}

/// Hash to wait on for an id returned by a user-operation or intent send.
pub(crate) fn settled_tx_hash(backend: &'static str, id: &str) -> WalletResult<B256> {
    if id.trim() == MISSING_TX_HASH {
        return Err(WalletError::unsupported(
            backend,
            "wait_for_transaction_receipt on an operation that settled without a transaction hash",
        ));
    }
    parse_tx_hash(id)
}

pub fn parse_tx_hash(id: &str) -> WalletResult<B256> {
    id.trim()
        .parse::<B256>()
        .map_err(|e| WalletError::InvalidInput(format!("invalid transaction hash {id:?}: {e}")))
}

/// Native transfer request from the uniform `(to, base-unit amount)` pair.
pub fn native_transfer_tx(to: &str, amount: &str) -> WalletResult<EvmTransaction> {
    Ok(EvmTransaction::native(
        parse_address(to)?,
        parse_base_units(amount)?,
    ))
}

pub fn signature_hex(sig: &Signature) -> String {
    format!("0x{}", hex::encode(sig.as_bytes()))
}

pub(crate) fn sign_hash_with(signer: &PrivateKeySigner, hash: &B256) -> WalletResult<Signature> {
    signer.sign_hash_sync(hash).map_err(WalletError::signing)
}

pub(crate) fn sign_message_with(signer: &PrivateKeySigner, message: &[u8]) -> WalletResult<String> {
    let sig = signer
        .sign_message_sync(message)
        .map_err(WalletError::signing)?;
    Ok(signature_hex(&sig))
}

pub(crate) fn sign_typed_data_with(
    signer: &PrivateKeySigner,
    typed_data: &Value,
) -> WalletResult<String> {
    let td: TypedData =
        serde_json::from_value(typed_data.clone()).map_err(WalletError::invalid_input)?;
    let hash = td
        .eip712_signing_hash()
        .map_err(WalletError::invalid_input)?;
    Ok(signature_hex(&sign_hash_with(signer, &hash)?))
}

/// Receipt for an operation settled by a service that may not report the transaction hash.
pub(crate) fn settled_receipt(
    backend: &'static str,
    success: bool,
    tx_hash: Option<String>,
) -> TxReceipt {
    let id = tx_hash.unwrap_or_else(|| {
        tracing::warn!(
            backend,
            sentinel = MISSING_TX_HASH,
            "settled without a transaction hash"
        );
        MISSING_TX_HASH.to_owned()
    });
    if success {
        TxReceipt::confirmed(id, None)
    } else {
        TxReceipt::failed(id, None)
    }
}

/// Chain handle shared by every EVM backend: verified chain id, node client and the fee and
/// confirmation policy.
pub struct EvmContext {
    chain: &'static ChainConfig,
    network: NetworkIdentity,
    chain_id: u64,
    rpc: Arc<dyn EvmRpc>,
    gas: GasConfig,
    confirmation: ConfirmationConfig,
}

impl std::fmt::Debug for EvmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmContext")
            .field("network", &self.network)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl EvmContext {
    /// Fails unless the node reports the chain id the table lists for `chain`.
    pub async fn connect(
        chain: &'static ChainConfig,
        rpc: Arc<dyn EvmRpc>,
        gas: GasConfig,
        confirmation: ConfirmationConfig,
    ) -> WalletResult<Self> {
        let expected = chain
            .evm_chain_id()
            .ok_or_else(|| WalletError::UnsupportedNetwork(chain.network_id.to_owned()))?;
        let reported = rpc.chain_id().await.map_err(WalletError::rpc)?;
        if reported != expected {
            return Err(WalletError::Configuration(format!(
                "rpc endpoint reports chain id {reported}, expected {expected} for {}",
                chain.network_id
            )));
        }
        Ok(Self {
            chain,
            network: chain.identity(),
            chain_id: expected,
            rpc,
            gas,
            confirmation,
        })
    }

    pub fn default_rpc(cfg: &AgentKitConfig, chain: &ChainConfig) -> WalletResult<Arc<dyn EvmRpc>> {
        let rpc = AlloyRpc::new(cfg.rpc_urls(chain)).map_err(WalletError::configuration)?;
        Ok(Arc::new(rpc))
    }

    pub const fn chain(&self) -> &'static ChainConfig {
        self.chain
    }

    pub const fn network(&self) -> &NetworkIdentity {
        &self.network
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub const fn confirmation(&self) -> &ConfirmationConfig {
        &self.confirmation
    }

    pub async fn balance(&self, addr: Address) -> WalletResult<U256> {
        self.rpc.balance(addr).await.map_err(WalletError::rpc)
    }

    pub async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes> {
        self.rpc.call(to, calldata).await.map_err(WalletError::rpc)
    }

    /// Fill what the caller left unset. Fees are only estimated when the caller set none; a
    /// failed estimate is logged and the transaction proceeds without the optimized value.
    pub async fn prepare(
        &self,
        from: Address,
        mut tx: EvmTransaction,
        backend: &'static str,
    ) -> WalletResult<EvmTransaction> {
        match tx.chain_id {
            Some(c) if c != self.chain_id => {
                return Err(WalletError::InvalidInput(format!(
                    "transaction targets chain {c}, wallet is on {}",
                    self.chain_id
                )));
            }
            _ => tx.chain_id = Some(self.chain_id),
        }
        if tx.nonce.is_none() {
            tx.nonce = Some(
                self.rpc
                    .pending_nonce(from)
                    .await
                    .map_err(WalletError::rpc)?,
            );
        }

        if !tx.has_fee_params() {
            match self.rpc.fee_estimate().await {
                Ok(fees) => {
                    tx.max_fee_per_gas = Some(self.gas.scale_fee(fees.max_fee_per_gas));
                    if tx.max_priority_fee_per_gas.is_none() {
                        tx.max_priority_fee_per_gas =
                            Some(self.gas.scale_fee(fees.max_priority_fee_per_gas));
                    }
                }
                Err(e) => tracing::warn!(
                    code = "estimation_warning",
                    backend,
                    error = %format!("{e:#}"),
                    "fee estimation failed; sending without EIP-1559 fee parameters"
                ),
            }
        }

        if tx.gas_limit.is_none() {
            match self.rpc.estimate_gas(from, &tx).await {
                Ok(g) => tx.gas_limit = Some(self.gas.scale_gas_limit(g)),
                Err(e) if tx.data.is_empty() => {
                    tracing::warn!(
                        code = "estimation_warning",
                        backend,
                        error = %format!("{e:#}"),
                        "gas estimation failed; using the plain transfer limit"
                    );
                    tx.gas_limit = Some(TRANSFER_GAS);
                }
                // A call that cannot be estimated almost always reverts.
                Err(e) => return Err(WalletError::rpc(e.wrap_err("estimate gas for call"))),
            }
        }

        if !tx.has_fee_params() {
            let gp = self.rpc.gas_price().await.map_err(WalletError::rpc)?;
            tx.gas_price = Some(gp);
        }
        Ok(tx)
    }

    /// Broadcast a signed envelope once, then wait for its receipt.
    pub async fn submit_signed(&self, lc: &mut Lifecycle, raw: &[u8]) -> WalletResult<TxReceipt> {
        let hash = keccak256(raw);
        self.rpc.send_raw(raw).await.map_err(WalletError::submission)?;
        lc.submitted(&format!("{hash:#x}"))?;
        let receipt = self.wait_for_receipt(hash).await?;
        lc.finish(receipt)
    }

    pub async fn wait_for_receipt(&self, hash: B256) -> WalletResult<TxReceipt> {
        let rpc = &self.rpc;
        let id = format!("{hash:#x}");
        let polled = poll_confirmation(
            &id,
            self.confirmation.timeout(),
            self.confirmation.poll_interval(),
            || rpc.receipt(hash),
        )
        .await;
        match polled {
            Polled::Ready(r) => Ok(r),
            Polled::TimedOut(waited) => Err(WalletError::confirmation_timeout(&id, waited)),
        }
    }
}

/// The EVM backend chosen by configuration.
#[derive(Debug)]
pub enum EvmWallet {
    Local(LocalEvmWallet),
    Custodial(CustodialEvmWallet),
    Smart(SmartEvmWallet),
    Intent(IntentEvmWallet),
}

macro_rules! dispatch {
    ($self:ident, $w:ident => $body:expr) => {
        match $self {
            EvmWallet::Local($w) => $body,
            EvmWallet::Custodial($w) => $body,
            EvmWallet::Smart($w) => $body,
            EvmWallet::Intent($w) => $body,
        }
    };
}

impl EvmWallet {
    /// Credentials are checked before the node or any hosted service is contacted.
    pub async fn from_config(
        cfg: &AgentKitConfig,
        chain: &'static ChainConfig,
    ) -> WalletResult<Self> {
        match &cfg.wallet {
            WalletConfig::Unconfigured => Err(WalletError::Configuration(
                "no wallet backend configured".into(),
            )),
            WalletConfig::Local(k) => {
                let signer = keys::evm_signer(k)?;
                let ctx = Self::context(cfg, chain).await?;
                Ok(Self::Local(LocalEvmWallet::new(signer, ctx)))
            }
            WalletConfig::Custodial(c) => {
                let api = Arc::new(HttpCustodialApi::from_config(c)?);
                let ctx = Self::context(cfg, chain).await?;
                let w = CustodialEvmWallet::connect(
                    api,
                    c.address.as_deref(),
                    c.idempotency_key.as_deref(),
                    ctx,
                )
                .await?;
                Ok(Self::Custodial(w))
            }
            WalletConfig::Smart(s) => {
                let api = Arc::new(HttpCustodialApi::from_config(&s.api)?);
                let owner_key = s
                    .owner_private_key
                    .as_ref()
                    .map(keys::evm_signer_from_hex)
                    .transpose()?;
                let ctx = Self::context(cfg, chain).await?;
                let owner = match owner_key {
                    Some(signer) => SmartOwner::Local(signer),
                    None => {
                        SmartOwner::custodial(
                            Arc::clone(&api) as _,
                            s.api.address.as_deref(),
                            s.api.idempotency_key.as_deref(),
                        )
                        .await?
                    }
                };
                let w = SmartEvmWallet::connect(
                    api,
                    owner,
                    s.smart_account_address.as_deref(),
                    s.paymaster_url.clone(),
                    ctx,
                )
                .await?;
                Ok(Self::Smart(w))
            }
            WalletConfig::Intent(i) => {
                let api = Arc::new(HttpIntentApi::from_config(i)?);
                let owner = i
                    .owner_private_key
                    .as_ref()
                    .map(keys::evm_signer_from_hex)
                    .transpose()?
                    .ok_or_else(|| {
                        WalletError::Configuration(
                            "intent backend needs an owner key (PRIVATE_KEY)".into(),
                        )
                    })?;
                let ctx = Self::context(cfg, chain).await?;
                Ok(Self::Intent(IntentEvmWallet::connect(api, owner, ctx).await?))
            }
        }
    }

    async fn context(cfg: &AgentKitConfig, chain: &'static ChainConfig) -> WalletResult<EvmContext> {
        EvmContext::connect(chain, EvmContext::default_rpc(cfg, chain)?, cfg.gas, cfg.confirmation)
            .await
    }

    pub const fn as_smart(&self) -> Option<&SmartEvmWallet> {
        match self {
            Self::Smart(w) => Some(w),
            _ => None,
        }
    }

    pub const fn as_intent(&self) -> Option<&IntentEvmWallet> {
        match self {
            Self::Intent(w) => Some(w),
            _ => None,
        }
    }
}

impl AsEvmWallet for EvmWallet {
    fn as_evm(&self) -> Option<&dyn EvmWalletProvider> {
        Some(self)
    }
}

#[async_trait]
impl WalletProvider for EvmWallet {
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
impl EvmWalletProvider for EvmWallet {
    fn evm_address(&self) -> Address {
        dispatch!(self, w => w.evm_address())
    }

    async fn sign_message(&self, message: &[u8]) -> WalletResult<String> {
        dispatch!(self, w => w.sign_message(message).await)
    }

    async fn sign_typed_data(&self, typed_data: &Value) -> WalletResult<String> {
        dispatch!(self, w => w.sign_typed_data(typed_data).await)
    }

    async fn sign_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        dispatch!(self, w => w.sign_transaction(tx).await)
    }

    async fn send_transaction(&self, tx: EvmTransaction) -> WalletResult<String> {
        dispatch!(self, w => w.send_transaction(tx).await)
    }

    async fn wait_for_transaction_receipt(&self, id: &str) -> WalletResult<TxReceipt> {
        dispatch!(self, w => w.wait_for_transaction_receipt(id).await)
    }

    async fn read_contract(&self, to: Address, calldata: Bytes) -> WalletResult<Bytes> {
        dispatch!(self, w => w.read_contract(to, calldata).await)
    }
}
