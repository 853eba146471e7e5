//! In-memory doubles for the node and hosted-service seams. Every mock records what it was
//! asked to do so tests can assert on side effects (or their absence).

use crate::chains::evm::{EvmRpc, FeeEstimate};
use crate::chains::solana::{SignatureStatus, SvmRpc};
use crate::config::{ConfirmationConfig, GasConfig, SolanaConfig};
use crate::errors::WalletResult;
use crate::network::{chain_by_network_id, NetworkIdentity, ProtocolFamily, SOLANA_DEVNET_GENESIS};
use crate::remote::custodial::{CustodialApi, RemoteAccount};
use crate::remote::intent::{IntentApi, IntentReceipt, IntentRequest, PreparedIntent};
use crate::remote::smart_account::{SmartAccountApi, UserOperationStatus};
use crate::wallet::evm::{signature_hex, Call, EvmContext, EvmTransaction, EvmWalletProvider};
use crate::wallet::lifecycle::TxReceipt;
use crate::wallet::svm::{place_signature, SvmContext};
use crate::wallet::{AsEvmWallet, WalletProvider};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync as _;
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use solana_keypair::Keypair;
use solana_sdk::hash::Hash;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_signer::Signer as _;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// First anvil development key.
pub const TEST_EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one unit of a failure budget; `false` once it is spent.
fn take_one(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

const fn fast_confirmation() -> ConfirmationConfig {
    ConfirmationConfig {
        timeout_secs: 1,
        poll_interval_ms: 10,
    }
}

/// base-sepolia context over `rpc` with a one second confirmation window.
pub async fn evm_context(rpc: &Arc<MockEvmRpc>) -> eyre::Result<EvmContext> {
    let chain = chain_by_network_id("base-sepolia")?;
    Ok(EvmContext::connect(
        chain,
        Arc::clone(rpc) as _,
        GasConfig::default(),
        fast_confirmation(),
    )
    .await?)
}

/// solana-devnet context over `rpc` with a one second confirmation window.
pub async fn svm_context(rpc: &Arc<MockSvmRpc>) -> eyre::Result<SvmContext> {
    let chain = chain_by_network_id("solana-devnet")?;
    Ok(SvmContext::connect(
        chain,
        Arc::clone(rpc) as _,
        SolanaConfig::default(),
        fast_confirmation(),
    )
    .await?)
}

#[derive(Debug, Default)]
pub struct MockEvmRpc {
    chain_id: u64,
    fail_fee_estimate: bool,
    fail_gas_estimate: bool,
    withhold_receipts: bool,
    revert: bool,
    reject_broadcasts: bool,
    call_result: Bytes,
    sent: Mutex<Vec<Vec<u8>>>,
    calls: Mutex<Vec<(Address, Bytes)>>,
    fee_estimate_calls: AtomicUsize,
    receipt_calls: AtomicUsize,
    receipt_failures: AtomicUsize,
}

impl MockEvmRpc {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Self::default()
        }
    }

    pub fn failing_fee_estimate(mut self) -> Self {
        self.fail_fee_estimate = true;
        self
    }

    pub fn failing_gas_estimate(mut self) -> Self {
        self.fail_gas_estimate = true;
        self
    }

    pub fn withholding_receipts(mut self) -> Self {
        self.withhold_receipts = true;
        self
    }

    pub fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    pub fn rejecting_broadcasts(mut self) -> Self {
        self.reject_broadcasts = true;
        self
    }

    /// The first `n` receipt lookups fail like a flaky gateway.
    pub fn failing_receipt_queries(mut self, n: usize) -> Self {
        self.receipt_failures = AtomicUsize::new(n);
        self
    }

    /// Bytes every `eth_call` returns.
    pub fn with_call_result(mut self, out: Bytes) -> Self {
        self.call_result = out;
        self
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        lock(&self.calls).clone()
    }

    pub const fn nonce(&self) -> u64 {
        7
    }

    pub const fn fees(&self) -> FeeEstimate {
        FeeEstimate {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        }
    }

    pub const fn legacy_gas_price(&self) -> u128 {
        3_000_000_000
    }

    pub fn fee_estimate_calls(&self) -> usize {
        self.fee_estimate_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvmRpc for MockEvmRpc {
    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(self.chain_id)
    }

    async fn balance(&self, _addr: Address) -> eyre::Result<U256> {
        Ok(U256::from(10_u64).pow(U256::from(18_u64)))
    }

    async fn pending_nonce(&self, _addr: Address) -> eyre::Result<u64> {
        Ok(self.nonce())
    }

    async fn fee_estimate(&self) -> eyre::Result<FeeEstimate> {
        self.fee_estimate_calls.fetch_add(1, Ordering::SeqCst);
        eyre::ensure!(!self.fail_fee_estimate, "eth_feeHistory unavailable");
        Ok(self.fees())
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        Ok(self.legacy_gas_price())
    }

    async fn estimate_gas(&self, _from: Address, _tx: &EvmTransaction) -> eyre::Result<u64> {
        eyre::ensure!(!self.fail_gas_estimate, "execution reverted");
        Ok(21_000)
    }

    async fn send_raw(&self, raw: &[u8]) -> eyre::Result<()> {
        eyre::ensure!(!self.reject_broadcasts, "nonce too low");
        lock(&self.sent).push(raw.to_vec());
        Ok(())
    }

    async fn receipt(&self, hash: B256) -> eyre::Result<Option<TxReceipt>> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        eyre::ensure!(!take_one(&self.receipt_failures), "502 bad gateway");
        if self.withhold_receipts {
            return Ok(None);
        }
        let id = format!("{hash:#x}");
        Ok(Some(if self.revert {
            TxReceipt::failed(id, Some(1))
        } else {
            TxReceipt::confirmed(id, Some(1))
        }))
    }

    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        lock(&self.calls).push((to, data));
        Ok(self.call_result.clone())
    }
}

#[derive(Debug)]
pub struct MockSvmRpc {
    genesis: Hash,
    balance: u64,
    fail_transactions: bool,
    withhold_confirmation: bool,
    reject_broadcasts: bool,
    sent: Mutex<Vec<VersionedTransaction>>,
    send_attempts: AtomicUsize,
    status_calls: AtomicUsize,
    status_failures: AtomicUsize,
}

impl Default for MockSvmRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSvmRpc {
    pub const SLOT: u64 = 42;

    /// A devnet cluster holding one SOL for every account.
    pub fn new() -> Self {
        Self {
            genesis: SOLANA_DEVNET_GENESIS.parse().unwrap_or_default(),
            balance: 1_000_000_000,
            fail_transactions: false,
            withhold_confirmation: false,
            reject_broadcasts: false,
            sent: Mutex::new(vec![]),
            send_attempts: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            status_failures: AtomicUsize::new(0),
        }
    }

    pub const fn with_genesis(mut self, genesis: Hash) -> Self {
        self.genesis = genesis;
        self
    }

    pub const fn with_balance(mut self, lamports: u64) -> Self {
        self.balance = lamports;
        self
    }

    pub const fn failing_transactions(mut self) -> Self {
        self.fail_transactions = true;
        self
    }

    pub const fn withholding_confirmation(mut self) -> Self {
        self.withhold_confirmation = true;
        self
    }

    pub const fn rejecting_broadcasts(mut self) -> Self {
        self.reject_broadcasts = true;
        self
    }

    /// The first `n` signature-status lookups fail like a flaky gateway.
    pub fn failing_status_queries(mut self, n: usize) -> Self {
        self.status_failures = AtomicUsize::new(n);
        self
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        lock(&self.sent).clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SvmRpc for MockSvmRpc {
    async fn genesis_hash(&self) -> eyre::Result<Hash> {
        Ok(self.genesis)
    }

    async fn latest_blockhash(&self) -> eyre::Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn balance(&self, _owner: &Pubkey) -> eyre::Result<u64> {
        Ok(self.balance)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> eyre::Result<Signature> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        eyre::ensure!(!self.reject_broadcasts, "blockhash not found");
        lock(&self.sent).push(tx.clone());
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(&self, _sig: &Signature) -> eyre::Result<Option<SignatureStatus>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        eyre::ensure!(!take_one(&self.status_failures), "502 bad gateway");
        if self.withhold_confirmation {
            return Ok(None);
        }
        Ok(Some(SignatureStatus {
            slot: Self::SLOT,
            confirmed: true,
            err: self
                .fail_transactions
                .then(|| "InstructionError(0, Custom(1))".to_owned()),
        }))
    }
}

/// Custody service holding one EVM key and one Solana keypair.
#[derive(Debug)]
pub struct MockCustodialApi {
    evm: PrivateKeySigner,
    solana: Keypair,
    refuse: bool,
    tamper: bool,
    idempotency_keys: Mutex<Vec<String>>,
    signed_evm_payloads: Mutex<Vec<Vec<u8>>>,
}

impl Default for MockCustodialApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCustodialApi {
    pub fn new() -> Self {
        Self {
            evm: PrivateKeySigner::random(),
            solana: Keypair::new(),
            refuse: false,
            tamper: false,
            idempotency_keys: Mutex::new(vec![]),
            signed_evm_payloads: Mutex::new(vec![]),
        }
    }

    pub const fn refusing_to_sign(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Sign a different message than the one submitted.
    pub const fn tampering_with_solana_messages(mut self) -> Self {
        self.tamper = true;
        self
    }

    pub fn evm_address(&self) -> Address {
        self.evm.address()
    }

    pub fn solana_pubkey(&self) -> Pubkey {
        self.solana.pubkey()
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        lock(&self.idempotency_keys).clone()
    }

    pub fn signed_evm_payloads(&self) -> Vec<Vec<u8>> {
        lock(&self.signed_evm_payloads).clone()
    }

    fn account(&self, family: ProtocolFamily) -> RemoteAccount {
        let address = match family {
            ProtocolFamily::Svm => self.solana.pubkey().to_string(),
            ProtocolFamily::Evm | ProtocolFamily::Unknown => self.evm.address().to_checksum(None),
        };
        RemoteAccount {
            address,
            name: None,
        }
    }
}

#[async_trait]
impl CustodialApi for MockCustodialApi {
    async fn create_account(
        &self,
        family: ProtocolFamily,
        idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount> {
        lock(&self.idempotency_keys).push(idempotency_key.to_owned());
        Ok(self.account(family))
    }

    async fn get_account(
        &self,
        family: ProtocolFamily,
        _address: &str,
    ) -> eyre::Result<RemoteAccount> {
        Ok(self.account(family))
    }

    async fn sign_evm_message(&self, _address: &str, message: &[u8]) -> eyre::Result<String> {
        eyre::ensure!(!self.refuse, "policy denied");
        Ok(signature_hex(&self.evm.sign_message_sync(message)?))
    }

    async fn sign_evm_typed_data(&self, _address: &str, _typed_data: &Value) -> eyre::Result<String> {
        eyre::ensure!(!self.refuse, "policy denied");
        Ok(signature_hex(&self.evm.sign_hash_sync(&B256::repeat_byte(1))?))
    }

    async fn sign_evm_hash(&self, _address: &str, hash: B256) -> eyre::Result<String> {
        eyre::ensure!(!self.refuse, "policy denied");
        Ok(signature_hex(&self.evm.sign_hash_sync(&hash)?))
    }

    async fn sign_evm_transaction(&self, _address: &str, unsigned: &[u8]) -> eyre::Result<Vec<u8>> {
        eyre::ensure!(!self.refuse, "policy denied");
        lock(&self.signed_evm_payloads).push(unsigned.to_vec());
        // Opaque stand-in for a signed envelope; only its hash matters downstream.
        let mut raw = vec![0x02];
        raw.extend_from_slice(keccak256(unsigned).as_slice());
        Ok(raw)
    }

    async fn sign_solana_transaction(&self, _address: &str, tx_base64: &str) -> eyre::Result<String> {
        eyre::ensure!(!self.refuse, "policy denied");
        let engine = base64::engine::general_purpose::STANDARD;
        let mut tx: VersionedTransaction = bincode::deserialize(&engine.decode(tx_base64)?)?;
        if self.tamper {
            if let VersionedMessage::Legacy(m) = &mut tx.message {
                m.recent_blockhash = Hash::new_unique();
            }
        }
        let sig = self.solana.sign_message(&tx.message.serialize());
        place_signature(&mut tx, &self.solana.pubkey(), sig)?;
        Ok(engine.encode(bincode::serialize(&tx)?))
    }
}

#[derive(Debug)]
pub struct MockSmartAccountApi {
    status: UserOperationStatus,
    prepared: Mutex<Vec<Vec<Call>>>,
    paymasters: Mutex<Vec<Option<String>>>,
    signatures: Mutex<Vec<String>>,
}

impl MockSmartAccountApi {
    pub fn new(status: UserOperationStatus) -> Self {
        Self {
            status,
            prepared: Mutex::new(vec![]),
            paymasters: Mutex::new(vec![]),
            signatures: Mutex::new(vec![]),
        }
    }

    pub fn smart_account() -> Address {
        Address::repeat_byte(0x5a)
    }

    pub fn user_op_hash(&self) -> B256 {
        B256::repeat_byte(0x44)
    }

    pub fn prepared_batches(&self) -> Vec<Vec<Call>> {
        lock(&self.prepared).clone()
    }

    pub fn paymaster_urls(&self) -> Vec<Option<String>> {
        lock(&self.paymasters).clone()
    }

    pub fn signatures(&self) -> Vec<String> {
        lock(&self.signatures).clone()
    }
}

#[async_trait]
impl SmartAccountApi for MockSmartAccountApi {
    async fn create_smart_account(
        &self,
        _owner: Address,
        _idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount> {
        Ok(RemoteAccount {
            address: Self::smart_account().to_checksum(None),
            name: None,
        })
    }

    async fn get_smart_account(&self, address: &str) -> eyre::Result<RemoteAccount> {
        Ok(RemoteAccount {
            address: address.to_owned(),
            name: None,
        })
    }

    async fn prepare_user_operation(
        &self,
        _smart_account: &str,
        _network_id: &str,
        calls: &[Call],
        paymaster_url: Option<&str>,
    ) -> eyre::Result<B256> {
        lock(&self.prepared).push(calls.to_vec());
        lock(&self.paymasters).push(paymaster_url.map(str::to_owned));
        Ok(self.user_op_hash())
    }

    async fn send_user_operation(
        &self,
        _smart_account: &str,
        _user_op_hash: B256,
        signature: &str,
    ) -> eyre::Result<()> {
        lock(&self.signatures).push(signature.to_owned());
        Ok(())
    }

    async fn user_operation_status(
        &self,
        _smart_account: &str,
        _user_op_hash: B256,
    ) -> eyre::Result<UserOperationStatus> {
        Ok(self.status.clone())
    }
}

/// Relayer that settles every intent with a fixed receipt, or never when `None`.
#[derive(Debug)]
pub struct MockIntentApi {
    receipt: Option<IntentReceipt>,
    requests: Mutex<Vec<IntentRequest>>,
}

impl MockIntentApi {
    pub fn new(receipt: Option<IntentReceipt>) -> Self {
        Self {
            receipt,
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<IntentRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl IntentApi for MockIntentApi {
    async fn account_address(&self, _owner: Address, _chain_id: u64) -> eyre::Result<Address> {
        Ok(Address::repeat_byte(0x1e))
    }

    async fn prepare_intent(&self, req: &IntentRequest) -> eyre::Result<PreparedIntent> {
        lock(&self.requests).push(req.clone());
        Ok(PreparedIntent {
            intent: serde_json::to_value(req)?,
            intent_hash: B256::repeat_byte(0x77),
        })
    }

    async fn send_intent(&self, _intent: &Value, _signature: &str) -> eyre::Result<B256> {
        Ok(B256::repeat_byte(0x88))
    }

    async fn execution_receipt(&self, _ui_hash: B256) -> eyre::Result<Option<IntentReceipt>> {
        Ok(self.receipt.clone())
    }

    async fn chain_abstracted_balance(
        &self,
        account: Address,
        tokens: &[String],
        chain_ids: &[u64],
    ) -> eyre::Result<Value> {
        Ok(json!({
            "account": format!("{account:#x}"),
            "tokens": tokens,
            "chainIds": chain_ids,
        }))
    }
}

/// Collects formatted `tracing` output for assertions.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events on this thread into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        lock(&self.buf).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Wallet double that records transfers instead of touching a chain.
#[derive(Debug)]
pub struct MockWallet {
    network: NetworkIdentity,
    address: String,
    balance: U256,
    transfers: Mutex<Vec<(String, String)>>,
}

impl MockWallet {
    fn on(network_id: &str, address: String) -> eyre::Result<Self> {
        let chain = chain_by_network_id(network_id)?;
        let balance = U256::from(125_u64) * U256::from(10_u64).pow(U256::from(chain.native_decimals - 2));
        Ok(Self {
            network: chain.identity(),
            address,
            balance,
            transfers: Mutex::new(vec![]),
        })
    }

    /// Holding 1.25 of the native asset on an EVM network.
    pub fn evm(network_id: &str) -> eyre::Result<Self> {
        Self::on(network_id, Address::repeat_byte(0xaa).to_checksum(None))
    }

    /// Holding 1.25 SOL on a Solana cluster.
    pub fn svm(network_id: &str) -> eyre::Result<Self> {
        Self::on(network_id, Pubkey::new_unique().to_string())
    }

    /// A wallet whose identity is whatever the caller says, resolvable or not.
    pub fn with_identity(network: NetworkIdentity) -> Self {
        Self {
            network,
            address: "mock".into(),
            balance: U256::ZERO,
            transfers: Mutex::new(vec![]),
        }
    }

    pub fn transfers(&self) -> Vec<(String, String)> {
        lock(&self.transfers).clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn network(&self) -> &NetworkIdentity {
        &self.network
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn balance(&self) -> WalletResult<U256> {
        Ok(self.balance)
    }

    async fn native_transfer(&self, to: &str, amount: &str) -> WalletResult<String> {
        lock(&self.transfers).push((to.to_owned(), amount.to_owned()));
        Ok(format!("mock-tx-{}", lock(&self.transfers).len()))
    }
}

impl AsEvmWallet for MockWallet {
    fn as_evm(&self) -> Option<&dyn EvmWalletProvider> {
        None
    }
}
