use crate::errors::WalletResult;
use crate::network::{chain_by_network_id, ChainConfig};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_NETWORK_ID: &str = "base-sepolia";
pub const DEFAULT_CUSTODIAL_API_URL: &str = "https://api.cdp.coinbase.com/platform";
pub const DEFAULT_INTENT_RELAYER_URL: &str = "https://intents.zerodev.app";

fn de_secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
    let v: Option<String> = Option::deserialize(d)?;
    Ok(v.filter(|s| !s.trim().is_empty())
        .map(|s| SecretString::new(s.into())))
}

pub fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_owned().into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AgentKitConfig {
    /// Network the wallet operates on (`base-sepolia`, `solana-devnet`, ...).
    pub network_id: Option<String>,
    pub wallet: WalletConfig,
    pub rpc: RpcConfig,
    pub gas: GasConfig,
    pub confirmation: ConfirmationConfig,
    pub solana: SolanaConfig,
}

impl AgentKitConfig {
    pub fn network_id(&self) -> &str {
        self.network_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_NETWORK_ID)
    }

    pub fn chain(&self) -> WalletResult<&'static ChainConfig> {
        chain_by_network_id(self.network_id())
    }

    /// Configured RPC endpoints for `chain`, primary first, falling back to the table defaults.
    pub fn rpc_urls(&self, chain: &ChainConfig) -> Vec<String> {
        let mut urls: Vec<String> = vec![];
        let configured = self.rpc.urls.get(chain.network_id).into_iter().flatten();
        for u in configured.cloned().chain(chain.rpc_urls()) {
            let t = u.trim();
            if t.is_empty() || urls.iter().any(|x| x == t) {
                continue;
            }
            urls.push(t.to_owned());
        }
        urls
    }
}

/// Which custody backend to construct. Selected by configuration only.
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum WalletConfig {
    #[default]
    Unconfigured,
    Local(LocalKeyConfig),
    Custodial(CustodialConfig),
    Smart(SmartWalletConfig),
    Intent(IntentWalletConfig),
}

impl WalletConfig {
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Local(_) => "local",
            Self::Custodial(_) => "custodial",
            Self::Smart(_) => "smart",
            Self::Intent(_) => "intent",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocalKeyConfig {
    /// Hex secp256k1 key for EVM networks.
    #[serde(deserialize_with = "de_secret")]
    pub private_key: Option<SecretString>,
    /// Base58 64-byte keypair for Solana networks.
    #[serde(deserialize_with = "de_secret")]
    pub solana_private_key: Option<SecretString>,
    /// BIP-39 phrase; used when no raw key is set for the network's family.
    #[serde(deserialize_with = "de_secret")]
    pub mnemonic: Option<SecretString>,
    pub account_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CustodialConfig {
    pub api_url: String,
    pub api_key_id: Option<String>,
    #[serde(deserialize_with = "de_secret")]
    pub api_key_secret: Option<SecretString>,
    #[serde(deserialize_with = "de_secret")]
    pub wallet_secret: Option<SecretString>,
    /// Attach to this account instead of creating one.
    pub address: Option<String>,
    /// Makes account creation safe to repeat.
    pub idempotency_key: Option<String>,
}

impl Default for CustodialConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CUSTODIAL_API_URL.into(),
            api_key_id: None,
            api_key_secret: None,
            wallet_secret: None,
            address: None,
            idempotency_key: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SmartWalletConfig {
    /// Smart-account service and, without `owner_private_key`, the custodial owner account.
    pub api: CustodialConfig,
    /// Local owner key. When unset the owner is a custodial account.
    #[serde(deserialize_with = "de_secret")]
    pub owner_private_key: Option<SecretString>,
    pub smart_account_address: Option<String>,
    pub paymaster_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntentWalletConfig {
    #[serde(deserialize_with = "de_secret")]
    pub owner_private_key: Option<SecretString>,
    pub project_id: Option<String>,
    pub relayer_url: String,
}

impl Default for IntentWalletConfig {
    fn default() -> Self {
        Self {
            owner_private_key: None,
            project_id: None,
            relayer_url: DEFAULT_INTENT_RELAYER_URL.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Per-network endpoint overrides, keyed by network id. Tried before the built-in defaults.
    pub urls: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Headroom applied to estimated gas limits.
    pub gas_limit_multiplier: f64,
    /// Headroom applied to estimated fees per gas.
    pub fee_per_gas_multiplier: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit_multiplier: 1.2,
            fee_per_gas_multiplier: 1.0,
        }
    }
}

fn scale(value: u128, multiplier: f64) -> u128 {
    let m = if multiplier.is_finite() {
        multiplier.clamp(1.0, 100.0)
    } else {
        1.0
    };
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::float_arithmetic,
        reason = "multiplier is clamped to [1, 100] before conversion"
    )]
    let permille = (m * 1000.0).round() as u128;
    value.saturating_mul(permille).div_ceil(1000)
}

impl GasConfig {
    pub fn scale_gas_limit(&self, gas: u64) -> u64 {
        u64::try_from(scale(u128::from(gas), self.gas_limit_multiplier)).unwrap_or(u64::MAX)
    }

    pub fn scale_fee(&self, fee: u128) -> u128 {
        scale(fee, self.fee_per_gas_multiplier)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            poll_interval_ms: 500,
        }
    }
}

impl ConfirmationConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SolanaConfig {
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price_micro_lamports: Option<u64>,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit: Some(2_000),
            compute_unit_price_micro_lamports: Some(10_000),
        }
    }
}
