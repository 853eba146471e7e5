//! Network identity and the static chain tables keyed by it.
//!
//! Every configurable network has exactly one row in [`CHAINS`]. Within a protocol family the
//! row's `chain_id` and `network_id` are both unique, so either key resolves to the same
//! canonical [`NetworkIdentity`].

use crate::errors::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SOLANA_MAINNET_GENESIS: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d";
pub const SOLANA_DEVNET_GENESIS: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1wcaWoxPkrZBG";
pub const SOLANA_TESTNET_GENESIS: &str = "4uhcVJyU9pJkvQyS88uRDiswHXSCkY3zQawwpjk2NsNY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ProtocolFamily {
    /// Account-based chains with contract calls.
    Evm,
    /// Instruction-based chains.
    Svm,
    /// Anything we could not recognise. Never matches a table row.
    #[default]
    Unknown,
}

impl From<String> for ProtocolFamily {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Self::Evm,
            "svm" => Self::Svm,
            _ => Self::Unknown,
        }
    }
}

impl ProtocolFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Svm => "svm",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIdentity {
    #[serde(default)]
    pub protocol_family: ProtocolFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

fn non_blank(v: Option<&String>) -> Option<&str> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl NetworkIdentity {
    pub fn new(
        protocol_family: ProtocolFamily,
        chain_id: Option<&str>,
        network_id: Option<&str>,
    ) -> Self {
        Self {
            protocol_family,
            chain_id: chain_id.map(str::to_owned),
            network_id: network_id.map(str::to_owned),
        }
    }

    /// Partial identity carrying only a network id (what callers usually have in hand).
    pub fn with_network_id(protocol_family: ProtocolFamily, network_id: &str) -> Self {
        Self::new(protocol_family, None, Some(network_id))
    }

    pub fn chain_id(&self) -> Option<&str> {
        non_blank(self.chain_id.as_ref())
    }

    pub fn network_id(&self) -> Option<&str> {
        non_blank(self.network_id.as_ref())
    }

    /// Known family and at least one usable key.
    pub fn is_well_formed(&self) -> bool {
        self.protocol_family != ProtocolFamily::Unknown
            && (self.chain_id().is_some() || self.network_id().is_some())
    }

    /// Numeric EVM chain id, when this is an EVM identity carrying one.
    pub fn evm_chain_id(&self) -> Option<u64> {
        if self.protocol_family != ProtocolFamily::Evm {
            return None;
        }
        self.chain_id().and_then(|c| c.parse().ok())
    }

    pub fn chain(&self) -> WalletResult<&'static ChainConfig> {
        resolve_identity(self)
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.network_id(), self.chain_id()) {
            (Some(n), _) => write!(f, "{}:{n}", self.protocol_family),
            (None, Some(c)) => write!(f, "{}:chain-{c}", self.protocol_family),
            (None, None) => write!(f, "{}:?", self.protocol_family),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub network_id: &'static str,
    pub chain_id: &'static str,
    pub family: ProtocolFamily,
    pub display_name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u32,
    pub explorer_url: &'static str,
    /// Appended to explorer transaction links (cluster selector on Solana).
    pub explorer_query: &'static str,
    pub rpc_url: &'static str,
    pub fallback_rpc_urls: &'static [&'static str],
    pub testnet: bool,
}

impl ChainConfig {
    /// The canonical identity: family plus both keys.
    pub fn identity(&self) -> NetworkIdentity {
        NetworkIdentity::new(self.family, Some(self.chain_id), Some(self.network_id))
    }

    pub fn explorer_tx_url(&self, id: &str) -> String {
        format!("{}/tx/{id}{}", self.explorer_url, self.explorer_query)
    }

    pub fn evm_chain_id(&self) -> Option<u64> {
        if self.family == ProtocolFamily::Evm {
            self.chain_id.parse().ok()
        } else {
            None
        }
    }

    pub fn rpc_urls(&self) -> Vec<String> {
        std::iter::once(self.rpc_url)
            .chain(self.fallback_rpc_urls.iter().copied())
            .map(str::to_owned)
            .collect()
    }
}

#[expect(clippy::too_many_arguments, reason = "one call per table row")]
const fn evm(
    network_id: &'static str,
    chain_id: &'static str,
    display_name: &'static str,
    native_symbol: &'static str,
    explorer_url: &'static str,
    rpc_url: &'static str,
    fallback_rpc_urls: &'static [&'static str],
    testnet: bool,
) -> ChainConfig {
    ChainConfig {
        network_id,
        chain_id,
        family: ProtocolFamily::Evm,
        display_name,
        native_symbol,
        native_decimals: 18,
        explorer_url,
        explorer_query: "",
        rpc_url,
        fallback_rpc_urls,
        testnet,
    }
}

const fn svm(
    network_id: &'static str,
    chain_id: &'static str,
    display_name: &'static str,
    explorer_query: &'static str,
    rpc_url: &'static str,
    testnet: bool,
) -> ChainConfig {
    ChainConfig {
        network_id,
        chain_id,
        family: ProtocolFamily::Svm,
        display_name,
        native_symbol: "SOL",
        native_decimals: 9,
        explorer_url: "https://explorer.solana.com",
        explorer_query,
        rpc_url,
        fallback_rpc_urls: &[],
        testnet,
    }
}

pub const CHAINS: &[ChainConfig] = &[
    evm(
        "ethereum-mainnet",
        "1",
        "Ethereum",
        "ETH",
        "https://etherscan.io",
        "https://eth.llamarpc.com",
        &["https://cloudflare-eth.com"],
        false,
    ),
    evm(
        "ethereum-sepolia",
        "11155111",
        "Ethereum Sepolia",
        "ETH",
        "https://sepolia.etherscan.io",
        "https://rpc.sepolia.org",
        &[],
        true,
    ),
    evm(
        "base-mainnet",
        "8453",
        "Base",
        "ETH",
        "https://basescan.org",
        "https://base.llamarpc.com",
        &["https://mainnet.base.org"],
        false,
    ),
    evm(
        "base-sepolia",
        "84532",
        "Base Sepolia",
        "ETH",
        "https://sepolia.basescan.org",
        "https://sepolia.base.org",
        &[],
        true,
    ),
    evm(
        "arbitrum-mainnet",
        "42161",
        "Arbitrum One",
        "ETH",
        "https://arbiscan.io",
        "https://arbitrum.llamarpc.com",
        &["https://arb1.arbitrum.io/rpc"],
        false,
    ),
    evm(
        "arbitrum-sepolia",
        "421614",
        "Arbitrum Sepolia",
        "ETH",
        "https://sepolia.arbiscan.io",
        "https://sepolia-rollup.arbitrum.io/rpc",
        &[],
        true,
    ),
    evm(
        "optimism-mainnet",
        "10",
        "OP Mainnet",
        "ETH",
        "https://optimistic.etherscan.io",
        "https://optimism.llamarpc.com",
        &["https://mainnet.optimism.io"],
        false,
    ),
    evm(
        "optimism-sepolia",
        "11155420",
        "OP Sepolia",
        "ETH",
        "https://sepolia-optimism.etherscan.io",
        "https://sepolia.optimism.io",
        &[],
        true,
    ),
    evm(
        "polygon-mainnet",
        "137",
        "Polygon",
        "POL",
        "https://polygonscan.com",
        "https://polygon.llamarpc.com",
        &["https://polygon-rpc.com"],
        false,
    ),
    evm(
        "polygon-amoy",
        "80002",
        "Polygon Amoy",
        "POL",
        "https://amoy.polygonscan.com",
        "https://rpc-amoy.polygon.technology",
        &[],
        true,
    ),
    svm(
        "solana-mainnet",
        SOLANA_MAINNET_GENESIS,
        "Solana",
        "",
        "https://api.mainnet-beta.solana.com",
        false,
    ),
    svm(
        "solana-devnet",
        SOLANA_DEVNET_GENESIS,
        "Solana Devnet",
        "?cluster=devnet",
        "https://api.devnet.solana.com",
        true,
    ),
    svm(
        "solana-testnet",
        SOLANA_TESTNET_GENESIS,
        "Solana Testnet",
        "?cluster=testnet",
        "https://api.testnet.solana.com",
        true,
    ),
];

pub const fn all_chains() -> &'static [ChainConfig] {
    CHAINS
}

pub fn chain_by_network_id(network_id: &str) -> WalletResult<&'static ChainConfig> {
    let key = network_id.trim();
    CHAINS
        .iter()
        .find(|c| c.network_id.eq_ignore_ascii_case(key))
        .ok_or_else(|| WalletError::UnsupportedNetwork(format!("network id {key:?}")))
}

pub fn chain_by_chain_id(
    family: ProtocolFamily,
    chain_id: &str,
) -> WalletResult<&'static ChainConfig> {
    let key = chain_id.trim();
    CHAINS
        .iter()
        .find(|c| c.family == family && c.chain_id == key)
        .ok_or_else(|| WalletError::UnsupportedNetwork(format!("{family} chain id {key:?}")))
}

/// Resolve either a network id or a chain id to its canonical identity.
///
/// EVM chain ids are decimal and Solana chain ids are base58 genesis hashes, so a bare key is
/// never ambiguous across families.
pub fn resolve(key: &str) -> WalletResult<NetworkIdentity> {
    let key = key.trim();
    if let Ok(c) = chain_by_network_id(key) {
        return Ok(c.identity());
    }
    CHAINS
        .iter()
        .find(|c| c.chain_id == key)
        .map(ChainConfig::identity)
        .ok_or_else(|| WalletError::UnsupportedNetwork(format!("{key:?}")))
}

/// Look up the table row for a (possibly partial) identity. When both keys are present they must
/// name the same row.
pub fn resolve_identity(id: &NetworkIdentity) -> WalletResult<&'static ChainConfig> {
    if !id.is_well_formed() {
        return Err(WalletError::UnsupportedNetwork(format!(
            "malformed network identity {id}"
        )));
    }
    let by_network = id.network_id().map(chain_by_network_id).transpose()?;
    let by_chain = id
        .chain_id()
        .map(|c| chain_by_chain_id(id.protocol_family, c))
        .transpose()?;
    let row = match (by_network, by_chain) {
        (Some(a), Some(b)) if a.network_id != b.network_id => {
            return Err(WalletError::UnsupportedNetwork(format!(
                "{id}: chain id and network id disagree"
            )));
        }
        (Some(c), _) | (None, Some(c)) => c,
        (None, None) => {
            return Err(WalletError::UnsupportedNetwork(format!(
                "{id}: no chain id or network id"
            )));
        }
    };
    if row.family != id.protocol_family {
        return Err(WalletError::UnsupportedNetwork(format!(
            "{id}: {} belongs to family {}",
            row.network_id, row.family
        )));
    }
    Ok(row)
}

/// Explorer link for a transaction on `network`.
pub fn explorer_tx_url(network: &NetworkIdentity, id: &str) -> WalletResult<String> {
    resolve_identity(network).map(|c| c.explorer_tx_url(id))
}
