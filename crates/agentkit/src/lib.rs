//! Multi-chain wallet toolkit for autonomous agents.
//!
//! One [`wallet::WalletProvider`] contract across local, custodial, smart-account and intent
//! backends on EVM and Solana networks, plus network-scoped [`action::ActionProvider`]s that
//! [`agentkit::AgentKit`] flattens into a single tool set.

pub mod action;
pub mod agentkit;
pub mod amount;
pub mod chains;
pub mod config;
pub mod errors;
pub mod network;
pub mod paths;
pub mod remote;
pub mod retry;
pub mod store;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use crate::agentkit::{ActionSet, AgentKit, ProviderPartition};
