//! The transaction lifecycle shared by every backend:
//! `Unsigned -> Signed -> Submitted -> Confirmed | Failed`.

use crate::errors::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Unsigned,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// Terminal status reported by the network's finality primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Chain-native identifier: transaction hash or signature.
    pub id: String,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block: Option<u64>,
    /// Fee actually charged, in base units, when the network reports it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fee_paid: Option<String>,
}

impl TxReceipt {
    pub fn confirmed(id: impl Into<String>, block: Option<u64>) -> Self {
        Self {
            id: id.into(),
            status: TxStatus::Confirmed,
            block,
            fee_paid: None,
        }
    }

    pub fn failed(id: impl Into<String>, block: Option<u64>) -> Self {
        Self {
            id: id.into(),
            status: TxStatus::Failed,
            block,
            fee_paid: None,
        }
    }
}

/// Tracks one in-flight transaction. Transitions out of order are rejected, so a backend cannot
/// report `Submitted` for something that was never signed.
#[derive(Debug)]
pub struct Lifecycle {
    backend: &'static str,
    state: TxState,
    id: Option<String>,
}

impl Lifecycle {
    pub fn new(backend: &'static str) -> Self {
        tracing::debug!(backend, state = ?TxState::Unsigned, "tx lifecycle");
        Self {
            backend,
            state: TxState::Unsigned,
            id: None,
        }
    }

    pub const fn state(&self) -> TxState {
        self.state
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn advance(&mut self, next: TxState) -> WalletResult<()> {
        let ok = matches!(
            (self.state, next),
            (TxState::Unsigned, TxState::Signed)
                | (TxState::Signed, TxState::Submitted)
                | (TxState::Submitted, TxState::Confirmed | TxState::Failed)
        );
        if !ok {
            return Err(WalletError::InvalidState(format!(
                "{}: {:?} -> {next:?}",
                self.backend, self.state
            )));
        }
        self.state = next;
        tracing::debug!(backend = self.backend, state = ?next, id = ?self.id, "tx lifecycle");
        Ok(())
    }

    pub fn signed(&mut self) -> WalletResult<()> {
        self.advance(TxState::Signed)
    }

    /// A rejected transition leaves the recorded id untouched.
    pub fn submitted(&mut self, id: &str) -> WalletResult<()> {
        let prev = self.id.replace(id.to_owned());
        if let Err(e) = self.advance(TxState::Submitted) {
            self.id = prev;
            return Err(e);
        }
        Ok(())
    }

    /// Record the terminal receipt. A failed receipt becomes an error that still carries it.
    pub fn finish(&mut self, receipt: TxReceipt) -> WalletResult<TxReceipt> {
        match receipt.status {
            TxStatus::Confirmed => {
                self.advance(TxState::Confirmed)?;
                Ok(receipt)
            }
            TxStatus::Failed => {
                self.advance(TxState::Failed)?;
                Err(WalletError::TransactionFailed {
                    receipt: Box::new(receipt),
                })
            }
        }
    }
}
