use crate::wallet::lifecycle::TxReceipt;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use thiserror::Error;

/// A structured error suitable for returning to an agent's tool-calling layer.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ToolError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new("invalid_arguments", message)
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Error, Clone)]
pub enum WalletError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("no confirmation for {id} after {waited_ms}ms; re-poll before resubmitting")]
    ConfirmationTimeout { id: String, waited_ms: u64 },

    #[error("transaction {} failed on-chain", receipt.id)]
    TransactionFailed { receipt: Box<TxReceipt> },

    #[error("insufficient funds: balance {have}, required {need}")]
    InsufficientFunds { have: String, need: String },

    #[error("{provider} does not support {operation}")]
    UnsupportedOperation {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transaction state: {0}")]
    InvalidState(String),
}

impl WalletError {
    pub fn signing(e: impl Display) -> Self {
        Self::Signing(format!("{e:#}"))
    }

    pub fn submission(e: impl Display) -> Self {
        Self::Submission(format!("{e:#}"))
    }

    pub fn rpc(e: impl Display) -> Self {
        Self::Rpc(format!("{e:#}"))
    }

    pub fn invalid_input(e: impl Display) -> Self {
        Self::InvalidInput(format!("{e:#}"))
    }

    pub fn configuration(e: impl Display) -> Self {
        Self::Configuration(format!("{e:#}"))
    }

    pub fn confirmation_timeout(id: &str, waited: std::time::Duration) -> Self {
        Self::ConfirmationTimeout {
            id: id.to_owned(),
            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub const fn unsupported(provider: &'static str, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            provider,
            operation,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::UnsupportedNetwork(_) => "unsupported_network",
            Self::Signing(_) => "signing_error",
            Self::Submission(_) => "submission_error",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::Rpc(_) => "rpc_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<WalletError> for ToolError {
    fn from(e: WalletError) -> Self {
        let code = e.code();
        let data = match &e {
            WalletError::ConfirmationTimeout { id, .. } => serde_json::json!({ "id": id }),
            WalletError::TransactionFailed { receipt } => {
                serde_json::to_value(receipt.as_ref()).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };
        Self::new(code, e.to_string()).with_data(data)
    }
}
