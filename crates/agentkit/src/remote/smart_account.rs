use super::custodial::{HttpCustodialApi, RemoteAccount};
use crate::wallet::evm::Call;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Where a submitted user operation stands with the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOperationStatus {
    Pending,
    Complete { tx_hash: Option<String> },
    Failed { tx_hash: Option<String> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserOperationResponse {
    status: String,
    #[serde(default)]
    transaction_hash: Option<String>,
}

impl From<UserOperationResponse> for UserOperationStatus {
    fn from(r: UserOperationResponse) -> Self {
        let tx_hash = r.transaction_hash.filter(|h| !h.trim().is_empty());
        match r.status.to_ascii_lowercase().as_str() {
            "complete" | "completed" => Self::Complete { tx_hash },
            "failed" | "dropped" => Self::Failed { tx_hash },
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreparedUserOperation {
    user_op_hash: B256,
}

/// Account-abstraction service: owns the smart account contract, builds user operations and
/// relays them to a bundler.
#[async_trait]
pub trait SmartAccountApi: Send + Sync {
    async fn create_smart_account(
        &self,
        owner: Address,
        idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount>;

    async fn get_smart_account(&self, address: &str) -> eyre::Result<RemoteAccount>;

    /// Build a user operation for `calls` and return the hash the owner must sign.
    async fn prepare_user_operation(
        &self,
        smart_account: &str,
        network_id: &str,
        calls: &[Call],
        paymaster_url: Option<&str>,
    ) -> eyre::Result<B256>;

    async fn send_user_operation(
        &self,
        smart_account: &str,
        user_op_hash: B256,
        signature: &str,
    ) -> eyre::Result<()>;

    async fn user_operation_status(
        &self,
        smart_account: &str,
        user_op_hash: B256,
    ) -> eyre::Result<UserOperationStatus>;
}

/// The smart-account endpoints live on the same REST service as the custodial signer.
#[async_trait]
impl SmartAccountApi for HttpCustodialApi {
    async fn create_smart_account(
        &self,
        owner: Address,
        idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount> {
        self.service()
            .post(
                "/v2/evm/smart-accounts",
                &json!({ "owners": [format!("{owner:#x}")] }),
                &[("x-idempotency-key", idempotency_key)],
            )
            .await
    }

    async fn get_smart_account(&self, address: &str) -> eyre::Result<RemoteAccount> {
        self.service()
            .get(&format!("/v2/evm/smart-accounts/{address}"))
            .await
    }

    async fn prepare_user_operation(
        &self,
        smart_account: &str,
        network_id: &str,
        calls: &[Call],
        paymaster_url: Option<&str>,
    ) -> eyre::Result<B256> {
        let mut body = json!({ "network": network_id, "calls": calls });
        if let (Some(url), Some(obj)) = (paymaster_url, body.as_object_mut()) {
            obj.insert("paymasterUrl".into(), json!(url));
        }
        let r: PreparedUserOperation = self
            .service()
            .post(
                &format!("/v2/evm/smart-accounts/{smart_account}/user-operations"),
                &body,
                &[],
            )
            .await?;
        Ok(r.user_op_hash)
    }

    async fn send_user_operation(
        &self,
        smart_account: &str,
        user_op_hash: B256,
        signature: &str,
    ) -> eyre::Result<()> {
        let _: serde_json::Value = self
            .service()
            .post(
                &format!(
                    "/v2/evm/smart-accounts/{smart_account}/user-operations/{user_op_hash:#x}/send"
                ),
                &json!({ "signature": signature }),
                &[],
            )
            .await?;
        Ok(())
    }

    async fn user_operation_status(
        &self,
        smart_account: &str,
        user_op_hash: B256,
    ) -> eyre::Result<UserOperationStatus> {
        let r: UserOperationResponse = self
            .service()
            .get(&format!(
                "/v2/evm/smart-accounts/{smart_account}/user-operations/{user_op_hash:#x}"
            ))
            .await?;
        Ok(r.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str, hash: Option<&str>) -> UserOperationStatus {
        UserOperationResponse {
            status: s.into(),
            transaction_hash: hash.map(str::to_owned),
        }
        .into()
    }

    #[test]
    fn bundler_statuses_map_onto_three_outcomes() {
        assert_eq!(
            status("complete", Some("0xaa")),
            UserOperationStatus::Complete {
                tx_hash: Some("0xaa".into())
            }
        );
        assert_eq!(
            status("dropped", None),
            UserOperationStatus::Failed { tx_hash: None }
        );
        assert_eq!(status("broadcast", None), UserOperationStatus::Pending);
        assert_eq!(status("signed", Some("0xbb")), UserOperationStatus::Pending);
    }

    #[test]
    fn blank_hash_counts_as_missing() {
        assert_eq!(
            status("complete", Some("  ")),
            UserOperationStatus::Complete { tx_hash: None }
        );
    }

    #[test]
    fn wire_shape_is_camel_case() -> eyre::Result<()> {
        let r: UserOperationResponse = serde_json::from_str(
            r#"{"status":"complete","transactionHash":"0x01","userOpHash":"0x02"}"#,
        )?;
        assert_eq!(r.transaction_hash.as_deref(), Some("0x01"));
        Ok(())
    }
}
