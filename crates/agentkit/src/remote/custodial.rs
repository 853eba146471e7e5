use super::ServiceClient;
use crate::config::CustodialConfig;
use crate::errors::{WalletError, WalletResult};
use crate::network::ProtocolFamily;
use alloy::primitives::B256;
use async_trait::async_trait;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAccount {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A key-custody service that holds the signing keys and signs on request.
#[async_trait]
pub trait CustodialApi: Send + Sync {
    async fn create_account(
        &self,
        family: ProtocolFamily,
        idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount>;

    async fn get_account(&self, family: ProtocolFamily, address: &str)
        -> eyre::Result<RemoteAccount>;

    /// EIP-191 personal message signature, hex.
    async fn sign_evm_message(&self, address: &str, message: &[u8]) -> eyre::Result<String>;

    async fn sign_evm_typed_data(&self, address: &str, typed_data: &Value)
        -> eyre::Result<String>;

    /// Raw 32-byte hash signature, hex.
    async fn sign_evm_hash(&self, address: &str, hash: B256) -> eyre::Result<String>;

    /// Signs the EIP-2718 unsigned payload and returns the raw signed envelope.
    async fn sign_evm_transaction(&self, address: &str, unsigned: &[u8]) -> eyre::Result<Vec<u8>>;

    /// Signs a base64 serialized transaction; returns it base64 with the signature in place.
    async fn sign_solana_transaction(&self, address: &str, tx_base64: &str)
        -> eyre::Result<String>;
}

const fn family_segment(family: ProtocolFamily) -> &'static str {
    match family {
        ProtocolFamily::Svm => "solana",
        ProtocolFamily::Evm | ProtocolFamily::Unknown => "evm",
    }
}

fn decode_hex(s: &str) -> eyre::Result<Vec<u8>> {
    let t = s.trim();
    Ok(hex::decode(t.strip_prefix("0x").unwrap_or(t))?)
}

#[derive(Debug, Deserialize)]
struct SignatureResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedTransactionResponse {
    signed_transaction: String,
}

/// [`CustodialApi`] over the service's REST interface.
#[derive(Debug, Clone)]
pub struct HttpCustodialApi {
    svc: ServiceClient,
}

impl HttpCustodialApi {
    pub fn new(
        api_url: &str,
        api_key_id: &str,
        api_key_secret: &SecretString,
        wallet_secret: Option<&SecretString>,
    ) -> eyre::Result<Self> {
        let mut headers = vec![
            ("x-api-key-id", api_key_id),
            ("x-api-key-secret", api_key_secret.expose_secret()),
        ];
        if let Some(ws) = wallet_secret {
            headers.push(("x-wallet-secret", ws.expose_secret()));
        }
        Ok(Self {
            svc: ServiceClient::new(api_url, &headers)?,
        })
    }

    /// Build from config, failing with a configuration error when credentials are missing.
    pub fn from_config(cfg: &CustodialConfig) -> WalletResult<Self> {
        let (Some(id), Some(secret)) = (cfg.api_key_id.as_deref(), cfg.api_key_secret.as_ref())
        else {
            return Err(WalletError::Configuration(
                "custodial backend needs CDP_API_KEY_ID and CDP_API_KEY_SECRET".into(),
            ));
        };
        Self::new(&cfg.api_url, id, secret, cfg.wallet_secret.as_ref())
            .map_err(WalletError::configuration)
    }

    pub(crate) const fn service(&self) -> &ServiceClient {
        &self.svc
    }
}

#[async_trait]
impl CustodialApi for HttpCustodialApi {
    async fn create_account(
        &self,
        family: ProtocolFamily,
        idempotency_key: &str,
    ) -> eyre::Result<RemoteAccount> {
        let path = format!("/v2/{}/accounts", family_segment(family));
        self.svc
            .post(&path, &json!({}), &[("x-idempotency-key", idempotency_key)])
            .await
    }

    async fn get_account(
        &self,
        family: ProtocolFamily,
        address: &str,
    ) -> eyre::Result<RemoteAccount> {
        self.svc
            .get(&format!("/v2/{}/accounts/{address}", family_segment(family)))
            .await
    }

    async fn sign_evm_message(&self, address: &str, message: &[u8]) -> eyre::Result<String> {
        let r: SignatureResponse = self
            .svc
            .post(
                &format!("/v2/evm/accounts/{address}/sign/message"),
                &json!({ "message": format!("0x{}", hex::encode(message)) }),
                &[],
            )
            .await?;
        Ok(r.signature)
    }

    async fn sign_evm_typed_data(
        &self,
        address: &str,
        typed_data: &Value,
    ) -> eyre::Result<String> {
        let r: SignatureResponse = self
            .svc
            .post(
                &format!("/v2/evm/accounts/{address}/sign/typed-data"),
                typed_data,
                &[],
            )
            .await?;
        Ok(r.signature)
    }

    async fn sign_evm_hash(&self, address: &str, hash: B256) -> eyre::Result<String> {
        let r: SignatureResponse = self
            .svc
            .post(
                &format!("/v2/evm/accounts/{address}/sign"),
                &json!({ "hash": format!("{hash:#x}") }),
                &[],
            )
            .await?;
        Ok(r.signature)
    }

    async fn sign_evm_transaction(
        &self,
        address: &str,
        unsigned: &[u8],
    ) -> eyre::Result<Vec<u8>> {
        let r: SignedTransactionResponse = self
            .svc
            .post(
                &format!("/v2/evm/accounts/{address}/sign/transaction"),
                &json!({ "transaction": format!("0x{}", hex::encode(unsigned)) }),
                &[],
            )
            .await?;
        let raw = decode_hex(&r.signed_transaction)?;
        if raw.is_empty() {
            eyre::bail!("custodial signer returned an empty transaction");
        }
        Ok(raw)
    }

    async fn sign_solana_transaction(
        &self,
        address: &str,
        tx_base64: &str,
    ) -> eyre::Result<String> {
        let r: SignedTransactionResponse = self
            .svc
            .post(
                &format!("/v2/solana/accounts/{address}/sign/transaction"),
                &json!({ "transaction": tx_base64 }),
                &[],
            )
            .await?;
        Ok(r.signed_transaction)
    }
}
