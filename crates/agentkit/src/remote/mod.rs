//! Clients for the hosted services some backends delegate to: a custodial signer, a
//! smart-account service and a cross-chain intent relayer. Each sits behind a trait so the
//! backends can be exercised against recording mocks.

pub mod custodial;
pub mod intent;
pub mod smart_account;

use eyre::Context as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const ALLOW_INSECURE_HTTP_ENV: &str = "AGENTKIT_ALLOW_INSECURE_HTTP";

fn allow_insecure_http() -> bool {
    std::env::var(ALLOW_INSECURE_HTTP_ENV)
        .ok()
        .is_some_and(|v| {
            matches!(
                v.as_str(),
                "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON"
            )
        })
}

fn host_prefix_ok(s: &str, prefix: &str) -> bool {
    if !s.starts_with(prefix) {
        return false;
    }
    matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
}

fn is_loopback_http(url: &str) -> bool {
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

/// Credentials only travel over TLS, except to a local service during development.
pub fn base_url_is_allowed(url: &str) -> bool {
    let s = url.trim();
    s.starts_with("https://") || is_loopback_http(s) || allow_insecure_http()
}

/// A JSON-over-HTTP service with fixed auth headers.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    base_url: String,
    http: Client,
}

impl ServiceClient {
    /// `headers` are sent with every request; values are marked sensitive so they stay out of
    /// debug output.
    pub fn new(base_url: &str, headers: &[(&'static str, &str)]) -> eyre::Result<Self> {
        if !base_url_is_allowed(base_url) {
            eyre::bail!("refusing non-https service url: {base_url}");
        }
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let mut v = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            v.set_sensitive(true);
            map.insert(HeaderName::from_static(*name), v);
        }
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .default_headers(map)
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        extra: &[(&'static str, &str)],
    ) -> eyre::Result<T> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.post(&url).json(body);
        for (name, value) in extra {
            req = req.header(*name, *value);
        }
        req.send()
            .await
            .with_context(|| format!("POST {path}"))?
            .error_for_status()
            .with_context(|| format!("POST {path} status"))?
            .json::<T>()
            .await
            .with_context(|| format!("POST {path} json"))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> eyre::Result<T> {
        let url = format!("{}{path}", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?
            .error_for_status()
            .with_context(|| format!("GET {path} status"))?
            .json::<T>()
            .await
            .with_context(|| format!("GET {path} json"))
    }
}
