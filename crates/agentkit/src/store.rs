use crate::config::{
    secret, AgentKitConfig, CustodialConfig, IntentWalletConfig, LocalKeyConfig,
    SmartWalletConfig, WalletConfig,
};
use crate::paths::AgentKitPaths;
use eyre::Context as _;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(paths: &AgentKitPaths) -> Self {
        Self {
            path: paths.config_file.clone(),
        }
    }

    /// Read `config.toml` (absent means defaults), then layer the process environment on top.
    pub fn load(&self) -> eyre::Result<AgentKitConfig> {
        let mut cfg = if self.path.exists() {
            let s = fs::read_to_string(&self.path)
                .with_context(|| format!("read {}", self.path.display()))?;
            toml::from_str(&s).with_context(|| format!("parse {}", self.path.display()))?
        } else {
            AgentKitConfig::default()
        };
        apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
        Ok(cfg)
    }
}

fn switch_backend(cfg: &mut AgentKitConfig, name: &str) {
    if cfg.wallet.backend_name() == name {
        return;
    }
    let next = match name {
        "local" => WalletConfig::Local(LocalKeyConfig::default()),
        "custodial" => WalletConfig::Custodial(CustodialConfig::default()),
        "smart" => WalletConfig::Smart(SmartWalletConfig::default()),
        "intent" => WalletConfig::Intent(IntentWalletConfig::default()),
        other => {
            tracing::warn!(backend = other, "ignoring unknown AGENTKIT_WALLET_BACKEND");
            return;
        }
    };
    cfg.wallet = next;
}

fn apply_custodial_env(api: &mut CustodialConfig, env: &impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("CDP_API_URL") {
        api.api_url = v;
    }
    if let Some(v) = env("CDP_API_KEY_ID") {
        api.api_key_id = Some(v);
    }
    if let Some(v) = env("CDP_API_KEY_SECRET") {
        api.api_key_secret = Some(secret(&v));
    }
    if let Some(v) = env("CDP_WALLET_SECRET") {
        api.wallet_secret = Some(secret(&v));
    }
    if let Some(v) = env("IDEMPOTENCY_KEY") {
        api.idempotency_key = Some(v);
    }
}

/// Apply environment overrides. `lookup` returns the raw value of a variable, if set.
pub fn apply_env_overrides(cfg: &mut AgentKitConfig, lookup: impl Fn(&str) -> Option<String>) {
    let env = |k: &str| {
        lookup(k)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = env("NETWORK_ID") {
        cfg.network_id = Some(v);
    }
    if let Some(url) = env("AGENTKIT_RPC_URL") {
        let key = cfg.network_id().to_owned();
        cfg.rpc.urls.entry(key).or_default().insert(0, url);
    }

    if let Some(b) = env("AGENTKIT_WALLET_BACKEND") {
        switch_backend(cfg, &b.to_ascii_lowercase());
    }
    if matches!(cfg.wallet, WalletConfig::Unconfigured) {
        if env("CDP_API_KEY_ID").is_some() {
            switch_backend(cfg, "custodial");
        } else if ["PRIVATE_KEY", "SOLANA_PRIVATE_KEY", "MNEMONIC_PHRASE"]
            .iter()
            .any(|k| env(k).is_some())
        {
            switch_backend(cfg, "local");
        }
    }

    match &mut cfg.wallet {
        WalletConfig::Unconfigured => {}
        WalletConfig::Local(local) => {
            if let Some(v) = env("PRIVATE_KEY") {
                local.private_key = Some(secret(&v));
            }
            if let Some(v) = env("SOLANA_PRIVATE_KEY") {
                local.solana_private_key = Some(secret(&v));
            }
            if let Some(v) = env("MNEMONIC_PHRASE") {
                local.mnemonic = Some(secret(&v));
            }
        }
        WalletConfig::Custodial(api) => {
            apply_custodial_env(api, &env);
            if let Some(v) = env("WALLET_ADDRESS") {
                api.address = Some(v);
            }
        }
        WalletConfig::Smart(smart) => {
            apply_custodial_env(&mut smart.api, &env);
            if let Some(v) = env("PRIVATE_KEY") {
                smart.owner_private_key = Some(secret(&v));
            }
            if let Some(v) = env("WALLET_ADDRESS") {
                smart.smart_account_address = Some(v);
            }
            if let Some(v) = env("PAYMASTER_URL") {
                smart.paymaster_url = Some(v);
            }
        }
        WalletConfig::Intent(intent) => {
            if let Some(v) = env("PRIVATE_KEY") {
                intent.owner_private_key = Some(secret(&v));
            }
            if let Some(v) = env("ZERODEV_PROJECT_ID") {
                intent.project_id = Some(v);
            }
            if let Some(v) = env("ZERODEV_RELAYER_URL") {
                intent.relayer_url = v;
            }
        }
    }
}
