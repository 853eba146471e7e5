#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use agentkit::amount::format_units;
use agentkit::config::AgentKitConfig;
use agentkit::network::all_chains;
use agentkit::paths::AgentKitPaths;
use agentkit::store::ConfigStore;
use agentkit::wallet::{Wallet, WalletProvider as _};
use agentkit::AgentKit;
use clap::{Parser, Subcommand};
use eyre::Context as _;
use serde_json::{json, Value};
use tracing_subscriber::prelude::*;

mod cli_output;

#[derive(Parser, Debug)]
#[command(name = "agentkit", version, about = "Multi-chain wallet toolkit for agents")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the networks a wallet can be configured on.
    Networks {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Build the configured wallet and print its address, network, backend and balance.
    Wallet,

    /// Print the tool schemas available to an agent on the configured network.
    Actions,

    /// Invoke one action against the configured wallet.
    Invoke {
        name: String,
        /// JSON object of arguments (defaults to `{}`).
        #[arg(long)]
        args: Option<String>,
    },

    /// Print config/data/log locations as JSON.
    Paths,
}

fn init_logging(paths: &AgentKitPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("agentkit.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn networks(json: bool) -> eyre::Result<()> {
    if json {
        let list: Vec<Value> = all_chains()
            .iter()
            .map(|c| {
                json!({
                    "networkId": c.network_id,
                    "chainId": c.chain_id,
                    "protocolFamily": c.family,
                    "displayName": c.display_name,
                    "nativeSymbol": c.native_symbol,
                    "nativeDecimals": c.native_decimals,
                    "explorerUrl": c.explorer_url,
                    "testnet": c.testnet,
                })
            })
            .collect();
        return cli_output::write_json(&Value::Array(list), true);
    }
    let rows: Vec<[String; 5]> = all_chains()
        .iter()
        .map(|c| {
            [
                c.network_id.to_owned(),
                c.chain_id.to_owned(),
                c.family.to_string(),
                c.native_symbol.to_owned(),
                c.testnet.to_string(),
            ]
        })
        .collect();
    cli_output::write_line(&cli_output::networks_table(&rows))
}

async fn wallet(cfg: &AgentKitConfig) -> eyre::Result<()> {
    let w = Wallet::from_config(cfg).await.context("build wallet")?;
    let chain = cfg.chain()?;
    let balance = w.balance().await.context("fetch balance")?;
    cli_output::write_json(
        &json!({
            "address": w.address(),
            "network": w.network(),
            "backend": w.name(),
            "nativeSymbol": chain.native_symbol,
            "balance": format_units(balance, chain.native_decimals),
        }),
        true,
    )
}

async fn actions(cfg: &AgentKitConfig) -> eyre::Result<()> {
    let kit = AgentKit::from_config(cfg).await.context("build agentkit")?;
    cli_output::write_json(&kit.actions().tool_schemas(), true)
}

async fn invoke(cfg: &AgentKitConfig, name: &str, args: Option<&str>) -> eyre::Result<()> {
    let args: Value = match args {
        Some(s) => serde_json::from_str(s).context("--args must be a JSON object")?,
        None => json!({}),
    };
    if !(args.is_object() || args.is_null()) {
        eyre::bail!("--args must be a JSON object");
    }
    let kit = AgentKit::from_config(cfg).await.context("build agentkit")?;
    let set = kit.actions();
    let Some(action) = set.get(name) else {
        cli_output::note(&format!("available actions: {}", set.names().join(", ")));
        eyre::bail!("no action named {name:?} on {}", kit.wallet().network());
    };
    let out = action.invoke(args).await.map_err(|e| eyre::eyre!("{e}"))?;
    cli_output::write_line(&out)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = AgentKitPaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Networks { json } => networks(json),
        Command::Paths => cli_output::write_json(
            &json!({
                "config_dir": paths.config_dir,
                "data_dir": paths.data_dir,
                "config_file": paths.config_file,
                "log_file": paths.log_file,
            }),
            false,
        ),
        Command::Wallet => {
            let cfg = ConfigStore::new(&paths).load()?;
            wallet(&cfg).await
        }
        Command::Actions => {
            let cfg = ConfigStore::new(&paths).load()?;
            actions(&cfg).await
        }
        Command::Invoke { name, args } => {
            let cfg = ConfigStore::new(&paths).load()?;
            invoke(&cfg, &name, args.as_deref()).await
        }
    }
}
