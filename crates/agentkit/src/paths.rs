use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

pub const CONFIG_DIR_ENV: &str = "AGENTKIT_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "AGENTKIT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct AgentKitPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl AgentKitPaths {
    pub fn discover() -> eyre::Result<Self> {
        let env_dir = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };

        let (config_dir, data_dir) = match (env_dir(CONFIG_DIR_ENV), env_dir(DATA_DIR_ENV)) {
            (Some(c), Some(d)) => (c, d),
            (c, d) => {
                // macOS: ~/Library/Application Support/agentkit
                // Linux: ~/.config/agentkit, ~/.local/share/agentkit
                let proj = ProjectDirs::from("", "", "agentkit")
                    .context("failed to resolve project dirs")?;
                (
                    c.unwrap_or_else(|| proj.config_dir().to_path_buf()),
                    d.unwrap_or_else(|| proj.data_dir().to_path_buf()),
                )
            }
        };

        Ok(Self::rooted(config_dir, data_dir))
    }

    pub fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            log_file: data_dir.join("agentkit.log.jsonl"),
            config_dir,
            data_dir,
        }
    }
}
