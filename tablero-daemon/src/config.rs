use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Daemon configuration loaded from file and/or environment.
///
/// `convex_url` absent means no cloud backend is configured; the engine
/// then runs in local mode. It is not a configuration error.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub convex_url: Option<String>,
    pub vault_root: PathBuf,
    pub http_port: u16,
}

/// Raw TOML file structure for `~/.config/tablero/config.toml`.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    convex_url: Option<String>,
    vault_root: Option<PathBuf>,
    http_port: Option<u16>,
}

/// Default config file location.
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablero")
        .join("config.toml")
}

impl DaemonConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Priority: environment variables override file values. The file
    /// path can be overridden by `config_path`.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = config_path.cloned().unwrap_or_else(default_config_path);

        let file_config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        } else {
            ConfigFile::default()
        };

        Ok(Self::from_file_and_env(file_config))
    }

    /// Build config from parsed file values and current environment.
    fn from_file_and_env(file_config: ConfigFile) -> Self {
        let convex_url = std::env::var("TABLERO_CONVEX_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(file_config.convex_url.filter(|s| !s.is_empty()));
        let vault_root = std::env::var("TABLERO_VAULT_ROOT")
            .ok()
            .map(PathBuf::from)
            .or(file_config.vault_root)
            .unwrap_or_else(tablero_data::LocalVault::default_root);
        let http_port = std::env::var("TABLERO_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .or(file_config.http_port)
            .unwrap_or(7930);

        Self {
            convex_url,
            vault_root,
            http_port,
        }
    }
}
