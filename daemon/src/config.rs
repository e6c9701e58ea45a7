use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub page: PageConfig,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&resolve_config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let raw = fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            let parsed: DaemonConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()))?;
            return Ok(parsed);
        }

        Ok(DaemonConfig::default())
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("THINKSTRAIGHT_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("thinkstraight").join("config.toml");
    }

    Path::new("/tmp/thinkstraight.toml").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    Path::new("/tmp/thinkstraight.sock").to_path_buf()
}

/// Outbound call budget enforced by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_max_per_window(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_max_per_window() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

fn default_settings_path() -> PathBuf {
    match dirs::config_dir() {
        Some(base) => base.join("thinkstraight").join("settings.json"),
        None => Path::new("/tmp/thinkstraight-settings.json").to_path_buf(),
    }
}

/// How the page-side listener is launched when a page context has none.
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_agent_path")]
    pub agent_path: String,
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            agent_path: default_agent_path(),
            ready_attempts: default_ready_attempts(),
            ready_interval_ms: default_ready_interval_ms(),
        }
    }
}

fn default_agent_path() -> String {
    "thinkstraight-page-agent".to_string()
}

fn default_ready_attempts() -> u32 {
    20
}

fn default_ready_interval_ms() -> u64 {
    50
}
