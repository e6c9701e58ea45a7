//! User settings as written by the settings page. Read from disk on every
//! use so edits apply to the next request without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::EnhanceError;
use crate::prompts::{normalize_custom, Prompt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_provider")]
    pub llm_provider: String,
    #[serde(default = "default_model")]
    pub llm_model: String,
    #[serde(default)]
    pub custom_endpoint: String,
    #[serde(default)]
    pub custom_prompts: Vec<Prompt>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            llm_provider: default_provider(),
            llm_model: default_model(),
            custom_endpoint: String::new(),
            custom_prompts: Vec::new(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

pub fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// JSON key-value document shared with the settings page.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Settings, EnhanceError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(error) => {
                return Err(EnhanceError::Config(format!(
                    "failed to read settings {}: {error}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }

        let mut settings: Settings = serde_json::from_str(&raw).map_err(|error| {
            EnhanceError::Config(format!(
                "invalid settings in {}: {error}",
                self.path.display()
            ))
        })?;
        settings.custom_prompts = normalize_custom(settings.custom_prompts);
        Ok(settings)
    }
}
