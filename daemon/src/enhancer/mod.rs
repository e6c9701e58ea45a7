mod gemini;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

pub use gemini::GeminiProvider;

use crate::error::EnhanceError;
use crate::settings::Settings;

/// Fixed generation parameters sent with every request.
pub const TEMPERATURE: f32 = 0.7;
pub const MAX_OUTPUT_TOKENS: u32 = 1000;

#[async_trait]
pub trait ProviderEngine: Send + Sync {
    /// Sends one fully composed prompt and returns the trimmed model output.
    async fn generate(&self, prompt_text: &str, settings: &Settings) -> Result<String, EnhanceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
}

impl ProviderKind {
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// Turns a prompt into model output using whichever provider the current
/// settings select. One attempt per call.
pub struct EnhancementClient {
    engines: HashMap<ProviderKind, Arc<dyn ProviderEngine>>,
}

impl EnhancementClient {
    pub fn new(http: Client) -> Self {
        let mut engines: HashMap<ProviderKind, Arc<dyn ProviderEngine>> = HashMap::new();
        engines.insert(ProviderKind::Gemini, Arc::new(GeminiProvider::new(http)));
        Self { engines }
    }

    #[cfg(test)]
    pub fn with_engine(kind: ProviderKind, engine: Arc<dyn ProviderEngine>) -> Self {
        Self {
            engines: HashMap::from([(kind, engine)]),
        }
    }

    pub async fn enhance(&self, prompt_text: &str, settings: &Settings) -> Result<String, EnhanceError> {
        let provider_id = settings.llm_provider.trim();
        if provider_id.is_empty() {
            return Err(EnhanceError::Config(
                "LLM provider not set. Please set it in the extension options.".to_string(),
            ));
        }
        let engine = ProviderKind::parse(provider_id)
            .and_then(|kind| self.engines.get(&kind))
            .ok_or_else(|| EnhanceError::Provider(provider_id.to_string()))?;
        if settings.api_key.trim().is_empty() {
            return Err(EnhanceError::Config(format!(
                "API key for {provider_id} not set. Please set it in the extension options."
            )));
        }

        engine.generate(prompt_text, settings).await
    }
}
