use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::enhancer::{ProviderEngine, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::error::EnhanceError;
use crate::settings::{default_model, Settings};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiProvider {
    client: Client,
}

impl GeminiProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(settings: &Settings) -> String {
        let custom = settings.custom_endpoint.trim();
        if !custom.is_empty() {
            return custom.to_string();
        }
        let model = match settings.llm_model.trim() {
            "" => default_model(),
            model => model.to_string(),
        };
        format!("{API_BASE}/{model}:generateContent")
    }

    async fn run_gemini(&self, prompt_text: &str, settings: &Settings) -> Result<String, String> {
        let endpoint = Self::endpoint(settings);
        let payload = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt_text.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };
        debug!(endpoint = %endpoint, chars = prompt_text.len(), "calling gemini");

        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", settings.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|error| error.to_string())?;

        if !status.is_success() {
            return Err(format!(
                "Gemini API request failed ({status}): {}",
                api_error_message(&body)
            ));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|_| "Invalid response format from Gemini API".to_string())?;
        parsed
            .first_text()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| "Invalid response format from Gemini API".to_string())
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[async_trait]
impl ProviderEngine for GeminiProvider {
    async fn generate(&self, prompt_text: &str, settings: &Settings) -> Result<String, EnhanceError> {
        self.run_gemini(prompt_text, settings).await.map_err(|message| {
            error!("gemini API error: {message}");
            EnhanceError::Remote(format!("Gemini: {message}"))
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()
            .map(|part| part.text.as_str())
    }
}
