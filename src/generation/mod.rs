// Answer generation: prompt assembly, completion calls and the relevance gate

pub mod prompt;
pub mod safeguard;


use tracing::debug;

use crate::Result;
use crate::config::Config;
use crate::embeddings::ollama::{GenerateRequest, OllamaClient};
use crate::http::run_blocking;

pub use prompt::{NO_INFORMATION_ANSWER, PromptContext, build_prompt};
pub use safeguard::{OFF_TOPIC_ANSWER, Safeguard};

/// Sampling settings for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub stop: Option<Vec<String>>,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationOptions {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: 0.7,
            stop: None,
            max_tokens: None,
        }
    }
}

impl GenerationOptions {
    #[inline]
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }
}

/// Runs non-streaming completions against the Ollama generation endpoint
#[derive(Debug, Clone)]
pub struct Generator {
    client: OllamaClient,
}

impl Generator {
    #[inline]
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(OllamaClient::new(&config.ollama)?))
    }

    /// Completion text for `prompt`, empty when the backend returned none
    #[inline]
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            temperature: options.temperature,
            stop: options.stop.clone(),
            max_tokens: options.max_tokens,
        };

        let client = self.client.clone();
        let response = run_blocking(move || client.generate(&request)).await?;
        let text = response.completion_text().to_string();

        debug!("{} returned {} chars", model, text.chars().count());
        Ok(text)
    }
}
