#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::http::{self, HttpResponse, JsonMethod};
use crate::{RagError, Result};

/// Blocking client for the Ollama HTTP API.
///
/// Cloning is cheap: the underlying agent shares its connection pool, so
/// async callers clone the client into `spawn_blocking` tasks.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Body of a non-streaming `/api/generate` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Completion returned by the generation endpoint. Servers disagree on the
/// field that carries the text, so every known one is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub generated_text: Option<String>,
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: String,
}

impl GenerateResponse {
    /// `response` when non-empty, then `generated_text`, then nothing
    #[inline]
    pub fn completion_text(&self) -> &str {
        match (&self.response, &self.generated_text) {
            (Some(response), _) if !response.is_empty() => response.as_str(),
            (_, Some(generated)) => generated.as_str(),
            _ => "",
        }
    }

    /// Like [`Self::completion_text`], falling back to a chat-style `message.content`
    #[inline]
    pub fn any_text(&self) -> &str {
        let text = self.completion_text();
        if text.is_empty() {
            self.message.as_ref().map_or("", |m| m.content.as_str())
        } else {
            text
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(format!("Failed to build Ollama URL: {}", e)))?;

        Ok(Self {
            base_url,
            agent: http::build_agent(Duration::from_secs(config.timeout_secs)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::build_agent(timeout);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.list_models().map(|_| ())
    }

    /// List all locally available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response = http::get(&self.agent, url.as_str())
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to reach Ollama: {}", e)))?;
        if !response.is_success() {
            return Err(RagError::Other(anyhow::anyhow!(
                "Ollama responded with HTTP {} to {}",
                response.status,
                url
            )));
        }

        let models: ModelsResponse = serde_json::from_str(&response.body)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Invalid models response: {}", e)))?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    /// Embed one text with `model`
    #[inline]
    pub fn embedding(&self, model: &str, prompt: &str) -> Result<Vec<f32>> {
        let url = self.endpoint("/api/embeddings")?;
        let body = serde_json::to_string(&EmbedRequest { model, prompt })
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {}", e)))?;

        debug!(
            "Requesting embedding from {} (model {}, {} chars)",
            url,
            model,
            prompt.chars().count()
        );

        let response = http::send_json(&self.agent, JsonMethod::Post, url.as_str(), &body)
            .map_err(|e| RagError::Embedding(format!("Request to {} failed: {}", url, e)))?;
        if !response.is_success() {
            warn!("Embedding request failed with HTTP {}", response.status);
            return Err(RagError::Embedding(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&response.body)
            .map_err(|e| RagError::Embedding(format!("Invalid embedding response: {}", e)))?;
        if parsed.embedding.is_empty() {
            return Err(RagError::Embedding(
                "Response contained no embedding".to_string(),
            ));
        }

        debug!("Received embedding with {} dimensions", parsed.embedding.len());
        Ok(parsed.embedding)
    }

    /// Run a non-streaming completion
    #[inline]
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = self.endpoint("/api/generate")?;
        let body = serde_json::to_string(request).map_err(|e| RagError::Generation {
            status: None,
            body: format!("Failed to serialize request: {}", e),
        })?;

        debug!(
            "Requesting completion from {} (model {}, temperature {})",
            url, request.model, request.temperature
        );

        let response = http::send_json(&self.agent, JsonMethod::Post, url.as_str(), &body)
            .map_err(|e| RagError::Generation {
                status: None,
                body: e.to_string(),
            })?;

        parse_generate_response(response)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Invalid Ollama endpoint {}: {}", path, e)))
    }
}

fn parse_generate_response(response: HttpResponse) -> Result<GenerateResponse> {
    if !response.is_success() {
        return Err(RagError::Generation {
            status: Some(response.status),
            body: response.body,
        });
    }

    serde_json::from_str(&response.body).map_err(|e| RagError::Generation {
        status: Some(response.status),
        body: format!("Invalid completion response: {}", e),
    })
}
