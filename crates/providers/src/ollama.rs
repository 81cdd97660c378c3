use crate::{GenerateResponse, ProviderError, TextGenerator};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Text generation against a local Ollama server.
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    cfg: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(cfg: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .expect("http client");
        Self { client, cfg }
    }
}

#[derive(Deserialize)]
struct OllamaApiResponse {
    response: String,
}

#[async_trait::async_trait]
impl TextGenerator for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }

        let body = GenerateRequest {
            model: &self.cfg.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.cfg.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "status {}",
                resp.status()
            )));
        }

        let parsed: OllamaApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(GenerateResponse { text })
    }
}
