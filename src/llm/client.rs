use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AgentError, Result};
use crate::llm::types::*;
use crate::llm::GenerationClient;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Point the client at a different endpoint (proxies, local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig {
                temperature,
                response_mime_type: "text/plain".to_string(),
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(AgentError::Provider(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        let candidate = body
            .candidates
            .ok_or_else(|| AgentError::Provider("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("Empty candidates list".to_string()))?;

        if candidate.content.parts.is_empty() {
            return Err(AgentError::Provider("No parts in content".to_string()));
        }

        Ok(candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.generate_content(prompt, temperature).await
    }
}
