use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AgentError, Result};
use crate::llm::types::*;
use crate::llm::GenerationClient;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Client for Groq's OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GROQ_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(AgentError::Provider(format!(
                "Groq API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: ChatResponse = res.json().await?;
        body.choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices returned".to_string()))?
            .message
            .content
            .ok_or_else(|| AgentError::Provider("Choice has no content".to_string()))
    }
}

#[async_trait]
impl GenerationClient for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        self.chat(prompt, temperature).await
    }
}
