pub mod client;
pub mod groq;
pub mod prompts;
pub mod registry;
pub mod types;

pub use client::*;
pub use groq::*;
pub use prompts::*;
pub use registry::*;

use async_trait::async_trait;

use crate::error::Result;

/// Anything that can turn a prompt into generated text.
///
/// Errors returned here are fatal for the run (missing credentials, provider outages);
/// poor generations are judged downstream, not here.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Removes markdown code fences a model may wrap around the module.
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
