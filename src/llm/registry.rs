use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::client::{GeminiClient, DEFAULT_GEMINI_MODEL};
use crate::llm::groq::{GroqClient, DEFAULT_GROQ_MODEL};
use crate::llm::GenerationClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Groq,
    Gemini,
}

impl ProviderKind {
    pub fn credential_var(self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(AgentError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Groq => f.write_str("groq"),
            ProviderKind::Gemini => f.write_str("gemini"),
        }
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Process-scoped provider clients, each built at most once on first use.
pub struct ProviderRegistry {
    groq_model: String,
    gemini_model: String,
    lookup: Lookup,
    groq: OnceLock<Arc<GroqClient>>,
    gemini: OnceLock<Arc<GeminiClient>>,
}

impl ProviderRegistry {
    /// Credentials come from the process environment.
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            lookup: Box::new(lookup),
            groq: OnceLock::new(),
            gemini: OnceLock::new(),
        }
    }

    pub fn with_groq_model(mut self, model: impl Into<String>) -> Self {
        self.groq_model = model.into();
        self
    }

    pub fn with_gemini_model(mut self, model: impl Into<String>) -> Self {
        self.gemini_model = model.into();
        self
    }

    pub fn client(&self, kind: ProviderKind) -> Result<Arc<dyn GenerationClient>> {
        match kind {
            ProviderKind::Groq => {
                if let Some(client) = self.groq.get() {
                    return Ok(client.clone());
                }
                let key = self.credential(kind)?;
                debug!("Initializing groq client with model {}", self.groq_model);
                let client = Arc::new(GroqClient::new(key, self.groq_model.clone()));
                Ok(self.groq.get_or_init(|| client).clone())
            }
            ProviderKind::Gemini => {
                if let Some(client) = self.gemini.get() {
                    return Ok(client.clone());
                }
                let key = self.credential(kind)?;
                debug!("Initializing gemini client with model {}", self.gemini_model);
                let client = Arc::new(GeminiClient::new(key, self.gemini_model.clone()));
                Ok(self.gemini.get_or_init(|| client).clone())
            }
        }
    }

    fn credential(&self, kind: ProviderKind) -> Result<String> {
        let var = kind.credential_var();
        (self.lookup)(var)
            .filter(|v| !v.trim().is_empty())
            .ok_or(AgentError::MissingCredential(var))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(" Groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!(matches!(
            "openai".parse::<ProviderKind>(),
            Err(AgentError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_missing_credential_is_fatal() {
        let registry = ProviderRegistry::with_lookup(|_| None);
        match registry.client(ProviderKind::Gemini) {
            Err(AgentError::MissingCredential(var)) => assert_eq!(var, "GEMINI_API_KEY"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("client built without a credential"),
        }
    }

    #[test]
    fn test_clients_are_built_once() {
        let registry = ProviderRegistry::with_lookup(|key| {
            (key == "GROQ_API_KEY").then(|| "test-key".to_string())
        })
        .with_groq_model("llama-test");

        let first = registry.client(ProviderKind::Groq).unwrap();
        let second = registry.client(ProviderKind::Groq).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "groq");
    }
}
