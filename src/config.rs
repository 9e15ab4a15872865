use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compare::{CompareOptions, Comparator, LengthPolicy};
use crate::error::{AgentError, Result};
use crate::llm::{ProviderKind, ProviderRegistry};
use crate::normalize::{AmountColumns, TableNormalizer, DEFAULT_AMOUNT_KEYWORDS};
use crate::runner::{RunnerConfig, DEFAULT_ENTRY_POINT, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_MAX_TRIES: u32 = 6;
pub const DEFAULT_BACKOFF_SECS: u64 = 2;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Every tunable of a run. Environment values are read by [`AgentConfig::from_env`];
/// the CLI applies its flags on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_tries: u32,
    pub timeout: Duration,
    pub backoff: Duration,
    pub interpreter: PathBuf,
    pub provider: ProviderKind,
    pub groq_model: Option<String>,
    pub gemini_model: Option<String>,
    pub temperature: f32,
    pub amount_keywords: Vec<String>,
    pub length_policy: LengthPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("custom_parsers"),
            max_tries: DEFAULT_MAX_TRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            interpreter: PathBuf::from("python3"),
            provider: ProviderKind::default(),
            groq_model: None,
            gemini_model: None,
            temperature: DEFAULT_TEMPERATURE,
            amount_keywords: DEFAULT_AMOUNT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            length_policy: LengthPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("AGENT_MAX_TRIES") {
            config.max_tries = parse_var("AGENT_MAX_TRIES", &v)?;
        }
        if let Some(v) = get("AGENT_TIMEOUT") {
            config.timeout = Duration::from_secs(parse_var("AGENT_TIMEOUT", &v)?);
        }
        if let Some(v) = get("AGENT_BACKOFF") {
            config.backoff = Duration::from_secs(parse_var("AGENT_BACKOFF", &v)?);
        }
        if let Some(v) = get("AGENT_PYTHON") {
            config.interpreter = PathBuf::from(v);
        }
        if let Some(v) = get("AGENT_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("AGENT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LLM_PROVIDER") {
            config.provider = v.parse()?;
        }
        config.groq_model = get("GROQ_MODEL");
        config.gemini_model = get("GEMINI_MODEL");

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tries == 0 {
            return Err(AgentError::InvalidConfig(
                "max tries must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(AgentError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.amount_keywords.is_empty() {
            return Err(AgentError::InvalidConfig(
                "at least one amount keyword is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_length_policy(mut self, policy: LengthPolicy) -> Self {
        self.length_policy = policy;
        self
    }

    pub fn amount_columns(&self) -> AmountColumns {
        AmountColumns::new(self.amount_keywords.iter().cloned())
    }

    pub fn normalizer(&self) -> TableNormalizer {
        TableNormalizer::new(self.amount_columns())
    }

    pub fn comparator(&self) -> Comparator {
        Comparator::new(
            self.normalizer(),
            CompareOptions {
                length_policy: self.length_policy,
                ..CompareOptions::default()
            },
        )
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            interpreter: self.interpreter.clone(),
            timeout: self.timeout,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::from_env();
        if let Some(model) = &self.groq_model {
            registry = registry.with_groq_model(model.clone());
        }
        if let Some(model) = &self.gemini_model {
            registry = registry.with_gemini_model(model.clone());
        }
        registry
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| AgentError::InvalidConfig(format!("{} has invalid value '{}'", key, value)))
}
