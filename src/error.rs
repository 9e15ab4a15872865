use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions that abort a run before or outside the retry loop.
///
/// Anything the generated parser gets wrong is a [`crate::Diagnostic`], not an error.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Could not find PDF/CSV for '{target}' in {dir} (tried: {searched})")]
    MissingInputs {
        target: String,
        dir: PathBuf,
        searched: String,
    },

    #[error("{0} missing")]
    MissingCredential(&'static str),

    #[error("Unknown LLM provider '{0}': expected 'groq' or 'gemini'")]
    UnknownProvider(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
