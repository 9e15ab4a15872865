//! # Statement Parser Agent
//!
//! Generates bank-statement PDF parsers with an LLM and keeps repairing them until their
//! output matches a known-good table.
//!
//! ## Core Concepts
//!
//! - **Target**: a bank identifier with a sample PDF and its expected CSV under `data/<bank>/`
//! - **Artifact**: the Python module the model writes for one attempt; it always lands at
//!   `custom_parsers/<bank>_parser.py`, matched or not
//! - **Diagnostic**: a classified reason the artifact's table did not match, rendered as the
//!   hint for the next attempt
//! - **Retry loop**: generate → execute (out of process, under a timeout) → compare → retry,
//!   bounded by a maximum number of attempts with a fixed backoff
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_parser_agent::*;
//!
//! let config = AgentConfig::from_env()?;
//! let inputs = find_inputs(&config.data_dir, "icici")?;
//! let expected = Table::read_csv(&inputs.csv)?;
//! let target = Target::new("icici", inputs, &config.output_dir);
//!
//! let client = config.registry().client(config.provider)?;
//! let report = RetryController::new(client, &config)
//!     .run(&target, &expected)
//!     .await?;
//!
//! if let Some(diagnostic) = &report.last_diagnostic {
//!     println!("{}", diagnostic);
//! }
//! ```

pub mod agent;
pub mod compare;
pub mod config;
pub mod diagnostic;
pub mod discovery;
pub mod error;
pub mod inspect;
pub mod llm;
pub mod normalize;
pub mod runner;
pub mod table;

pub use agent::{judge, AgentEvent, Attempt, RetryController, RunReport, Target};
pub use compare::{CompareOptions, Comparator, LengthPolicy, Verdict};
pub use config::AgentConfig;
pub use diagnostic::{CellDifference, Diagnostic, DiagnosticKind, ExecutionFailure};
pub use discovery::{artifact_path, find_inputs, scratch_output_path, InputPair};
pub use error::{AgentError, Result};
pub use inspect::{inspect, InspectReport};
pub use llm::{GenerationClient, PromptBuilder, ProviderKind, ProviderRegistry};
pub use normalize::{normalize_amount, normalize_date, AmountColumns, TableNormalizer};
pub use runner::{ArtifactRunner, RunOutcome, RunnerConfig};
pub use table::{Cell, Table};
