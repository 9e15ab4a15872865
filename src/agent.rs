use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;

use crate::compare::{Comparator, Verdict};
use crate::config::AgentConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::discovery::{artifact_path, canonical_target, scratch_output_path, InputPair};
use crate::error::Result;
use crate::llm::{strip_code_fences, GenerationClient, PromptBuilder};
use crate::runner::{ArtifactRunner, RunOutcome};
use crate::table::Table;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    Starting { target: String },
    Generating { attempt: u32 },
    Executing { attempt: u32 },
    Diagnostic {
        attempt: u32,
        kind: DiagnosticKind,
        text: String,
    },
    Retrying { attempt: u32, backoff: Duration },
    Converged { attempt: u32 },
    Exhausted { attempts: u32 },
}

/// Everything the loop needs to know about one target.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub inputs: InputPair,
    /// Where every attempt's source is written; the last one stays on disk.
    pub artifact_path: PathBuf,
    /// Where the artifact is told to write its table.
    pub scratch_output: PathBuf,
}

impl Target {
    pub fn new(name: &str, inputs: InputPair, output_dir: &std::path::Path) -> Self {
        let name = canonical_target(name);
        Self {
            artifact_path: artifact_path(output_dir, &name),
            scratch_output: scratch_output_path(&inputs.csv),
            name,
            inputs,
        }
    }
}

/// One iteration of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub index: u32,
    pub source: String,
    pub artifact_path: PathBuf,
    /// `None` once the attempt has matched.
    pub feedback: Option<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub converged: bool,
    pub attempts: Vec<Attempt>,
    pub last_diagnostic: Option<Diagnostic>,
    pub artifact_path: PathBuf,
}

impl RunReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Init,
    Generating,
    Validating,
    Deciding,
    Retrying,
    Done,
}

/// Drives one target to a matching parser or to the end of its attempt budget.
/// Attempts are sequential; each child process is joined before the next generation.
pub struct RetryController {
    client: Arc<dyn GenerationClient>,
    runner: ArtifactRunner,
    comparator: Comparator,
    amount_keywords: Vec<String>,
    max_tries: u32,
    backoff: Duration,
    temperature: f32,
    progress: Option<Sender<AgentEvent>>,
}

impl RetryController {
    pub fn new(client: Arc<dyn GenerationClient>, config: &AgentConfig) -> Self {
        Self {
            client,
            runner: ArtifactRunner::new(config.runner_config()),
            comparator: config.comparator(),
            amount_keywords: config.amount_keywords.clone(),
            max_tries: config.max_tries.max(1),
            backoff: config.backoff,
            temperature: config.temperature,
            progress: None,
        }
    }

    pub fn with_runner(mut self, runner: ArtifactRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_progress(mut self, progress: Sender<AgentEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the loop to a match or to the attempt budget.
    ///
    /// Only fatal conditions (provider failures, an artifact that cannot be written) are
    /// returned as `Err`; a run that never converges is an `Ok` report with
    /// `converged == false`.
    pub async fn run(&self, target: &Target, expected: &Table) -> Result<RunReport> {
        let prompts = PromptBuilder::new(expected, &self.amount_keywords);
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut feedback: Option<Diagnostic> = None;
        let mut attempt = Attempt {
            index: 0,
            source: String::new(),
            artifact_path: target.artifact_path.clone(),
            feedback: None,
        };
        let mut state = LoopState::Init;

        self.send_event(AgentEvent::Starting {
            target: target.name.clone(),
        })
        .await;

        while state != LoopState::Done {
            state = match state {
                LoopState::Init => {
                    attempt.index = 1;
                    LoopState::Generating
                }
                LoopState::Generating => {
                    info!(
                        "Generate code for {} (attempt {})",
                        target.name, attempt.index
                    );
                    self.send_event(AgentEvent::Generating {
                        attempt: attempt.index,
                    })
                    .await;

                    let prompt = prompts.build(feedback.as_ref(), attempt.index);
                    let raw = self.client.generate(&prompt, self.temperature).await?;
                    attempt.source = strip_code_fences(&raw);

                    if attempt.source.is_empty() {
                        attempt.feedback = Some(Diagnostic::EmptyGeneration);
                        LoopState::Deciding
                    } else {
                        LoopState::Validating
                    }
                }
                LoopState::Validating => {
                    info!("Execute and validate");
                    self.send_event(AgentEvent::Executing {
                        attempt: attempt.index,
                    })
                    .await;
                    attempt.feedback = self
                        .execute_and_validate(target, &attempt.source, expected)
                        .await?;
                    LoopState::Deciding
                }
                LoopState::Deciding => {
                    let next = match &attempt.feedback {
                        None => {
                            info!("Match on attempt {}", attempt.index);
                            self.send_event(AgentEvent::Converged {
                                attempt: attempt.index,
                            })
                            .await;
                            LoopState::Done
                        }
                        Some(diagnostic) => {
                            warn!(
                                "Attempt {} failed: {:?}",
                                attempt.index,
                                diagnostic.kind()
                            );
                            self.send_event(AgentEvent::Diagnostic {
                                attempt: attempt.index,
                                kind: diagnostic.kind(),
                                text: diagnostic.to_string(),
                            })
                            .await;
                            if attempt.index >= self.max_tries {
                                error!("Max attempts reached");
                                self.send_event(AgentEvent::Exhausted {
                                    attempts: attempt.index,
                                })
                                .await;
                                LoopState::Done
                            } else {
                                LoopState::Retrying
                            }
                        }
                    };
                    feedback = attempt.feedback.clone();
                    attempts.push(attempt.clone());
                    next
                }
                LoopState::Retrying => {
                    self.send_event(AgentEvent::Retrying {
                        attempt: attempt.index,
                        backoff: self.backoff,
                    })
                    .await;
                    sleep(self.backoff).await;
                    attempt = Attempt {
                        index: attempt.index + 1,
                        source: String::new(),
                        artifact_path: target.artifact_path.clone(),
                        feedback: None,
                    };
                    LoopState::Generating
                }
                LoopState::Done => LoopState::Done,
            };
        }

        Ok(RunReport {
            target: target.name.clone(),
            converged: feedback.is_none(),
            attempts,
            last_diagnostic: feedback,
            artifact_path: target.artifact_path.clone(),
        })
    }

    /// Runs one artifact and compares its table. `Ok(None)` is a match.
    pub async fn execute_and_validate(
        &self,
        target: &Target,
        source: &str,
        expected: &Table,
    ) -> Result<Option<Diagnostic>> {
        let outcome = self
            .runner
            .run(
                source,
                &target.artifact_path,
                &target.inputs.pdf,
                &target.scratch_output,
            )
            .await?;

        Ok(judge(&self.comparator, outcome, expected))
    }

    async fn send_event(&self, event: AgentEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

/// Turns a run outcome into the attempt's feedback.
pub fn judge(comparator: &Comparator, outcome: RunOutcome, expected: &Table) -> Option<Diagnostic> {
    match outcome {
        RunOutcome::Failed(failure) => Some(failure.into()),
        RunOutcome::Produced(produced) => {
            debug!(
                "Parsed shape {:?}, expected shape {:?}",
                produced.shape(),
                expected.shape()
            );
            match comparator.compare(&produced, expected) {
                Verdict::Match => None,
                Verdict::Mismatch(diagnostic) => Some(diagnostic),
            }
        }
    }
}
