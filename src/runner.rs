use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::diagnostic::ExecutionFailure;
use crate::error::Result;
use crate::table::Table;

pub const DEFAULT_ENTRY_POINT: &str = "def parse(";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program used to run the artifact, e.g. `python3`.
    pub interpreter: PathBuf,
    pub timeout: Duration,
    /// Prefix a top-level line of the artifact must start with.
    pub entry_point: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Produced(Table),
    Failed(ExecutionFailure),
}

/// Removes the scratch output on every exit path.
struct ScratchFile<'a>(&'a Path);

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(self.0) {
            Ok(()) => debug!("Removed scratch output {}", self.0.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.0.display(), e),
        }
    }
}

/// Runs generated parsers out of process as `<interpreter> <artifact> <input> <output>`
/// under a wall-clock limit.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRunner {
    config: RunnerConfig,
}

impl ArtifactRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// True when some line of `source` starts, unindented, with the entry-point prefix.
    pub fn has_entry_point(&self, source: &str) -> bool {
        source
            .lines()
            .any(|line| line.starts_with(self.config.entry_point.as_str()))
    }

    /// Persists `source` to `artifact` (overwriting) and runs it.
    ///
    /// Only failing to write the artifact is an `Err`; everything the artifact itself does
    /// wrong comes back as [`RunOutcome::Failed`].
    pub async fn run(
        &self,
        source: &str,
        artifact: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<RunOutcome> {
        if let Some(parent) = artifact.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(artifact, source).await?;
        debug!("Wrote {} bytes to {}", source.len(), artifact.display());

        self.execute(source, artifact, input, output).await
    }

    /// Runs an artifact that is already on disk, without rewriting it.
    pub async fn run_existing(
        &self,
        artifact: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<RunOutcome> {
        let source = tokio::fs::read_to_string(artifact).await?;
        self.execute(&source, artifact, input, output).await
    }

    async fn execute(
        &self,
        source: &str,
        artifact: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<RunOutcome> {
        if !self.has_entry_point(source) {
            return Ok(RunOutcome::Failed(ExecutionFailure::MissingExport {
                entry_point: self.config.entry_point.clone(),
            }));
        }

        let _scratch = ScratchFile(output);
        if let Err(e) = tokio::fs::remove_file(output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove stale output {}: {}", output.display(), e);
            }
        }

        let start = Instant::now();
        let mut child = match Command::new(&self.config.interpreter)
            .arg(artifact)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Ok(RunOutcome::Failed(ExecutionFailure::Spawn {
                    message: format!(
                        "failed to start {}: {}",
                        self.config.interpreter.display(),
                        e
                    ),
                }))
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let waited = tokio::time::timeout(self.config.timeout, async {
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
        })
        .await;

        let (status, stdout, stderr) = match waited {
            Ok((Ok(status), out, err)) => (status, out, err),
            Ok((Err(e), _, _)) => {
                return Ok(RunOutcome::Failed(ExecutionFailure::Spawn {
                    message: e.to_string(),
                }))
            }
            Err(_elapsed) => {
                warn!(
                    "Artifact {} timed out after {:?}",
                    artifact.display(),
                    self.config.timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Could not kill timed out artifact: {}", e);
                }
                return Ok(RunOutcome::Failed(ExecutionFailure::Timeout {
                    limit: self.config.timeout,
                }));
            }
        };

        debug!(
            "Artifact exited with {} after {}ms",
            status,
            start.elapsed().as_millis()
        );
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{}", stderr.trim());
        }

        if !status.success() {
            return Ok(RunOutcome::Failed(ExecutionFailure::NonZeroExit {
                code: status.code(),
                stdout,
                stderr,
            }));
        }

        let table = match tokio::fs::read(output).await {
            Ok(bytes) => Table::from_reader(bytes.as_slice()),
            Err(e) => {
                return Ok(RunOutcome::Failed(ExecutionFailure::UnreadableOutput {
                    message: format!("{}: {}", output.display(), e),
                }))
            }
        };

        Ok(match table {
            Ok(table) => RunOutcome::Produced(table),
            Err(e) => RunOutcome::Failed(ExecutionFailure::UnreadableOutput {
                message: e.to_string(),
            }),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read child output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
