#![cfg(unix)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use statement_parser_agent::*;
use tokio::sync::mpsc;

const MARKER: &str = "# entry: parse(";
const HEADER: &str = "Date,Description,Debit Amt,Credit Amt,Balance\n";

/// Replays canned generations and records every prompt it was sent.
struct ScriptedClient {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(responses: Vec<std::result::Result<String, String>>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(AgentError::Provider(msg)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// A shell "parser" that writes `rows` under the statement header.
fn parser_script(rows: &str) -> String {
    format!(
        "{}pdf_path)\ncat > \"$2\" <<'CSV'\n{}{}CSV\n",
        MARKER, HEADER, rows
    )
}

struct Workspace {
    _dir: tempfile::TempDir,
    data_dir: PathBuf,
    output_dir: PathBuf,
}

fn workspace(bank: &str, expected_rows: &str) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let bank_dir = data_dir.join(bank);
    fs::create_dir_all(&bank_dir).unwrap();
    fs::write(bank_dir.join(format!("{}_sample.pdf", bank)), b"%PDF-1.4").unwrap();
    fs::write(
        bank_dir.join(format!("{}_sample.csv", bank)),
        format!("{}{}", HEADER, expected_rows),
    )
    .unwrap();
    Workspace {
        output_dir: dir.path().join("custom_parsers"),
        data_dir,
        _dir: dir,
    }
}

fn config(max_tries: u32, backoff: Duration) -> AgentConfig {
    AgentConfig::default()
        .with_max_tries(max_tries)
        .with_backoff(backoff)
}

fn sh_runner() -> ArtifactRunner {
    ArtifactRunner::new(RunnerConfig {
        interpreter: PathBuf::from("sh"),
        timeout: Duration::from_secs(10),
        entry_point: MARKER.to_string(),
    })
}

fn load(ws: &Workspace, bank: &str) -> (Target, Table) {
    let inputs = find_inputs(&ws.data_dir, bank).unwrap();
    let expected = Table::read_csv(&inputs.csv).unwrap();
    (Target::new(bank, inputs, &ws.output_dir), expected)
}

fn controller(client: Arc<ScriptedClient>, config: &AgentConfig) -> RetryController {
    RetryController::new(client, config).with_runner(sh_runner())
}

const SALARY_ROW: &str = "01-08-2024,Salary,,5000.00,15000.00\n";

#[tokio::test]
async fn test_date_drift_is_repaired_on_second_attempt() -> anyhow::Result<()> {
    let ws = workspace("icici", SALARY_ROW);
    let (target, expected) = load(&ws, "icici");

    let wrong = parser_script("2024-08-01,Salary,,5000.00,15000.00\n");
    let right = parser_script(SALARY_ROW);
    let client = ScriptedClient::new(
        vec![
            Ok(format!("```python\n{}```", wrong)),
            Ok(format!("```\n{}\n```", right)),
        ],
        "",
    );

    let report = controller(client.clone(), &config(4, Duration::from_millis(1)))
        .run(&target, &expected)
        .await?;

    assert!(report.converged);
    assert_eq!(report.attempt_count(), 2);
    assert_eq!(
        report.attempts[0].feedback.as_ref().map(Diagnostic::kind),
        Some(DiagnosticKind::DateFormatMismatch)
    );
    assert!(report.last_diagnostic.is_none());

    let prompts = client.prompts();
    assert!(prompts[0].contains("First attempt. Match the CSV exactly."));
    assert!(prompts[1].contains("Date format mismatch"));
    assert!(prompts[1].contains("2024-08-01"));

    let persisted = fs::read_to_string(&report.artifact_path)?;
    assert_eq!(persisted, right.trim());
    assert_eq!(report.artifact_path, ws.output_dir.join("icici_parser.py"));
    assert!(!target.scratch_output.exists());
    Ok(())
}

#[tokio::test]
async fn test_budget_is_exhausted_with_backoff_between_attempts() {
    let ws = workspace("sbi", SALARY_ROW);
    let (target, expected) = load(&ws, "sbi");

    // No entry point, so no process is ever spawned.
    let client = ScriptedClient::new(vec![], "import pandas\nprint('hi')\n");
    let backoff = Duration::from_millis(30);

    let started = Instant::now();
    let report = controller(client.clone(), &config(3, backoff))
        .run(&target, &expected)
        .await
        .unwrap();

    assert!(!report.converged);
    assert_eq!(report.attempt_count(), 3);
    assert_eq!(client.prompts().len(), 3);
    assert!(started.elapsed() >= backoff * 2);
    assert_eq!(
        report.last_diagnostic.as_ref().map(Diagnostic::kind),
        Some(DiagnosticKind::MissingExport)
    );
    let indices: Vec<u32> = report.attempts.iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(report.artifact_path.exists());
}

#[tokio::test]
async fn test_empty_generation_skips_execution() {
    let ws = workspace("hdfc", SALARY_ROW);
    let (target, expected) = load(&ws, "hdfc");

    let client = ScriptedClient::new(
        vec![Ok("```python\n```".to_string()), Ok(parser_script(SALARY_ROW))],
        "",
    );

    let report = controller(client, &config(3, Duration::from_millis(1)))
        .run(&target, &expected)
        .await
        .unwrap();

    assert!(report.converged);
    assert_eq!(report.attempts[0].feedback, Some(Diagnostic::EmptyGeneration));
    assert!(report.attempts[0].source.is_empty());
    assert_eq!(report.attempts[1].feedback, None);
}

#[tokio::test]
async fn test_provider_failure_is_fatal() {
    let ws = workspace("axis", SALARY_ROW);
    let (target, expected) = load(&ws, "axis");

    let client = ScriptedClient::new(vec![Err("status 401".to_string())], "");
    let result = controller(client.clone(), &config(5, Duration::from_millis(1)))
        .run(&target, &expected)
        .await;

    assert!(matches!(result, Err(AgentError::Provider(_))));
    assert_eq!(client.prompts().len(), 1);
}

#[tokio::test]
async fn test_crashing_parser_feeds_stderr_back() {
    let ws = workspace("kotak", SALARY_ROW);
    let (target, expected) = load(&ws, "kotak");

    let crash = format!("{}pdf_path)\necho 'IndexError: list index out of range' >&2\nexit 1\n", MARKER);
    let client = ScriptedClient::new(vec![Ok(crash)], &parser_script(SALARY_ROW));

    let report = controller(client.clone(), &config(3, Duration::from_millis(1)))
        .run(&target, &expected)
        .await
        .unwrap();

    assert!(report.converged);
    assert_eq!(
        report.attempts[0].feedback.as_ref().map(Diagnostic::kind),
        Some(DiagnosticKind::NonZeroExit)
    );
    assert!(client.prompts()[1].contains("IndexError: list index out of range"));
}

#[tokio::test]
async fn test_trailing_junk_row_still_converges() {
    let ws = workspace("yes", SALARY_ROW);
    let (target, expected) = load(&ws, "yes");

    let overcapture = parser_script(&format!(
        "{}02-08-2024,Page 1 of 1,,,\n",
        SALARY_ROW
    ));
    let client = ScriptedClient::new(vec![Ok(overcapture)], "");

    let report = controller(client, &config(1, Duration::ZERO))
        .run(&target, &expected)
        .await
        .unwrap();

    assert!(report.converged);
    assert_eq!(report.attempt_count(), 1);
}

#[tokio::test]
async fn test_progress_events_trace_the_loop() {
    let ws = workspace("pnb", SALARY_ROW);
    let (target, expected) = load(&ws, "pnb");

    let client = ScriptedClient::new(vec![Ok(String::new())], &parser_script(SALARY_ROW));
    let (tx, mut rx) = mpsc::channel(64);

    let report = controller(client, &config(3, Duration::from_millis(1)))
        .with_progress(tx)
        .run(&target, &expected)
        .await
        .unwrap();
    assert!(report.converged);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(AgentEvent::Starting { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::Diagnostic {
            attempt: 1,
            kind: DiagnosticKind::EmptyGeneration,
            ..
        }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::Retrying { attempt: 1, .. })));
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Converged { attempt: 2 })
    ));
}

#[test]
fn test_missing_inputs_are_reported_before_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let err = find_inputs(dir.path(), "unknown").unwrap_err();
    assert!(err.to_string().contains("Could not find PDF/CSV for 'unknown'"));
}

#[test]
fn test_expected_statement_scenario() -> anyhow::Result<()> {
    let expected = Table::from_reader(format!("{}{}", HEADER, SALARY_ROW).as_bytes())?;
    let comparator = Comparator::default();

    let drifted =
        Table::from_reader(format!("{}2024-08-01,Salary,,5000.00,15000.00\n", HEADER).as_bytes())?;
    assert_eq!(
        comparator
            .compare(&drifted, &expected)
            .into_diagnostic()
            .map(|d| d.kind()),
        Some(DiagnosticKind::DateFormatMismatch)
    );

    let fixed = Table::from_reader(format!("{}{}", HEADER, SALARY_ROW).as_bytes())?;
    assert!(comparator.compare(&fixed, &expected).is_match());
    Ok(())
}
