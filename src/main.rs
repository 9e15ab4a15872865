use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use tokio::sync::mpsc;

use statement_parser_agent::{
    find_inputs, inspect, judge, AgentConfig, AgentEvent, ArtifactRunner, LengthPolicy,
    ProviderKind, Result, RetryController, Table, Target,
};

#[derive(Parser)]
#[command(name = "statement-parser-agent")]
#[command(about = "Agent that generates a bank statement PDF parser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a parser for a target, retrying until it matches the expected CSV
    Generate {
        /// Bank folder name under the data directory (e.g. icici)
        #[arg(long)]
        target: String,

        #[arg(long, env = "AGENT_MAX_TRIES")]
        max_tries: Option<u32>,

        /// LLM provider: groq or gemini
        #[arg(long, env = "LLM_PROVIDER")]
        provider: Option<String>,

        /// Require the parsed table to have exactly the expected row count
        #[arg(long)]
        exact_length: bool,

        /// Print the full run report (every attempt and its feedback) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-run the persisted parser for a target against its sample, without the LLM
    Verify {
        #[arg(long)]
        target: String,
    },

    /// Print a report on a parser's CSV output
    Inspect {
        #[arg(long)]
        got: PathBuf,

        #[arg(long)]
        expected: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = AgentConfig::from_env()?;

    match cli.command {
        Commands::Generate {
            target,
            max_tries,
            provider,
            exact_length,
            json,
        } => {
            if let Some(max_tries) = max_tries {
                config = config.with_max_tries(max_tries);
            }
            if let Some(provider) = provider {
                config = config.with_provider(provider.parse::<ProviderKind>()?);
            }
            if exact_length {
                config = config.with_length_policy(LengthPolicy::Exact);
            }
            config.validate()?;
            generate(&config, &target, json).await
        }
        Commands::Verify { target } => verify(&config, &target).await,
        Commands::Inspect { got, expected } => {
            let got = Table::read_csv(&got)?;
            let expected = match expected {
                Some(path) if path.exists() => Some(Table::read_csv(&path)?),
                _ => None,
            };
            println!("{}", inspect(&got, expected.as_ref(), &config.comparator()));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn generate(config: &AgentConfig, target: &str, json: bool) -> Result<ExitCode> {
    let inputs = find_inputs(&config.data_dir, target)?;
    let expected = Table::read_csv(&inputs.csv)?;
    let target = Target::new(target, inputs, &config.output_dir);

    let registry = config.registry();
    let client = registry.client(config.provider)?;
    info!(
        "Using {} for {} (max {} attempts)",
        client.name(),
        target.name,
        config.max_tries
    );

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let AgentEvent::Retrying { attempt, backoff } = event {
                info!(
                    "Retrying after attempt {} in {}s",
                    attempt,
                    backoff.as_secs_f32()
                );
            }
        }
    });

    let controller = RetryController::new(client, config).with_progress(tx);
    let report = controller.run(&target, &expected).await;
    drop(controller);
    let _ = printer.await;
    let report = report?;

    info!("Parser written to {}", report.artifact_path.display());
    if json {
        println!("{}", report.to_json()?);
    }

    match &report.last_diagnostic {
        Some(diagnostic) => {
            println!("\n----- Agent Feedback -----\n");
            println!("{}", diagnostic);
            println!("\n--------------------------\n");
            error!("Agent finished with errors. See feedback above.");
            Ok(ExitCode::FAILURE)
        }
        None => {
            info!("Green after {} attempt(s)", report.attempt_count());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn verify(config: &AgentConfig, target: &str) -> Result<ExitCode> {
    let inputs = find_inputs(&config.data_dir, target)?;
    let expected = Table::read_csv(&inputs.csv)?;
    let target = Target::new(target, inputs, &config.output_dir);

    let runner = ArtifactRunner::new(config.runner_config());
    let outcome = runner
        .run_existing(
            &target.artifact_path,
            &target.inputs.pdf,
            &target.scratch_output,
        )
        .await?;

    match judge(&config.comparator(), outcome, &expected) {
        None => {
            info!(
                "{} matches {}",
                target.artifact_path.display(),
                target.inputs.csv.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(diagnostic) => {
            println!("{}", diagnostic);
            Ok(ExitCode::FAILURE)
        }
    }
}
