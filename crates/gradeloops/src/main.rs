mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use tracing::{info, warn};

use gradeloops_config::ProjectLayout;
use gradeloops_core::{LoopConfig, LoopContext, LoopError, LoopResult, LoopRunner, RunMirror};
use gradeloops_db::Database;
use gradeloops_logging::{init_tracing, LogFormat, Logger};
use gradeloops_model::create_client;

use crate::config::ProjectConfig;

const OUTPUT_HELP: &str = "\
Output:
  <output-dir>/<cycle-id>/<agent-name>/
    attempt-<n>.md          Producer or reviser output
    attempt-<n>.eval.json   Evaluator result
    final.md                Passing attempt (only on success)
  <output-dir>/<cycle-id>/run-log.json

Example:
  gradeloops 2026-01-31-001 target_builder";

#[derive(Parser, Debug)]
#[command(
    name = "gradeloops",
    about = "Run an agent's produce / evaluate / revise loop against its rubric",
    version,
    after_help = OUTPUT_HELP
)]
struct Cli {
    /// Unique identifier for this cycle (e.g. 2026-01-31-001)
    cycle_id: String,

    /// Name of the agent to run (e.g. target_builder)
    agent_name: String,

    /// Project root (default: nearest ancestor containing SYSTEM/)
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Output root for artifacts and run logs (default: WORK/runs)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Producer input, overriding the registry's value for KEY
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_input)]
    inputs: Vec<(String, String)>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Progress output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Also append progress events as JSON lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Do not mirror run records into the database
    #[arg(long)]
    no_mirror: bool,

    /// Mirror database path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Dry run: show the resolved configuration without calling the model
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

fn parse_input(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    // Resolve project layout
    let layout = match cli.project_root.clone() {
        Some(root) => ProjectLayout::new(root),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            ProjectLayout::discover(&cwd)
        }
    };
    let project_config = ProjectConfig::load(layout.root())?.unwrap_or_default();

    // Load agent, rubric and inputs
    let mut loop_config = LoopConfig::load(layout.clone(), &cli.cycle_id, &cli.agent_name)?;
    if let Some(output_dir) = cli.output_dir.as_ref().or(project_config.output_dir.as_ref()) {
        loop_config = loop_config.with_output_dir(output_dir);
    }
    for (key, value) in &cli.inputs {
        loop_config = loop_config.with_input(key.as_str(), Value::String(value.clone()));
    }

    let model_config = project_config.model_config(cli.model.as_deref(), |key| std::env::var(key).ok());
    let mirror_enabled = project_config.mirror_enabled(cli.no_mirror);
    let db_path = project_config
        .mirror_database(cli.db_path.as_deref(), layout.root())
        .unwrap_or_else(Database::default_path);

    if cli.dry_run {
        print_dry_run(&loop_config, &model_config.model, mirror_enabled.then_some(&db_path));
        return Ok(());
    }

    if model_config.api_key.is_none() {
        warn!(
            env = %model_config.api_key_env,
            "No API key configured; model calls will fail"
        );
    }
    let model = create_client(model_config).context("Failed to create model client")?;

    // Mirror is best-effort: run without it if the database can't be opened
    let database = if mirror_enabled {
        match Database::open_at(&db_path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "Run mirror disabled");
                None
            }
        }
    } else {
        None
    };
    let mirror = database.as_ref().map(|db| db as &dyn RunMirror);

    // Create logger
    let logger = match &cli.log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };
    let runner = LoopRunner::new(model.as_ref(), mirror, Arc::new(logger));

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        if mark_interrupted(&interrupt_handle) {
            eprintln!("\nInterrupted again. Exiting.");
            std::process::exit(130);
        }
        eprintln!("\nInterrupted. Finishing current attempt (Ctrl+C again to exit)...");
    })
    .context("Failed to set Ctrl+C handler")?;

    let result = match runner.run(LoopContext::new(loop_config)).await {
        Ok(result) => result,
        Err(LoopError::Interrupted) => {
            eprintln!("{}", "=== INTERRUPTED ===".bright_yellow());
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };
    info!(success = result.success, attempt = result.final_attempt, "Loop complete");

    if cli.json_output {
        let json = serde_json::to_string_pretty(&result)?;
        println!("{}", json);
    } else {
        print_outcome(&result);
    }

    std::process::exit(result.exit_code());
}

/// Set the interrupt flag. Returns true when it was already set.
fn mark_interrupted(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

fn print_dry_run(config: &LoopConfig, model: &str, mirror: Option<&PathBuf>) {
    println!("=== Dry Run ===");
    println!("Project root: {}", config.layout.root().display());
    println!("Cycle: {}", config.cycle_id);
    println!("Agent: {}", config.agent.name);
    if let Some(description) = &config.agent.description {
        println!("Description: {}", description);
    }
    println!(
        "Rubric: {} (version {}, {} dimensions)",
        config.agent.rubric,
        config.rubric.version,
        config.rubric.dimensions.len()
    );
    println!("Threshold: {}", config.pass_threshold);
    println!("Max attempts: {}", config.agent.max_attempts);
    println!("Escalate on fail: {}", config.agent.escalate_on_fail);
    println!("Output dir: {}", config.agent_dir().display());
    println!("Model: {}", model);
    match mirror {
        Some(path) => println!("Mirror: {}", path.display()),
        None => println!("Mirror: disabled"),
    }
    let keys: Vec<_> = config.inputs.iter().map(|(k, _)| k).collect();
    if keys.is_empty() {
        println!("Inputs: none");
    } else {
        println!("Inputs: {}", keys.join(", "));
    }
}

fn print_outcome(result: &LoopResult) {
    let score = result
        .final_score
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "N/A".to_string());

    println!();
    if result.success {
        println!("{}", "=== PASSED ===".bright_green().bold());
    } else if result.escalated {
        println!("{}", "=== ESCALATED ===".bright_yellow().bold());
    } else {
        println!("{}", "=== FAILED ===".bright_red().bold());
    }
    println!("Final attempt: {}", result.final_attempt);
    println!("Final score: {}", score);
    match &result.artifact_path {
        Some(path) => println!("Artifact: {}", path.display()),
        None => println!("Artifact: N/A"),
    }
    if let Some(reason) = &result.escalation_reason {
        println!("Reason: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("thesis=LATAM Fintech").unwrap(),
            ("thesis".to_string(), "LATAM Fintech".to_string())
        );
        assert_eq!(
            parse_input("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_input("novalue").is_err());
        assert!(parse_input("=x").is_err());
    }

    #[test]
    fn test_cli_parses_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "gradeloops",
            "2026-01-31-001",
            "target_builder",
            "--input",
            "thesis=Healthtech",
            "-i",
            "region=LATAM",
            "--no-mirror",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.cycle_id, "2026-01-31-001");
        assert_eq!(cli.agent_name, "target_builder");
        assert_eq!(cli.inputs.len(), 2);
        assert!(cli.no_mirror);
        assert!(matches!(cli.log_format, LogFormatChoice::Json));
    }

    #[test]
    fn test_second_interrupt_is_detected() {
        let flag = AtomicBool::new(false);
        assert!(!mark_interrupted(&flag));
        assert!(flag.load(Ordering::SeqCst));
        assert!(mark_interrupted(&flag));
    }

    #[test]
    fn test_help_is_not_a_usage_error() {
        let err = Cli::try_parse_from(["gradeloops", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["gradeloops", "only-cycle"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
