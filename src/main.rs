use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use improvr::collaborators::{Scenario, ScriptedCollaborators};
use improvr::config::{GlobalConfig, load_config};
use improvr::coordination::LoopHandle;
use improvr::domain::{RunStatus, SignalType, StageStatus, TrainingLoopInput, TrainingLoopResult, TrainingLoopStatus};
use improvr::runner::{ControllerConfig, LoopController};
use improvr::storage::JsonlRecorder;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("improvr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("improvr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            input,
            scenario,
            record_dir,
            json,
        } => handle_run_command(input, scenario.as_deref(), record_dir.as_deref(), *json, config),
        Commands::History { loop_id, record_dir } => {
            handle_history_command(loop_id, record_dir.as_deref(), config)
        }
    }
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).context(format!("Failed to read {} {}", what, path.display()))?;
    serde_yaml::from_str(&content).context(format!("Failed to parse {} {}", what, path.display()))
}

fn handle_run_command(
    input_path: &Path,
    scenario_path: Option<&Path>,
    record_dir: Option<&Path>,
    json: bool,
    config: &GlobalConfig,
) -> Result<()> {
    let input: TrainingLoopInput = load_yaml(input_path, "input")?;
    let scenario = match scenario_path {
        Some(path) => load_yaml(path, "scenario")?,
        None => Scenario::default(),
    };
    let record_dir = record_dir.unwrap_or(config.storage.record_dir.as_path());
    info!("Running loop for project {} (trigger: {})", input.project_id, input.trigger);

    let backend = Arc::new(ScriptedCollaborators::new(scenario));
    let recorder = Arc::new(JsonlRecorder::new(record_dir).context("Failed to open record directory")?);
    info!("Recording checkpoints to {}", recorder.path().display());
    let controller = Arc::new(LoopController::new(
        backend.clone(),
        recorder,
        backend,
        ControllerConfig::from(config),
    ));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(async {
        let (handle, join) = controller.start(input);
        if !json {
            println!("{} {}", "Started:".green(), handle.loop_id());
            println!("  Commands: pause, resume, abort, approve, reject, skip, status");
        }
        spawn_control_reader(handle);
        join.await.context("Training loop task failed")
    })??;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Forward operator commands typed on stdin to the running loop
///
/// Runs on a plain thread: blocking stdin reads must not hold up runtime
/// shutdown once the loop has finished.
fn spawn_control_reader(handle: LoopHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            if command.eq_ignore_ascii_case("status") {
                print_status(&handle.status());
                continue;
            }
            match SignalType::from_str(command) {
                Ok(signal) => {
                    handle.send(signal);
                    println!("{} {}", "Sent:".cyan(), signal);
                }
                Err(e) => {
                    warn!("Ignoring operator input {:?}: {}", command, e);
                    eprintln!("{} {}", "Unknown command:".red(), command);
                }
            }
        }
    });
}

fn print_status(status: &TrainingLoopStatus) {
    println!("{} {}", "Loop:".green(), status.loop_id);
    println!(
        "  stage: {}  iteration: {}/{}  progress: {:.2}",
        status.stage, status.current_iteration, status.max_iterations, status.progress
    );
    if status.is_paused {
        println!("  {}", "paused".yellow());
    }
    if status.is_aborted {
        println!("  {}", "aborted".red());
    }
    if status.awaiting_approval {
        println!("  {}", "awaiting approval (approve/reject)".yellow());
    }
    for (name, value) in &status.metrics {
        println!("  {}: {}", name, value);
    }
}

fn print_result(result: &TrainingLoopResult) {
    let status = match result.status {
        RunStatus::Completed => result.status.to_string().green(),
        RunStatus::Aborted => result.status.to_string().yellow(),
        RunStatus::Failed => result.status.to_string().red(),
    };
    println!("{} {} {}", "Loop".bold(), result.loop_id, status);
    println!(
        "  iterations: {}  improvement: {:+.2}%  duration: {}ms",
        result.iterations,
        result.improvement * 100.0,
        result.total_duration_ms
    );
    if let Some(baseline) = result.baseline_score {
        println!("  baseline: {:.3}", baseline);
    }

    for stage in &result.stages {
        let marker = match stage.status {
            StageStatus::Completed => "ok".green(),
            StageStatus::Skipped => "skip".yellow(),
            StageStatus::Failed => "fail".red(),
        };
        let metrics: Vec<String> = stage.metrics.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!(
            "  [{}] #{} {:<10} {:>6}ms {}",
            marker,
            stage.iteration,
            stage.stage.as_str(),
            stage.duration_ms,
            metrics.join(" ")
        );
        if let Some(error) = &stage.error {
            println!("        {}", error.red());
        }
    }
}

fn handle_history_command(loop_id: &str, record_dir: Option<&Path>, config: &GlobalConfig) -> Result<()> {
    let record_dir = record_dir.unwrap_or(config.storage.record_dir.as_path());
    info!("Loading history for loop {} from {}", loop_id, record_dir.display());

    let recorder = JsonlRecorder::new(record_dir).context("Failed to open record directory")?;
    let records = recorder.load(loop_id).context("Failed to read checkpoints")?;
    if records.is_empty() {
        println!("{} {}", "No checkpoints for:".yellow(), loop_id);
        return Ok(());
    }

    println!("{} {} ({} checkpoints)", "History:".green(), loop_id, records.len());
    for record in records {
        let metrics: Vec<String> = record.metrics.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!(
            "  {} {:<10} {}",
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            record.stage.as_str(),
            metrics.join(" ")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
