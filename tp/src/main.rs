//! tp - conversational trip planner
//!
//! CLI entry point for planning trips and dispatching booking tasks.

use std::fs;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::info;

use sessionstore::SystemClock;
use tripplanner::app::build_orchestrator;
use tripplanner::chat::{self, ChatSession};
use tripplanner::cli::{Cli, Command, OutputFormat, get_log_dir, get_log_path};
use tripplanner::config::Config;
use tripplanner::domain::QuickPlanRequest;
use tripplanner::registry::AgentCard;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = get_log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(get_log_path())
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "tp loaded config: provider={}, model={}, use_model={}",
        config.llm.provider, config.llm.model, config.extraction.use_model
    );

    match cli.command {
        Some(Command::Chat { query }) => cmd_chat(&config, query).await,
        Some(Command::Plan { query, execute, format }) => cmd_plan(&config, query, execute, format).await,
        Some(Command::AgentCard) => cmd_agent_card(&config),
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => cmd_chat(&config, None).await,
    }
}

/// Interactive multi-turn planning
async fn cmd_chat(config: &Config, query: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(SystemClock))?;
    let sweeper = orchestrator
        .service()
        .spawn_sweeper(config.conversation.purge_interval());
    let mut session = ChatSession::new(orchestrator);
    let result = session.run(query).await;
    sweeper.abort();
    result
}

/// Single-shot planning
async fn cmd_plan(config: &Config, query: String, execute: bool, format: OutputFormat) -> Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(SystemClock))?;
    let request = QuickPlanRequest { query };

    if !execute {
        let response = orchestrator.service().quick_plan(request).await;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
            OutputFormat::Text => chat::print_response(&response),
        }
        return Ok(());
    }

    let (progress_tx, mut progress_rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    // Ctrl+C stops further waves
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            if format == OutputFormat::Text {
                chat::print_event(&event);
            }
        }
    });

    let reply = orchestrator
        .quick_plan(request, progress_tx, cancel_rx)
        .await
        .context("Planning round aborted")?;
    let _ = printer.await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reply)?),
        OutputFormat::Text => {
            chat::print_response(&reply.response);
            if let Some(report) = &reply.report {
                chat::print_report(report);
            }
        }
    }
    Ok(())
}

/// Print the discovery document
fn cmd_agent_card(config: &Config) -> Result<()> {
    let card = AgentCard::from_config(&config.agent);
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

/// Show logs
fn cmd_logs(lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }

    Ok(())
}
