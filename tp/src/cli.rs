//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Trip planner - conversational travel planning with agent dispatch
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Plan trips through conversation and dispatch booking tasks to agents",
    version,
    after_help = "Logs are written to: ~/.local/share/tripplanner/logs/tripplanner.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Plan a trip interactively, over several turns
    Chat {
        /// First message of the conversation
        query: Option<String>,
    },

    /// Plan a trip from a single self-contained request
    Plan {
        /// The request, e.g. "Paris from Boston March 3 to March 9 for 2 people"
        query: String,

        /// Dispatch the resulting tasks to agents
        #[arg(short, long)]
        execute: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print this planner's agent discovery document
    AgentCard,

    /// Show planner logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Output format for plan results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Directory holding the log file
pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripplanner")
        .join("logs")
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    get_log_dir().join("tripplanner.log")
}
