//! Hearth CLI - run WASI preview1 modules against an in-memory world.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod manifest;

/// Hearth WASI Host
#[derive(Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(short = 'f', long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Output format options.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl OutputFormat {
    /// Serialize `value` in the selected JSON flavour.
    pub fn json<T: serde::Serialize>(self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::JsonCompact => serde_json::to_string(value),
            _ => serde_json::to_string_pretty(value),
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a WASI module's `_start`
    Run(commands::run::RunArgs),
    /// Check that a module can be linked against the host
    Validate(commands::validate::ValidateArgs),
    /// Inspect a WebAssembly module
    Inspect(commands::inspect::InspectArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hearth={log_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.format, cli.quiet),
        Commands::Validate(args) => commands::validate::execute(args, cli.format).map(|()| 0),
        Commands::Inspect(args) => commands::inspect::execute(args, cli.format).map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
