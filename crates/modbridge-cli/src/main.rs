//! modbridge CLI - Command-line interface for the modbridge native module bridge.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use modbridge_core::BridgeConfig;

mod commands;

/// modbridge Native Module Bridge
#[derive(Parser)]
#[command(name = "modbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Bridge configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

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

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// List the modules of a registry manifest
    Inspect(commands::inspect::InspectArgs),
    /// Validate a registry manifest
    Validate(commands::validate::ValidateArgs),
    /// Request module proxies against the reference script context
    Resolve(commands::resolve::ResolveArgs),
}

const LOG_TARGETS: &[&str] = &[
    "modbridge",
    "modbridge_cli",
    "modbridge_core",
    "modbridge_proxy",
    "modbridge_script",
    "modbridge_observe",
];

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={log_level}"))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Run the command
    let result = match cli.command {
        Commands::Inspect(args) => commands::inspect::execute(args, cli.format),
        Commands::Validate(args) => commands::validate::execute(args, cli.format, cli.quiet),
        Commands::Resolve(args) => load_config(cli.config.as_deref())
            .and_then(|config| commands::resolve::execute(args, config, cli.format, cli.quiet)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Read the bridge configuration, falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let Some(path) = path else {
        return Ok(BridgeConfig::default());
    };

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = BridgeConfig::from_toml_str(&source)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        generator = %config.generator_binding,
        proxy = %config.proxy_property,
        "Loaded bridge configuration"
    );
    Ok(config)
}
