//! # Teardown Configuration Validator
//!
//! Command-line tool for validating teardown configuration files across environments
//! before starting an orchestrator.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use teardown_core::config::{ConfigManager, LoggingConfig, TeardownConfig};
use teardown_core::logging::{self, log_error};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "teardown-config-validator")]
#[command(about = "Validate teardown configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate a single section (removal, events, logging)
    Component { name: String },

    /// Print the effective configuration as JSON
    Show,
}

fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => logging::init_structured_logging(),
        verbosity => logging::init_with_config(&LoggingConfig {
            level: match verbosity {
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
            .to_string(),
            json: false,
        }),
    }

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Show) => show_effective(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            log_error("config-validator", "validate", &format!("{e:#}"), None);
            error!("Configuration validation failed: {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<TeardownConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))?;
    println!(
        "Environment: {} (directory: {})",
        manager.environment(),
        manager.config_directory().display()
    );
    Ok(manager.config().clone())
}

fn validate_all(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    validate_removal(&config);
    validate_events(&config);
    validate_logging(&config);
    println!("\nAll configuration validation checks passed");
    Ok(())
}

fn validate_component(cli: &Cli, name: &str) -> anyhow::Result<()> {
    let config = load(cli)?;
    match name.to_lowercase().as_str() {
        "removal" => validate_removal(&config),
        "events" => validate_events(&config),
        "logging" => validate_logging(&config),
        other => bail!("Unknown component: {other}"),
    }
    println!("Component '{name}' validation passed");
    Ok(())
}

fn show_effective(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    let rendered = serde_json::to_string_pretty(&config).context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}

// Loading already ran TeardownConfig::validate; these report the effective values.

fn validate_removal(config: &TeardownConfig) {
    println!("Removal:");
    println!(
        "   task expiration: {}s ({:.1}h)",
        config.removal.task_expiration_seconds,
        config.removal.task_expiration_seconds as f64 / 3600.0
    );
    println!("   mock requests: {}", config.removal.mock_requests);
    println!("   callback buffer: {}", config.removal.callback_buffer);
    let retry = &config.removal.transition_retry;
    println!(
        "   transition retries: {} ({}ms base, x{}, {}ms cap)",
        retry.max_retries, retry.base_delay_ms, retry.backoff_multiplier, retry.max_delay_ms
    );
}

fn validate_events(config: &TeardownConfig) {
    println!("Events:");
    println!("   channel capacity: {}", config.events.channel_capacity);
}

fn validate_logging(config: &TeardownConfig) {
    println!("Logging:");
    println!("   level: {}", config.logging.level);
    println!("   json: {}", config.logging.json);
}
