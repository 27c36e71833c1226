use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod agent;
mod cli;
mod commands;
mod config;
mod console;
mod controller;
mod persona;
mod room;
mod task;
mod voice;

use cli::{Cli, Commands};
use config::Config;

fn setup_logging(filter: log::LevelFilter) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("observatory")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("observatory.log");

    // The console owns stdout, so logs go to a file
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(filter);
    }

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!(
        "Log level: {} (from {})",
        filter,
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}

/// Config level, nudged by -v / -q
fn effective_level(cli: &Cli, config: &Config) -> log::LevelFilter {
    if cli.quiet {
        log::LevelFilter::Error
    } else if cli.verbose {
        config.log_level.as_filter().max(log::LevelFilter::Debug)
    } else {
        config.log_level.as_filter()
    }
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        None => commands::room::run(false, &config),
        Some(Commands::Room { mute }) => commands::room::run(mute, &config),
        Some(Commands::Voices { list }) => commands::voices::run(list, &config),
        Some(Commands::Doctor) => commands::doctor::run(&config),
        Some(Commands::Config { action }) => commands::config::run(action, &config),
        Some(Commands::Completions { shell }) => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(effective_level(&cli, &config)).context("Failed to setup logging")?;

    info!("Starting observatory with config from: {:?}", cli.config);

    run(cli, config).context("Command failed")?;

    Ok(())
}
