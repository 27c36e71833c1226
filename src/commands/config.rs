use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::Config;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "Observatory Configuration".bold());
            println!();

            println!("{}:", "room".cyan());
            println!("  name: {}", config.room.name);
            println!("  heartbeat_interval_secs: {}", config.room.heartbeat_interval_secs);
            println!("  history_limit: {}", config.room.history_limit);
            println!();

            println!("{}:", "backend".cyan());
            println!("  base_url: {}", config.backend.base_url);
            println!("  model: {}", config.backend.model);
            if let Some(embedding) = &config.backend.embedding {
                println!("  embedding: {}", embedding);
            }
            println!("  inter_agent_tool: {}", config.backend.inter_agent_tool);
            println!();

            println!("{}:", "voice".cyan());
            println!("  enabled: {}", config.voice.enabled);
            println!("  announcer: {} ({})", config.voice.announcer, config.voice.announcer_voice);
            println!("  rate: {}  volume: {}", config.voice.rate, config.voice.volume);
            println!();

            println!("{}:", "personas".cyan());
            for (name, persona) in &config.personas {
                println!("  {} {}", name.bold(), persona.voice.dimmed());
            }
            println!();

            println!("log_level: {}", config.log_level.as_filter());
            println!("config dir: {}", Config::observatory_dir().display());
        }
    }

    Ok(())
}
