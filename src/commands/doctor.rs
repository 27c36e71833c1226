//! Diagnose observatory setup issues

use colored::*;
use eyre::Result;
use std::time::Duration;

use crate::agent::{AgentBackend, LettaClient};
use crate::config::{API_KEY_ENV, Config};
use crate::persona::PersonaRegistry;
use crate::voice::{EdgeTts, PlayerStrategy};

pub fn run(config: &Config) -> Result<()> {
    println!("{}", "Observatory Doctor".bold());
    println!("{}", "═".repeat(50));
    println!();

    let mut issues = 0;

    // Config file
    let observatory_dir = Config::observatory_dir();
    let config_file = observatory_dir.join("observatory.yaml");
    if config_file.exists() {
        println!("{} Config file: {}", "✓".green(), config_file.display());
    } else {
        println!("{} Config file missing: {} (using defaults)", "⚠".yellow(), config_file.display());
    }

    match PersonaRegistry::from_config(config) {
        Ok(registry) => println!("{} Personas: {}", "✓".green(), registry.names().join(", ")),
        Err(e) => {
            println!("{} Personas: {:#}", "✗".red(), e);
            issues += 1;
        }
    }

    println!();
    println!("{}", "Agent backend:".bold());

    match config.api_key() {
        Ok(key) => {
            println!("  {} {} found", "✓".green(), API_KEY_ENV);
            let client = LettaClient::new(&config.backend.base_url, key, Duration::from_secs(10));
            match client.ping() {
                Ok(()) => println!("  {} {} reachable", "✓".green(), config.backend.base_url),
                Err(e) => {
                    println!("  {} {} unreachable: {:#}", "✗".red(), config.backend.base_url, e);
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  {} {:#}", "✗".red(), e);
            println!("    Export {} or add it to {}", API_KEY_ENV.cyan(), observatory_dir.join(".env").display());
            issues += 1;
        }
    }

    println!();
    println!("{}", "Voice:".bold());

    if !config.voice.enabled {
        println!("  {} disabled in config", "⚠".yellow());
    } else {
        match EdgeTts::detect() {
            Some(tts) => println!("  {} edge-tts ({})", "✓".green(), tts.program().display()),
            None => {
                println!("  {} edge-tts not found (voice will be off)", "⚠".yellow());
                println!("    Install: {}", "pip install edge-tts".cyan());
            }
        }

        let player = PlayerStrategy::detect();
        if player.is_available() {
            println!("  {} audio player: {}", "✓".green(), player);
        } else {
            println!("  {} no audio player found (voice will be off)", "⚠".yellow());
            println!("    Install one of: {}", "mpv, mpg123, ffplay".cyan());
        }
    }

    println!();
    println!("{}", "═".repeat(50));
    if issues == 0 {
        println!("{} All checks passed!", "✓".green().bold());
    } else {
        println!("{} {} issue(s) found", "⚠".yellow().bold(), issues);
    }

    Ok(())
}
