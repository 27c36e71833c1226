//! Check speech output and browse the voice catalogue

use colored::*;
use eyre::{Context, Result};
use lazy_regex::regex;
use std::collections::BTreeSet;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::persona::PersonaRegistry;
use crate::voice::{EdgeTts, Speaker};

pub fn run(list: bool, config: &Config) -> Result<()> {
    if list {
        list_voices()
    } else {
        greet(config)
    }
}

/// Speak each persona's greeting in turn
fn greet(config: &Config) -> Result<()> {
    let registry = PersonaRegistry::from_config(config)?;
    let speaker = Speaker::detect(&config.voice)?;

    // Ctrl-C cuts the current greeting short and skips the rest
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)).context("Failed to install Ctrl-C handler")?;

    println!("{}", "Testing voice synthesis...".bold());
    println!("{}", "-".repeat(40));

    let mut failures = 0;
    for persona in registry.iter() {
        if !running.load(Ordering::SeqCst) {
            println!("{}", "Interrupted.".yellow());
            break;
        }
        println!("Testing {}'s voice ({})...", persona.name, persona.voice.dimmed());
        match speaker.speak(&persona.voice, &greeting(&persona.name), &running) {
            Ok(()) => println!("  {} Played", "✓".green()),
            Err(e) => {
                println!("  {} {:#}", "✗".red(), e);
                failures += 1;
            }
        }
    }

    println!();
    if failures == 0 {
        println!("{} Voice test complete! If you heard the voices, you're ready.", "✓".green().bold());
        Ok(())
    } else {
        eyre::bail!("{} voice(s) failed", failures)
    }
}

fn greeting(name: &str) -> String {
    match name {
        "Alice" => "Hello, I'm Alice. I seek patterns in the chaos.".to_string(),
        "Bob" => "Bob here. Let's ground this in reality.".to_string(),
        "Charlie" => "Charlie speaking. Every word is jazz.".to_string(),
        "Diana" => "This is Diana. I sense the spaces between.".to_string(),
        other => format!("Hello, I'm {}. Pleased to meet you.", other),
    }
}

fn list_voices() -> Result<()> {
    let tts = EdgeTts::detect().ok_or_else(|| eyre::eyre!("edge-tts not found. Install with: pip install edge-tts"))?;

    let output = Command::new(tts.program())
        .arg("--list-voices")
        .output()
        .context("Failed to run edge-tts --list-voices")?;
    if !output.status.success() {
        eyre::bail!("edge-tts --list-voices exited with {}", output.status);
    }

    let groups = group_english_voices(&String::from_utf8_lossy(&output.stdout));
    for (title, voices) in [
        ("US English voices:", &groups.us),
        ("UK English voices:", &groups.gb),
        ("Other English voices:", &groups.other),
    ] {
        if voices.is_empty() {
            continue;
        }
        println!();
        println!("{}", title.bold());
        for voice in voices {
            println!("  {}", voice);
        }
    }

    println!();
    println!("Set {} in observatory.yaml to use any of these.", "personas.<name>.voice".cyan());
    Ok(())
}

#[derive(Debug, Default)]
struct VoiceGroups {
    us: BTreeSet<String>,
    gb: BTreeSet<String>,
    other: BTreeSet<String>,
}

/// Pick English neural voice names out of the catalogue, whatever its layout
fn group_english_voices(catalogue: &str) -> VoiceGroups {
    let mut groups = VoiceGroups::default();
    for found in regex!(r"\ben-[A-Za-z]{2}-[A-Za-z]+Neural\b").find_iter(catalogue) {
        let voice = found.as_str().to_string();
        if voice.starts_with("en-US") {
            groups.us.insert(voice);
        } else if voice.starts_with("en-GB") {
            groups.gb.insert(voice);
        } else {
            groups.other.insert(voice);
        }
    }
    groups
}
