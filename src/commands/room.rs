//! Open the room and hand the terminal to the operator console

use colored::*;
use eyre::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::agent::{AgentBackend, LettaClient};
use crate::config::Config;
use crate::console;
use crate::controller::{RoomController, ShutdownHandle};
use crate::persona::PersonaRegistry;
use crate::voice::{Speaker, VoiceQueue};

pub fn run(mute: bool, config: &Config) -> Result<()> {
    let api_key = config.api_key()?;
    let registry = Arc::new(PersonaRegistry::from_config(config)?);

    let backend: Arc<dyn AgentBackend> = Arc::new(LettaClient::new(
        &config.backend.base_url,
        api_key,
        Duration::from_secs(config.backend.timeout_secs),
    ));

    let voice = if mute {
        log::info!("Voice muted from the command line");
        VoiceQueue::disabled()
    } else {
        match Speaker::detect(&config.voice) {
            Ok(speaker) => VoiceQueue::new(speaker, registry.clone(), config.voice.min_chars),
            Err(e) => {
                println!("{} {}", "⚠".yellow(), e);
                log::warn!("{}", e);
                VoiceQueue::disabled()
            }
        }
    };

    let mut controller = RoomController::new(config, backend, registry, voice);

    println!("{} Awakening agents at {}...", "→".blue(), config.backend.base_url.cyan());
    controller
        .initialize_agents()
        .context("Failed to initialize agents")?;
    controller.start()?;
    install_interrupt_handler(controller.shutdown_handle())?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let result = console::run(&controller, stdin.lock(), &mut stdout);

    controller.shutdown();
    result
}

/// Exit status after a forced interrupt (128 + SIGINT)
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Remind the operator how to leave and keep reading
    Notice,
    /// Halt background work and exit
    Force,
}

/// Counts Ctrl-C presses; the first one only prints a notice
#[derive(Debug, Default)]
struct Interrupts {
    seen: AtomicUsize,
}

impl Interrupts {
    fn record(&self) -> Interrupt {
        if self.seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Interrupt::Notice
        } else {
            Interrupt::Force
        }
    }
}

fn install_interrupt_handler(handle: ShutdownHandle) -> Result<()> {
    let interrupts = Interrupts::default();
    ctrlc::set_handler(move || match interrupts.record() {
        Interrupt::Notice => {
            log::info!("Interrupted from the terminal");
            println!("\n{}", "Interrupted. Type 'quit' to exit cleanly.".yellow());
            print!("{}", console::PROMPT);
            let _ = io::stdout().flush();
        }
        Interrupt::Force => {
            println!("\n{}", "Shutting down...".dimmed());
            log::warn!("Second interrupt, halting background tasks");
            handle.halt();
            std::process::exit(INTERRUPTED_EXIT);
        }
    })
    .context("Failed to install Ctrl-C handler")
}
