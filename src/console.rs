//! Line-oriented operator console

use colored::*;
use eyre::{Context, Result};
use std::io::{BufRead, Write};
use terminal_size::{Width, terminal_size};

use crate::controller::RoomController;

pub const UNKNOWN_COMMAND: &str = "Unknown command. Type 'help' for options.";

pub const PROMPT: &str = "> ";
const MAX_BANNER_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Broadcast(String),
    Send { from: String, to: String, message: String },
    Leave(String),
    Return(String),
    Status,
    History,
    Help,
    Quit,
    Blank,
    Unknown,
}

impl Command {
    /// Parse one input line. The command word is case-insensitive; commands
    /// without arguments ignore anything after the word.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Blank;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match (word.to_lowercase().as_str(), rest) {
            ("broadcast", message) if !message.is_empty() => Command::Broadcast(message.to_string()),
            ("send", _) => Self::parse_send(rest),
            ("leave", name) if single_word(name) => Command::Leave(name.to_string()),
            ("return", name) if single_word(name) => Command::Return(name.to_string()),
            ("status", _) => Command::Status,
            ("history", _) => Command::History,
            ("help", _) => Command::Help,
            ("quit", _) | ("exit", _) => Command::Quit,
            _ => Command::Unknown,
        }
    }

    /// `<from> <to> <message...>`; the message keeps its inner spacing
    fn parse_send(rest: &str) -> Self {
        let mut parts = rest.splitn(3, char::is_whitespace);
        match (parts.next(), parts.next(), parts.next().map(str::trim)) {
            (Some(from), Some(to), Some(message)) if !from.is_empty() && !to.is_empty() && !message.is_empty() => {
                Command::Send {
                    from: from.to_string(),
                    to: to.to_string(),
                    message: message.to_string(),
                }
            }
            _ => Command::Unknown,
        }
    }
}

fn single_word(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace)
}

pub fn help_text() -> String {
    [
        "Commands:",
        "  broadcast <message>         Announce to everyone present",
        "  send <from> <to> <message>  Deliver a message between personas",
        "  leave <name>                Send a persona into solitude",
        "  return <name>               Bring a persona back to the room",
        "  status                      Show who is where and recent activity",
        "  history                     Show the last 20 messages",
        "  help                        Show this help",
        "  quit                        Leave the observatory",
    ]
    .join("\n")
}

fn banner_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(MAX_BANNER_WIDTH)
        .min(MAX_BANNER_WIDTH)
}

fn print_welcome<W: Write>(controller: &RoomController, out: &mut W) -> Result<()> {
    let rule = "═".repeat(banner_width());
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}", format!("Welcome to {}", controller.room_name()).bold())?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Residents: {}", controller.agent_names().join(", ").cyan())?;
    writeln!(
        out,
        "Heartbeat every {}s. Voice {}.",
        controller.heartbeat_interval().as_secs(),
        if controller.voice_enabled() {
            "on".green()
        } else {
            "off".yellow()
        }
    )?;
    writeln!(out)?;
    writeln!(out, "{}", help_text())?;
    writeln!(out)?;
    Ok(())
}

/// Read commands until `quit` or end of input
pub fn run<R: BufRead, W: Write>(controller: &RoomController, input: R, out: &mut W) -> Result<()> {
    print_welcome(controller, out)?;

    let mut lines = input.lines();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line.context("Failed to read console input")?;

        let command = Command::parse(&line);
        log::debug!("Console command: {:?}", command);
        if command == Command::Quit {
            break;
        }
        dispatch(controller, command, out)?;
    }

    writeln!(out, "{}", "Closing the observatory...".dimmed())?;
    Ok(())
}

fn dispatch<W: Write>(controller: &RoomController, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Broadcast(message) => {
            writeln!(out, "{} {}", "📢".bold(), message.bold())?;
            writeln!(out, "{}", controller.broadcast(&message))?;
        }
        Command::Send { from, to, message } => match controller.direct_message(&from, &to, &message) {
            Ok(reply) => writeln!(out, "{}", reply)?,
            Err(e) => {
                log::error!("Direct message {} -> {} failed: {:#}", from, to, e);
                writeln!(out, "{} {:#}", "✗".red(), e)?;
            }
        },
        Command::Leave(name) => writeln!(out, "{}", controller.leave(&name).yellow())?,
        Command::Return(name) => writeln!(out, "{}", controller.return_(&name).green())?,
        Command::Status => writeln!(out, "{}", controller.status())?,
        Command::History => writeln!(out, "{}", controller.history())?,
        Command::Help => writeln!(out, "{}", help_text())?,
        Command::Unknown => writeln!(out, "{}", UNKNOWN_COMMAND.red())?,
        Command::Blank | Command::Quit => {}
    }
    Ok(())
}
