//! Audio player detection
//!
//! Probes a fixed, ordered list of players once at startup and resolves a
//! single strategy used for every utterance afterwards.

use eyre::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;

use crate::task;

/// Plays an audio file to completion, or until `running` is cleared
pub trait Playback: Send {
    fn play(&self, path: &Path, running: &AtomicBool) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStrategy {
    /// External player invoked with the file path as last argument
    Command {
        label: String,
        program: PathBuf,
        args: Vec<String>,
    },
    /// PowerShell Media.SoundPlayer
    #[cfg_attr(not(windows), allow(dead_code))]
    SoundPlayer,
    Unavailable,
}

struct Candidate {
    name: &'static str,
    args: &'static [&'static str],
}

#[cfg_attr(windows, allow(dead_code))]
const UNIX_PLAYERS: &[Candidate] = &[
    Candidate { name: "afplay", args: &[] },
    Candidate {
        name: "mpg123",
        args: &["-q"],
    },
    Candidate {
        name: "mpv",
        args: &["--really-quiet", "--no-video"],
    },
    Candidate {
        name: "ffplay",
        args: &["-nodisp", "-autoexit", "-loglevel", "quiet"],
    },
    Candidate { name: "paplay", args: &[] },
];

impl PlayerStrategy {
    /// Try the platform's players in priority order
    pub fn detect() -> Self {
        #[cfg(windows)]
        let strategy = detect_windows();
        #[cfg(not(windows))]
        let strategy = find_player(UNIX_PLAYERS, Path::new("/usr/bin"), |name| which::which(name).ok());

        log::info!("Audio player: {}", strategy);
        strategy
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, PlayerStrategy::Unavailable)
    }
}

impl fmt::Display for PlayerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerStrategy::Command { label, program, .. } => write!(f, "{} ({})", label, program.display()),
            PlayerStrategy::SoundPlayer => write!(f, "Windows SoundPlayer (fallback)"),
            PlayerStrategy::Unavailable => write!(f, "none"),
        }
    }
}

impl Playback for PlayerStrategy {
    fn play(&self, path: &Path, running: &AtomicBool) -> Result<()> {
        let (mut command, label) = match self {
            PlayerStrategy::Command { label, program, args } => {
                let mut command = Command::new(program);
                command.args(args).arg(path);
                (command, label.as_str())
            }
            PlayerStrategy::SoundPlayer => {
                let script = format!(
                    "(New-Object Media.SoundPlayer '{}').PlaySync()",
                    path.display().to_string().replace('\'', "''")
                );
                let mut command = Command::new("powershell");
                command.args(["-NoProfile", "-Command", &script]);
                (command, "powershell")
            }
            PlayerStrategy::Unavailable => eyre::bail!("No audio player available"),
        };

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {}", label))?;
        let (status, _) = task::wait_child(child, running, label)?;

        if !status.success() {
            eyre::bail!("{} exited with {}", self, status);
        }
        Ok(())
    }
}

/// First candidate found in `system_dir`, then on PATH via `lookup`
#[cfg_attr(windows, allow(dead_code))]
fn find_player(
    candidates: &[Candidate],
    system_dir: &Path,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> PlayerStrategy {
    for candidate in candidates {
        let fixed = system_dir.join(candidate.name);
        let program = if fixed.is_file() { Some(fixed) } else { lookup(candidate.name) };

        if let Some(program) = program {
            return PlayerStrategy::Command {
                label: candidate.name.to_string(),
                program,
                args: candidate.args.iter().map(|a| a.to_string()).collect(),
            };
        }
    }
    PlayerStrategy::Unavailable
}

#[cfg(windows)]
fn detect_windows() -> PlayerStrategy {
    let mut candidates = vec![
        PathBuf::from("mpv"),
        PathBuf::from(r"C:\ProgramData\chocolatey\bin\mpv.exe"),
        PathBuf::from(r"C:\tools\mpv\mpv.exe"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(r"scoop\apps\mpv\current\mpv.exe"));
        candidates.push(home.join(r"AppData\Local\Programs\mpv\mpv.exe"));
    }

    for program in candidates {
        let check = Command::new(&program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if matches!(check, Ok(status) if status.success()) {
            return PlayerStrategy::Command {
                label: "mpv".to_string(),
                program,
                args: vec!["--really-quiet".to_string(), "--no-video".to_string()],
            };
        }
    }

    PlayerStrategy::SoundPlayer
}
