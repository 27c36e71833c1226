//! Speech synthesis through the edge-tts command line tool

use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;

use crate::task;

/// One line of speech, ready for synthesis
#[derive(Debug, Clone, Copy)]
pub struct Utterance<'a> {
    pub text: &'a str,
    pub voice: &'a str,
    /// Rate adjustment such as "+0%" or "-10%"
    pub rate: &'a str,
    /// Volume adjustment such as "+0%"
    pub volume: &'a str,
}

/// Renders an utterance to an audio file, giving up once `running` is cleared
pub trait SpeechSynthesizer: Send {
    fn synthesize(&self, utterance: &Utterance<'_>, out: &Path, running: &AtomicBool) -> Result<()>;
}

pub struct EdgeTts {
    program: PathBuf,
}

impl EdgeTts {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Locate edge-tts on PATH
    pub fn detect() -> Option<Self> {
        which::which("edge-tts").ok().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one invocation. `=` forms keep values like "-10%" from
    /// being read as flags.
    fn args(utterance: &Utterance<'_>, out: &Path) -> Vec<String> {
        vec![
            format!("--voice={}", utterance.voice),
            format!("--rate={}", utterance.rate),
            format!("--volume={}", utterance.volume),
            format!("--text={}", utterance.text),
            format!("--write-media={}", out.display()),
        ]
    }
}

impl SpeechSynthesizer for EdgeTts {
    fn synthesize(&self, utterance: &Utterance<'_>, out: &Path, running: &AtomicBool) -> Result<()> {
        log::debug!("Synthesizing {} chars with {}", utterance.text.len(), utterance.voice);

        let child = Command::new(&self.program)
            .args(Self::args(utterance, out))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to run edge-tts")?;

        let (status, stderr) = task::wait_child(child, running, "edge-tts")?;
        if !status.success() {
            eyre::bail!("edge-tts exited with {}: {}", status, stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_use_equals_form() {
        let utterance = Utterance {
            text: "- a thought",
            voice: "en-US-GuyNeural",
            rate: "-10%",
            volume: "+0%",
        };
        let args = EdgeTts::args(&utterance, Path::new("/tmp/out.mp3"));
        assert_eq!(
            args,
            vec![
                "--voice=en-US-GuyNeural",
                "--rate=-10%",
                "--volume=+0%",
                "--text=- a thought",
                "--write-media=/tmp/out.mp3",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_error() {
        let tts = EdgeTts::new(PathBuf::from("false"));
        let utterance = Utterance {
            text: "Hello there",
            voice: "en-US-AriaNeural",
            rate: "+0%",
            volume: "+0%",
        };
        let running = AtomicBool::new(true);
        assert!(tts.synthesize(&utterance, Path::new("/tmp/out.mp3"), &running).is_err());
    }
}
