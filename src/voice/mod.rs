//! Voice side channel
//!
//! Dialogue is queued and spoken by a single background worker so synthesis
//! and playback never block the conversation. Failures are logged and
//! swallowed; voice is never allowed to affect room state.

use eyre::{Context, Result};
use lazy_regex::regex_replace_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

pub mod player;
pub mod synth;

pub use player::{Playback, PlayerStrategy};
pub use synth::{EdgeTts, SpeechSynthesizer, Utterance};

use crate::config::VoiceConfig;
use crate::persona::PersonaRegistry;
use crate::task::{BackgroundTask, TICK, TaskSignal};

/// A line of dialogue waiting to be spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRequest {
    pub speaker: String,
    pub text: String,
}

/// Drop lightweight markdown that should not be read aloud
pub fn strip_markup(text: &str) -> String {
    regex_replace_all!(r"[*_#]", text, "").into_owned()
}

/// Synthesizer and player pair
pub struct Speaker {
    synth: Box<dyn SpeechSynthesizer>,
    player: Box<dyn Playback>,
    rate: String,
    volume: String,
}

impl Speaker {
    pub fn new(synth: Box<dyn SpeechSynthesizer>, player: Box<dyn Playback>, config: &VoiceConfig) -> Self {
        Self {
            synth,
            player,
            rate: config.rate.clone(),
            volume: config.volume.clone(),
        }
    }

    /// Find edge-tts and an audio player, or explain why voice is off
    pub fn detect(config: &VoiceConfig) -> Result<Self> {
        if !config.enabled {
            eyre::bail!("Voice disabled in config");
        }

        let synth = EdgeTts::detect()
            .ok_or_else(|| eyre::eyre!("edge-tts not found. Voice disabled. Install with: pip install edge-tts"))?;
        log::info!("Speech synthesizer: {}", synth.program().display());

        let player = PlayerStrategy::detect();
        if !player.is_available() {
            eyre::bail!("No audio player found. Voice disabled. Install mpv, mpg123 or ffplay");
        }

        Ok(Self::new(Box::new(synth), Box::new(player), config))
    }

    /// Synthesize to a temp file, play it, and remove the file whatever happens.
    /// Clearing `running` cuts synthesis or playback short.
    pub fn speak(&self, voice: &str, text: &str, running: &AtomicBool) -> Result<()> {
        let clean = strip_markup(text);

        let audio = tempfile::Builder::new()
            .prefix("observatory-")
            .suffix(".mp3")
            .tempfile()
            .context("Failed to create temp audio file")?
            .into_temp_path();

        let utterance = Utterance {
            text: &clean,
            voice,
            rate: &self.rate,
            volume: &self.volume,
        };
        let result = self
            .synth
            .synthesize(&utterance, &audio, running)
            .and_then(|_| self.player.play(&audio, running));

        if let Err(e) = audio.close() {
            log::warn!("Failed to remove temp audio file: {}", e);
        }
        result
    }
}

/// Producer side of the voice queue, plus the worker that drains it
pub struct VoiceQueue {
    min_chars: usize,
    sender: Option<Sender<VoiceRequest>>,
    pending: Option<(Receiver<VoiceRequest>, Speaker, Arc<PersonaRegistry>)>,
    worker: Option<BackgroundTask>,
}

impl VoiceQueue {
    pub fn new(speaker: Speaker, voices: Arc<PersonaRegistry>, min_chars: usize) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            min_chars,
            sender: Some(sender),
            pending: Some((receiver, speaker, voices)),
            worker: None,
        }
    }

    /// A queue that accepts nothing
    pub fn disabled() -> Self {
        Self {
            min_chars: 0,
            sender: None,
            pending: None,
            worker: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue a line for speech. Returns whether it was accepted.
    pub fn say(&self, speaker: &str, text: &str) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        if text.chars().count() < self.min_chars {
            log::trace!("Not speaking short utterance from {}", speaker);
            return false;
        }

        sender
            .send(VoiceRequest {
                speaker: speaker.to_string(),
                text: text.to_string(),
            })
            .is_ok()
    }

    /// Launch the worker; a no-op when disabled or already started
    pub fn start(&mut self) -> Result<()> {
        let Some((receiver, speaker, voices)) = self.pending.take() else {
            return Ok(());
        };

        self.worker = Some(BackgroundTask::spawn("voice", move |running| {
            drain(&running, receiver, speaker, voices)
        })?);
        Ok(())
    }

    /// Stop switch for the running worker, if any
    pub fn signal(&self) -> Option<TaskSignal> {
        self.worker.as_ref().map(BackgroundTask::signal)
    }

    /// Stop the worker, waiting at most `timeout`. Queued lines are dropped.
    /// Returns false if the worker had to be detached.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.sender = None;
        self.pending = None;
        match self.worker.take() {
            Some(mut worker) => worker.stop(timeout),
            None => true,
        }
    }
}

fn drain(running: &AtomicBool, receiver: Receiver<VoiceRequest>, speaker: Speaker, voices: Arc<PersonaRegistry>) {
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(TICK) {
            Ok(request) => {
                let voice = voices.voice_for(&request.speaker);
                if let Err(e) = speaker.speak(voice, &request.text, running) {
                    log::warn!("Voice synthesis error for {}: {:#}", request.speaker, e);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        synthesized: Arc<Mutex<Vec<(PathBuf, String, String)>>>,
        played: Arc<Mutex<Vec<PathBuf>>>,
    }

    struct FakeSynth {
        recorder: Recorder,
        fail: bool,
    }

    impl SpeechSynthesizer for FakeSynth {
        fn synthesize(&self, utterance: &Utterance<'_>, out: &Path, _running: &AtomicBool) -> Result<()> {
            self.recorder.synthesized.lock().unwrap().push((
                out.to_path_buf(),
                utterance.voice.to_string(),
                utterance.text.to_string(),
            ));
            if self.fail {
                eyre::bail!("synthesis failed");
            }
            fs::write(out, b"ID3 fake audio")?;
            Ok(())
        }
    }

    struct FakePlayer {
        recorder: Recorder,
        /// How long a track lasts if nobody interrupts it
        duration: Duration,
    }

    impl Playback for FakePlayer {
        fn play(&self, path: &Path, running: &AtomicBool) -> Result<()> {
            assert!(path.exists(), "audio file should exist during playback");
            self.recorder.played.lock().unwrap().push(path.to_path_buf());

            let deadline = Instant::now() + self.duration;
            while Instant::now() < deadline {
                if !running.load(Ordering::SeqCst) {
                    eyre::bail!("playback interrupted");
                }
                thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        }
    }

    fn speaker_with(recorder: &Recorder, fail: bool, duration: Duration) -> Speaker {
        Speaker::new(
            Box::new(FakeSynth {
                recorder: recorder.clone(),
                fail,
            }),
            Box::new(FakePlayer {
                recorder: recorder.clone(),
                duration,
            }),
            &VoiceConfig::default(),
        )
    }

    fn speaker(recorder: &Recorder, fail: bool) -> Speaker {
        speaker_with(recorder, fail, Duration::ZERO)
    }

    fn registry() -> Arc<PersonaRegistry> {
        Arc::new(PersonaRegistry::from_config(&Config::default()).unwrap())
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for voice worker");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("**Bold** _quiet_ # heading"), "Bold quiet  heading");
        assert_eq!(strip_markup("plain"), "plain");
    }

    #[test]
    fn test_speak_removes_temp_file() {
        let recorder = Recorder::default();
        let speaker = speaker(&recorder, false);

        let running = AtomicBool::new(true);
        speaker.speak("en-US-GuyNeural", "*Measured* words", &running).unwrap();

        let synthesized = recorder.synthesized.lock().unwrap().clone();
        assert_eq!(synthesized.len(), 1);
        let (path, voice, text) = &synthesized[0];
        assert_eq!(voice, "en-US-GuyNeural");
        assert_eq!(text, "Measured words");
        assert!(path.to_string_lossy().ends_with(".mp3"));
        assert!(!path.exists());
        assert_eq!(recorder.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_speak_failure_still_removes_temp_file() {
        let recorder = Recorder::default();
        let speaker = speaker(&recorder, true);

        let running = AtomicBool::new(true);
        assert!(speaker.speak("en-US-GuyNeural", "Nothing to hear", &running).is_err());

        let synthesized = recorder.synthesized.lock().unwrap().clone();
        assert!(!synthesized[0].0.exists());
        assert!(recorder.played.lock().unwrap().is_empty());
    }

    #[test]
    fn test_short_utterances_are_dropped() {
        let recorder = Recorder::default();
        let mut queue = VoiceQueue::new(speaker(&recorder, false), registry(), 6);
        queue.start().unwrap();

        assert!(!queue.say("Bob", "Hm."));
        assert!(!queue.say("Bob", "Okay"));
        assert!(queue.say("Bob", "Indeed, quite so."));

        wait_for(|| recorder.played.lock().unwrap().len() == 1);
        queue.stop(Duration::from_secs(2));

        let synthesized = recorder.synthesized.lock().unwrap().clone();
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].2, "Indeed, quite so.");
    }

    #[test]
    fn test_worker_resolves_voices_in_order() {
        let recorder = Recorder::default();
        let mut queue = VoiceQueue::new(speaker(&recorder, false), registry(), 6);
        queue.start().unwrap();

        queue.say("Loudspeaker", "Attention, everyone.");
        queue.say("Diana", "I sense a tension here.");
        queue.say("Stranger", "Who let me in here?");

        wait_for(|| recorder.played.lock().unwrap().len() == 3);
        queue.stop(Duration::from_secs(2));

        let voices: Vec<String> = recorder
            .synthesized
            .lock()
            .unwrap()
            .iter()
            .map(|(_, voice, _)| voice.clone())
            .collect();
        assert_eq!(voices, vec!["en-US-AndrewNeural", "en-US-SaraNeural", "en-US-AriaNeural"]);
    }

    #[test]
    fn test_failures_do_not_stop_worker() {
        let recorder = Recorder::default();
        let mut queue = VoiceQueue::new(speaker(&recorder, true), registry(), 6);
        queue.start().unwrap();

        queue.say("Alice", "First question, then another.");
        queue.say("Alice", "And another question after that.");

        wait_for(|| recorder.synthesized.lock().unwrap().len() == 2);
        queue.stop(Duration::from_secs(2));

        for (path, _, _) in recorder.synthesized.lock().unwrap().iter() {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_stop_leaves_no_temp_files() {
        let recorder = Recorder::default();
        let mut queue = VoiceQueue::new(speaker(&recorder, false), registry(), 6);
        queue.start().unwrap();

        assert!(queue.say("Charlie", "Every word is jazz."));
        wait_for(|| recorder.played.lock().unwrap().len() == 1);
        queue.stop(Duration::from_secs(2));

        for path in recorder.played.lock().unwrap().iter() {
            assert!(!path.exists());
        }
        assert!(!queue.say("Charlie", "Still there after stopping?"));
    }

    #[test]
    fn test_stop_mid_playback_removes_temp_file() {
        let recorder = Recorder::default();
        let mut queue = VoiceQueue::new(speaker_with(&recorder, false, Duration::from_secs(4)), registry(), 6);
        queue.start().unwrap();

        assert!(queue.say("Alice", "A long enough utterance"));
        wait_for(|| recorder.played.lock().unwrap().len() == 1);

        let started = Instant::now();
        assert!(queue.stop(Duration::from_secs(2)));
        assert!(started.elapsed() < Duration::from_secs(2));

        let played = recorder.played.lock().unwrap().clone();
        assert!(!played[0].exists(), "temp audio left behind: {}", played[0].display());
    }

    #[test]
    fn test_disabled_queue_accepts_nothing() {
        let mut queue = VoiceQueue::disabled();
        assert!(!queue.is_enabled());
        assert!(!queue.say("Alice", "Is anyone listening?"));
        queue.start().unwrap();
        queue.stop(Duration::from_millis(10));
    }
}
