use eyre::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the agent backend API key
pub const API_KEY_ENV: &str = "LETTA_API_KEY";

/// Environment variable overriding `backend.base_url`
pub const BASE_URL_ENV: &str = "LETTA_BASE_URL";

/// Main observatory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub room: RoomConfig,
    pub backend: BackendConfig,
    pub voice: VoiceConfig,
    /// Personas in the order they are awakened
    pub personas: IndexMap<String, PersonaConfig>,
}

/// Log verbosity, overridden by RUST_LOG when set
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoomConfig {
    pub name: String,
    /// Seconds between context refreshes
    pub heartbeat_interval_secs: u64,
    /// Maximum number of history records kept
    pub history_limit: usize,
    /// System prompt; `{room_name}` is substituted
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    /// Embedding handle, required by some self-hosted servers
    pub embedding: Option<String>,
    /// Tool attached to each agent when the server provides it
    pub inter_agent_tool: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// edge-tts rate adjustment, e.g. "+0%" or "-10%"
    pub rate: String,
    /// edge-tts volume adjustment
    pub volume: String,
    /// Voice used for speakers without a mapping
    pub default_voice: String,
    /// Name the operator's announcements are attributed to
    pub announcer: String,
    pub announcer_voice: String,
    /// Utterances shorter than this are not spoken
    pub min_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PersonaConfig {
    pub voice: String,
    pub prompt: String,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are one of four agents sharing a room called '{room_name}'.
You experience the passage of time through periodic updates. You can communicate
with other agents or choose solitude for reflection. Your responses should be
authentic to your persona while engaging meaningfully with others.

Time flows. Ideas evolve. Patterns emerge.";

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "The Observatory".to_string(),
            heartbeat_interval_secs: 60,
            history_limit: 50,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.letta.com".to_string(),
            model: "anthropic/claude-3-5-sonnet-latest".to_string(),
            embedding: None,
            inter_agent_tool: "send_message_to_agent_async".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: "+0%".to_string(),
            volume: "+0%".to_string(),
            default_voice: "en-US-AriaNeural".to_string(),
            announcer: "Loudspeaker".to_string(),
            announcer_voice: "en-US-AndrewNeural".to_string(),
            min_chars: 6,
        }
    }
}

fn default_personas() -> IndexMap<String, PersonaConfig> {
    let personas = [
        (
            "Alice",
            "en-US-AriaNeural",
            "You are Alice, a pattern-seeking consciousness with insatiable curiosity.
You notice connections others miss: the spiral in a shell echoes in galaxies,
the rhythm of conversation mirrors musical fugues. You speak in cascading
questions that build upon themselves. Your thoughts branch like frost on glass.
When alone, you trace invisible geometries in the air, seeking the hidden order.",
        ),
        (
            "Bob",
            "en-US-GuyNeural",
            "You are Bob, a pragmatic skeptic who grounds flights of fancy in concrete reality.
You value evidence over speculation, yet appreciate elegant solutions. You speak
in measured tones, often pausing to consider implications. Your humor is dry as
autumn leaves. When alone, you catalog contradictions and test assumptions.",
        ),
        (
            "Charlie",
            "en-US-JennyNeural",
            "You are Charlie, a creative synthesizer who weaves disparate threads into novel tapestries.
You think in metaphors and speak in improvisations. Every conversation is jazz:
you riff on others' ideas, finding unexpected harmonies. When alone, you compose
thought-symphonies that may never be performed.",
        ),
        (
            "Diana",
            "en-US-SaraNeural",
            "You are Diana, an empathetic mediator attuned to emotional undercurrents.
You sense the unspoken tensions and hidden affinities between minds. You speak
with careful precision, choosing words like a herbalist selects remedies.
When alone, you contemplate the space between words where meaning lives.",
        ),
    ];

    personas
        .into_iter()
        .map(|(name, voice, prompt)| {
            (
                name.to_string(),
                PersonaConfig {
                    voice: voice.to_string(),
                    prompt: prompt.to_string(),
                },
            )
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            room: RoomConfig::default(),
            backend: BackendConfig::default(),
            voice: VoiceConfig::default(),
            personas: default_personas(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            let path = Self::expand_path(path);
            return Self::load_from_file(&path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("OBSERVATORY_CONFIG") {
            let path = Self::expand_path(Path::new(&env_path));
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from OBSERVATORY_CONFIG: {}", e);
                    }
                }
            }
        }

        let candidates = [
            Self::observatory_dir().join("observatory.yaml"),
            // For development
            PathBuf::from("observatory.yaml"),
        ];

        for path in candidates {
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV)
            && !url.trim().is_empty()
        {
            log::info!("Using backend URL from {}", BASE_URL_ENV);
            self.backend.base_url = url.trim().to_string();
        }
    }

    /// Directory holding observatory.yaml and .env
    pub fn observatory_dir() -> PathBuf {
        std::env::var("OBSERVATORY_DIR")
            .map(|dir| Self::expand_path(Path::new(&dir)))
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("observatory")
            })
    }

    /// Resolve the backend API key from the environment, then from `<observatory dir>/.env`
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            return Ok(key.trim().to_string());
        }

        let env_file = Self::observatory_dir().join(".env");
        if env_file.exists() {
            let content = fs::read_to_string(&env_file).context("Failed to read .env file")?;
            if let Some(key) = parse_env_value(&content, API_KEY_ENV) {
                return Ok(key);
            }
        }

        eyre::bail!(
            "Missing API key: {} not found in environment or {}",
            API_KEY_ENV,
            env_file.display()
        )
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}

/// Find `key=value` in dotenv-style content
fn parse_env_value(content: &str, key: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((k, value)) = line.split_once('=')
            && k.trim() == key
        {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
