//! Persona registry
//!
//! The fixed cast of the room: each persona has a prompt and a voice.
//! Built once from configuration and never mutated.

use eyre::Result;

use crate::config::Config;

/// One conversational identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
    pub voice: String,
}

/// Ordered, immutable set of personas plus the voices of non-persona speakers
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    announcer: String,
    announcer_voice: String,
    default_voice: String,
}

impl PersonaRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.personas.is_empty() {
            eyre::bail!("No personas configured");
        }

        let announcer = config.voice.announcer.clone();
        if config.personas.contains_key(&announcer) {
            eyre::bail!("Announcer name '{}' collides with a persona", announcer);
        }

        for name in config.personas.keys() {
            if name.trim().is_empty() || name.contains(char::is_whitespace) {
                eyre::bail!("Invalid persona name '{}': names must be single words", name);
            }
        }

        let personas = config
            .personas
            .iter()
            .map(|(name, persona)| Persona {
                name: name.clone(),
                prompt: persona.prompt.clone(),
                voice: persona.voice.clone(),
            })
            .collect();

        Ok(Self {
            personas,
            announcer,
            announcer_voice: config.voice.announcer_voice.clone(),
            default_voice: config.voice.default_voice.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    /// Name the operator speaks as
    pub fn announcer(&self) -> &str {
        &self.announcer
    }

    /// Voice for any speaker, falling back to the default voice
    pub fn voice_for(&self, speaker: &str) -> &str {
        if speaker == self.announcer {
            return &self.announcer_voice;
        }
        self.get(speaker)
            .map(|p| p.voice.as_str())
            .unwrap_or(&self.default_voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersonaConfig;

    #[test]
    fn test_registry_from_default_config() {
        let registry = PersonaRegistry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.names(), vec!["Alice", "Bob", "Charlie", "Diana"]);
        assert!(registry.get("Charlie").is_some());
        assert!(registry.get("charlie").is_none());
    }

    #[test]
    fn test_voice_for() {
        let registry = PersonaRegistry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.voice_for("Diana"), "en-US-SaraNeural");
        assert_eq!(registry.voice_for("Loudspeaker"), "en-US-AndrewNeural");
        assert_eq!(registry.voice_for("Stranger"), "en-US-AriaNeural");
    }

    #[test]
    fn test_empty_personas_rejected() {
        let mut config = Config::default();
        config.personas.clear();
        assert!(PersonaRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_announcer_collision_rejected() {
        let mut config = Config::default();
        config.personas.insert(
            "Loudspeaker".to_string(),
            PersonaConfig {
                voice: "en-US-GuyNeural".to_string(),
                prompt: "You are loud.".to_string(),
            },
        );
        assert!(PersonaRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_multi_word_name_rejected() {
        let mut config = Config::default();
        config.personas.insert(
            "Mary Ann".to_string(),
            PersonaConfig {
                voice: "en-US-AriaNeural".to_string(),
                prompt: "You are Mary Ann.".to_string(),
            },
        );
        assert!(PersonaRegistry::from_config(&config).is_err());
    }
}
