//! Room controller
//!
//! Owns the agent proxies and the room state, routes operator messages,
//! and runs the heartbeat that keeps every agent's sense of time current.

use eyre::{Context, Result};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentBackend, AgentProxy, SessionTemplate};
use crate::config::Config;
use crate::persona::PersonaRegistry;
use crate::room::{MessageRecord, Recipient, SharedRoom};
use crate::task::{self, BackgroundTask, TaskSignal};
use crate::voice::VoiceQueue;

/// How long shutdown waits for each background thread
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub const EMPTY_ROOM: &str = "The room is empty. Your words echo unheard.";

const STATUS_RECENT: usize = 5;
const HISTORY_RECENT: usize = 20;
const PREVIEW_CHARS: usize = 50;

type Agents = IndexMap<String, Arc<AgentProxy>>;

pub struct RoomController {
    room_name: String,
    heartbeat_interval: Duration,
    template: TemplateSettings,
    backend: Arc<dyn AgentBackend>,
    registry: Arc<PersonaRegistry>,
    room: SharedRoom,
    agents: Arc<Agents>,
    voice: VoiceQueue,
    heartbeat: Option<BackgroundTask>,
}

/// Session settings taken from config before agents exist
struct TemplateSettings {
    system: String,
    model: String,
    embedding: Option<String>,
    inter_agent_tool: String,
}

impl RoomController {
    pub fn new(
        config: &Config,
        backend: Arc<dyn AgentBackend>,
        registry: Arc<PersonaRegistry>,
        voice: VoiceQueue,
    ) -> Self {
        Self {
            room_name: config.room.name.clone(),
            heartbeat_interval: Duration::from_secs(config.room.heartbeat_interval_secs.max(1)),
            template: TemplateSettings {
                system: config.room.system_prompt.replace("{room_name}", &config.room.name),
                model: config.backend.model.clone(),
                embedding: config.backend.embedding.clone(),
                inter_agent_tool: config.backend.inter_agent_tool.clone(),
            },
            backend,
            registry,
            room: SharedRoom::new(config.room.history_limit),
            agents: Arc::new(IndexMap::new()),
            voice,
            heartbeat: None,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Create every persona's agent in registry order, then introduce them
    pub fn initialize_agents(&mut self) -> Result<()> {
        let mut tools = Vec::new();
        let tool = &self.template.inter_agent_tool;
        if !tool.is_empty() {
            match self.backend.has_tool(tool) {
                Ok(true) => tools.push(tool.clone()),
                Ok(false) => log::info!("Backend has no '{}' tool; agents cannot message each other", tool),
                Err(e) => log::warn!("Could not check for tool '{}': {:#}", tool, e),
            }
        }

        let template = SessionTemplate {
            room_name: self.room_name.clone(),
            system: self.template.system.clone(),
            model: self.template.model.clone(),
            embedding: self.template.embedding.clone(),
            tools,
            roster: self.registry.names(),
        };

        let mut proxies: IndexMap<String, AgentProxy> = IndexMap::new();
        if let Err(e) = self.create_roster(&template, &mut proxies) {
            // Personas that did come up must not linger in the room
            self.room.with_lock(|room| {
                for name in proxies.keys() {
                    room.forget(name);
                }
            });
            return Err(e);
        }

        self.agents = Arc::new(
            proxies
                .into_iter()
                .map(|(name, proxy)| (name, Arc::new(proxy)))
                .collect(),
        );
        log::info!("All {} agents initialized", self.agents.len());
        Ok(())
    }

    fn create_roster(&self, template: &SessionTemplate, proxies: &mut IndexMap<String, AgentProxy>) -> Result<()> {
        for persona in self.registry.iter() {
            log::info!("Awakening {}", persona.name);
            let mut proxy = AgentProxy::new(&persona.name, &self.room_name, self.backend.clone(), self.room.clone());
            proxy.create(persona, template)?;
            proxies.insert(persona.name.clone(), proxy);
        }

        let handles: BTreeMap<String, _> = proxies
            .iter()
            .filter_map(|(name, proxy)| proxy.session().map(|s| (name.clone(), s.clone())))
            .collect();

        for (name, proxy) in proxies.iter_mut() {
            let siblings = handles
                .iter()
                .filter(|(other, _)| *other != name)
                .map(|(other, handle)| (other.clone(), handle.clone()))
                .collect();
            proxy.set_siblings(siblings)?;
        }
        Ok(())
    }

    /// Launch the heartbeat and the voice worker
    pub fn start(&mut self) -> Result<()> {
        if !self.heartbeat.as_ref().is_some_and(BackgroundTask::is_running) {
            let agents = self.agents.clone();
            let interval = self.heartbeat_interval;
            self.heartbeat = Some(
                BackgroundTask::spawn("heartbeat", move |running| {
                    while task::pause(&running, interval) {
                        pulse(&agents);
                    }
                })
                .context("Failed to start heartbeat")?,
            );
            log::info!("Heartbeat started at {:?} intervals", interval);
        }

        self.voice.start().context("Failed to start voice worker")?;
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_enabled()
    }

    /// Deliver an announcement to everyone present
    ///
    /// A persona whose backend call fails is reported inline; the others
    /// still hear the message.
    pub fn broadcast(&self, message: &str) -> String {
        let present = self.room.present_list();
        if present.is_empty() {
            return EMPTY_ROOM.to_string();
        }

        let announcer = self.registry.announcer();
        log::info!("Broadcast to {}: {}", present.join(", "), message);
        self.voice.say(announcer, message);

        let mut responses = Vec::with_capacity(present.len());
        for name in &present {
            let Some(agent) = self.agents.get(name) else {
                continue;
            };

            match agent.deliver(&format!("[{}]: {}", announcer, message)) {
                Ok(reply) => {
                    let reply = reply.to_string();
                    self.room.record(announcer, message, Recipient::Room);
                    self.voice.say(name, &reply);
                    responses.push(format!("{}: {}", name, reply));
                }
                Err(e) => {
                    log::warn!("Broadcast to {} failed: {:#}", name, e);
                    responses.push(format!("{}: (no response: {})", name, e));
                }
            }
        }

        responses.join("\n")
    }

    /// Route a message from one persona to another, present or not
    pub fn direct_message(&self, sender: &str, recipient: &str, message: &str) -> Result<String> {
        if !self.is_known(sender) {
            return Ok(format!("Unknown sender: {}", sender));
        }
        let Some(agent) = self.agents.get(recipient) else {
            return Ok(format!("Unknown recipient: {}", recipient));
        };

        log::info!("{} -> {}: {}", sender, recipient, message);
        self.voice.say(sender, message);

        let reply = agent.deliver(&format!("{} says: {}", sender, message))?.to_string();
        self.voice.say(recipient, &reply);
        self.room
            .record(sender, message, Recipient::Persona(recipient.to_string()));

        Ok(format!("{}: {}", recipient, reply))
    }

    pub fn leave(&self, name: &str) -> String {
        match self.agents.get(name) {
            Some(agent) => agent.leave(),
            None => format!("Unknown agent: {}", name),
        }
    }

    pub fn return_(&self, name: &str) -> String {
        match self.agents.get(name) {
            Some(agent) => agent.return_(),
            None => format!("Unknown agent: {}", name),
        }
    }

    pub fn status(&self) -> String {
        let rule = "=".repeat(60);
        let present = self.room.present_list();
        let alone = self.room.alone_list();

        let mut lines = vec![
            rule.clone(),
            format!("Room Status - {}", self.room_name),
            format!("Time Active: {}", self.room.elapsed()),
            rule,
            String::new(),
            format!("Present in room: {}", join_or_nobody(&present)),
            format!("In solitude: {}", join_or_nobody(&alone)),
        ];

        let recent = self.room.recent(STATUS_RECENT);
        if !recent.is_empty() {
            lines.push(String::new());
            lines.push(format!("Recent activity (last {}):", STATUS_RECENT));
            for record in &recent {
                lines.push(format!("  {}", preview_line(record)));
            }
        }

        lines.join("\n")
    }

    pub fn history(&self) -> String {
        let recent = self.room.recent(HISTORY_RECENT);
        if recent.is_empty() {
            return "No messages yet.".to_string();
        }

        let mut lines = vec![format!(
            "Message History (last {} of {}):",
            recent.len(),
            self.room.history_len()
        )];
        lines.extend(recent.iter().map(|record| {
            format!(
                "[{}] {} → {}: {}",
                record.time(),
                record.sender,
                record.recipient,
                record.content
            )
        }));
        lines.join("\n")
    }

    /// Stop switches for the running background tasks, for use off the console thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        let signals = self
            .heartbeat
            .as_ref()
            .map(BackgroundTask::signal)
            .into_iter()
            .chain(self.voice.signal())
            .collect();
        ShutdownHandle { signals }
    }

    /// Stop the heartbeat and the voice worker, each with a bounded wait
    pub fn shutdown(&mut self) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop(SHUTDOWN_TIMEOUT);
            log::info!("Heartbeat stopped");
        }
        self.voice.stop(SHUTDOWN_TIMEOUT);
    }
}

/// Halts the background tasks without owning the controller
#[derive(Clone)]
pub struct ShutdownHandle {
    signals: Vec<TaskSignal>,
}

impl ShutdownHandle {
    /// Stop every task, waiting at most `SHUTDOWN_TIMEOUT` for each.
    /// Returns false if any had to be detached.
    pub fn halt(&self) -> bool {
        self.signals
            .iter()
            .fold(true, |clean, signal| signal.halt(SHUTDOWN_TIMEOUT) && clean)
    }
}

impl Drop for RoomController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pulse(agents: &Agents) {
    for agent in agents.values() {
        if let Err(e) = agent.refresh_context() {
            log::warn!("Heartbeat: {:#}", e);
        }
    }
    log::debug!("Heartbeat refreshed {} agents", agents.len());
}

fn join_or_nobody(names: &[String]) -> String {
    if names.is_empty() {
        "Nobody".to_string()
    } else {
        names.join(", ")
    }
}

fn preview_line(record: &MessageRecord) -> String {
    let arrow = match record.recipient {
        Recipient::Room => "⟹",
        Recipient::Persona(_) => "→",
    };
    let preview: String = record.content.chars().take(PREVIEW_CHARS).collect();
    format!(
        "[{}] {} {} {}: {}...",
        record.time(),
        record.sender,
        arrow,
        record.recipient,
        preview
    )
}
