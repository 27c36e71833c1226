//! Per-persona agent proxy
//!
//! Owns one backend session and keeps the persona's presence flag in step
//! with the room partition.

use chrono::Local;
use eyre::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backend::{AgentBackend, MemoryBlock, Reply, Role, SessionHandle, SessionSpec};
use crate::persona::Persona;
use crate::room::SharedRoom;

pub const PERSONA_BLOCK: &str = "persona";
pub const HUMAN_BLOCK: &str = "human";
pub const ROOM_CONTEXT_BLOCK: &str = "room_context";

const PERSONA_LIMIT: usize = 2000;
const HUMAN_LIMIT: usize = 2000;
const ROOM_CONTEXT_LIMIT: usize = 1000;

/// Session settings shared by every persona
#[derive(Debug, Clone)]
pub struct SessionTemplate {
    pub room_name: String,
    /// System prompt with the room name already substituted
    pub system: String,
    pub model: String,
    pub embedding: Option<String>,
    pub tools: Vec<String>,
    /// Every persona name, in registry order
    pub roster: Vec<String>,
}

pub struct AgentProxy {
    name: String,
    room_name: String,
    backend: Arc<dyn AgentBackend>,
    room: SharedRoom,
    session: Option<SessionHandle>,
    present: AtomicBool,
    siblings: BTreeMap<String, SessionHandle>,
}

impl AgentProxy {
    pub fn new(name: &str, room_name: &str, backend: Arc<dyn AgentBackend>, room: SharedRoom) -> Self {
        Self {
            name: name.to_string(),
            room_name: room_name.to_string(),
            backend,
            room,
            session: None,
            present: AtomicBool::new(false),
            siblings: BTreeMap::new(),
        }
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn siblings(&self) -> &BTreeMap<String, SessionHandle> {
        &self.siblings
    }

    /// Allocate the backend session and enter the room
    pub fn create(&mut self, persona: &Persona, template: &SessionTemplate) -> Result<()> {
        let spec = SessionSpec {
            name: format!("agent_{}", self.name.to_lowercase()),
            system: template.system.clone(),
            model: template.model.clone(),
            embedding: template.embedding.clone(),
            blocks: vec![
                MemoryBlock::new(
                    HUMAN_BLOCK,
                    format!(
                        "Other agents in the room: {}. You are {}.",
                        template.roster.join(", "),
                        self.name
                    ),
                    HUMAN_LIMIT,
                ),
                MemoryBlock::new(PERSONA_BLOCK, persona.prompt.clone(), PERSONA_LIMIT),
                MemoryBlock::new(
                    ROOM_CONTEXT_BLOCK,
                    format!(
                        "You are in {}. Current time: {}",
                        template.room_name,
                        Local::now().format("%H:%M:%S")
                    ),
                    ROOM_CONTEXT_LIMIT,
                ),
            ],
            tools: template.tools.clone(),
        };

        let session = self
            .backend
            .create_session(&spec)
            .with_context(|| format!("Failed to create agent for {}", self.name))?;
        log::info!("{} awakened as {}", self.name, session);
        self.session = Some(session);

        self.room.with_lock(|room| {
            room.mark_present(&self.name);
            self.present.store(true, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Record the other personas' sessions and tell the agent how to reach them
    pub fn set_siblings(&mut self, siblings: BTreeMap<String, SessionHandle>) -> Result<()> {
        self.siblings = siblings;

        let Some(session) = &self.session else {
            return Ok(());
        };

        let directory = self
            .siblings
            .iter()
            .map(|(name, handle)| format!("{} (agent id {})", name, handle))
            .collect::<Vec<_>>()
            .join(", ");
        let value = format!(
            "You are {}. The others sharing the room: {}. Use their agent ids to message them directly.",
            self.name, directory
        );

        self.backend
            .update_block(session, HUMAN_BLOCK, &value)
            .with_context(|| format!("Failed to introduce {} to the others", self.name))
    }

    /// Text written into the agent's room_context block
    pub fn context_snapshot(&self) -> String {
        let now = Local::now().format("%H:%M:%S");

        let location = if self.is_present() {
            let others: Vec<String> = self
                .room
                .present_list()
                .into_iter()
                .filter(|name| name != &self.name)
                .collect();
            if others.is_empty() {
                format!("in {}", self.room_name)
            } else {
                format!("in {}. Also present: {}", self.room_name, others.join(", "))
            }
        } else {
            "alone in contemplation".to_string()
        };

        format!(
            "Time: {}. You are {}. Room has been active for {}.",
            now,
            location,
            self.room.elapsed()
        )
    }

    /// Push the current time and presence into the agent's memory
    pub fn refresh_context(&self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };

        self.backend
            .update_block(session, ROOM_CONTEXT_BLOCK, &self.context_snapshot())
            .with_context(|| format!("Failed to refresh context for {}", self.name))
    }

    /// Send one user turn and extract the reply. Blocks for the round trip.
    pub fn deliver(&self, text: &str) -> Result<Reply> {
        let Some(session) = &self.session else {
            eyre::bail!("{} has no agent session", self.name);
        };

        log::debug!("Delivering to {}: {}", self.name, text);
        let turns = self
            .backend
            .send_message(session, text, Role::User)
            .with_context(|| format!("{} did not respond", self.name))?;

        Ok(Reply::from_turns(&turns))
    }

    /// Withdraw into solitude
    pub fn leave(&self) -> String {
        let changed = self.room.with_lock(|room| {
            if !self.is_present() {
                return false;
            }
            room.mark_alone(&self.name);
            self.present.store(false, Ordering::SeqCst);
            true
        });

        if !changed {
            return format!("{} is already alone.", self.name);
        }

        log::info!("{} left the room", self.name);
        if let Err(e) = self.refresh_context() {
            log::warn!("{:#}", e);
        }
        format!("{} withdraws into solitude.", self.name)
    }

    /// Come back from solitude
    pub fn return_(&self) -> String {
        let changed = self.room.with_lock(|room| {
            if self.is_present() {
                return false;
            }
            room.mark_present(&self.name);
            self.present.store(true, Ordering::SeqCst);
            true
        });

        if !changed {
            return format!("{} is already present.", self.name);
        }

        log::info!("{} returned to the room", self.name);
        if let Err(e) = self.refresh_context() {
            log::warn!("{:#}", e);
        }
        format!("{} returns to the room.", self.name)
    }
}
