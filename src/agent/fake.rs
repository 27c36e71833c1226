//! In-memory backend for tests

use eyre::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::backend::{AgentBackend, Role, SessionHandle, SessionSpec, Turn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { name: String },
    UpdateBlock { session: String, label: String, value: String },
    Send { session: String, text: String },
    HasTool { name: String },
    Ping,
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    specs: Mutex<Vec<SessionSpec>>,
    tools: HashSet<String>,
    /// Canned turns per agent name; defaults to an echo
    replies: Mutex<HashMap<String, Vec<Turn>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str) -> Self {
        self.tools.insert(name.to_string());
        self
    }

    /// Session ids are derived from the agent name so tests can predict them
    pub fn session_id(agent_name: &str) -> String {
        format!("session-{}", agent_name)
    }

    pub fn set_reply(&self, agent_name: &str, turns: Vec<Turn>) {
        self.replies.lock().unwrap().insert(Self::session_id(agent_name), turns);
    }

    pub fn fail_session(&self, agent_name: &str) {
        self.failing.lock().unwrap().insert(Self::session_id(agent_name));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn specs(&self) -> Vec<SessionSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { session, text } => Some((session, text)),
                _ => None,
            })
            .collect()
    }

    pub fn block_updates(&self, session: &str, label: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateBlock { session: s, label: l, value } if s == session && l == label => Some(value),
                _ => None,
            })
            .collect()
    }

    fn check(&self, session: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(session) {
            eyre::bail!("backend unavailable for {}", session);
        }
        Ok(())
    }
}

impl AgentBackend for FakeBackend {
    fn create_session(&self, spec: &SessionSpec) -> Result<SessionHandle> {
        self.calls.lock().unwrap().push(Call::Create {
            name: spec.name.clone(),
        });
        self.specs.lock().unwrap().push(spec.clone());
        let id = Self::session_id(&spec.name);
        self.check(&id)?;
        Ok(SessionHandle::new(id))
    }

    fn update_block(&self, session: &SessionHandle, label: &str, value: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::UpdateBlock {
            session: session.to_string(),
            label: label.to_string(),
            value: value.to_string(),
        });
        self.check(session.as_str())
    }

    fn send_message(&self, session: &SessionHandle, text: &str, _role: Role) -> Result<Vec<Turn>> {
        self.calls.lock().unwrap().push(Call::Send {
            session: session.to_string(),
            text: text.to_string(),
        });
        self.check(session.as_str())?;

        let canned = self.replies.lock().unwrap().get(session.as_str()).cloned();
        Ok(canned.unwrap_or_else(|| vec![Turn::assistant_text(format!("{} heard: {}", session, text))]))
    }

    fn has_tool(&self, name: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(Call::HasTool { name: name.to_string() });
        Ok(self.tools.contains(name))
    }

    fn ping(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Ping);
        Ok(())
    }
}
