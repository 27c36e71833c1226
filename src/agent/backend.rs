//! The request/response seam to the stateful-agent service

use eyre::Result;
use std::fmt;

/// Opaque session identifier issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A named slot of session memory
#[derive(Debug, Clone)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
    pub limit: usize,
}

impl MemoryBlock {
    pub fn new(label: &str, value: impl Into<String>, limit: usize) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
            limit,
        }
    }
}

/// Everything needed to allocate a session
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub name: String,
    pub system: String,
    pub model: String,
    pub embedding: Option<String>,
    pub blocks: Vec<MemoryBlock>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnContent {
    Text(String),
    ToolCall { name: String, arguments: String },
}

/// One turn of a backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::ToolCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// What a persona said back, normalized from the backend's turns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    ToolInvocation { name: String, arguments: String },
    Empty,
}

impl Reply {
    /// Assistant text wins; a tool invocation stands in when there is no text
    pub fn from_turns(turns: &[Turn]) -> Self {
        let assistant = || turns.iter().filter(|t| t.role == Role::Assistant);

        let text = assistant().find_map(|t| match &t.content {
            TurnContent::Text(text) if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        });
        if let Some(text) = text {
            return Reply::Text(text);
        }

        assistant()
            .find_map(|t| match &t.content {
                TurnContent::ToolCall { name, arguments } => Some(Reply::ToolInvocation {
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .unwrap_or(Reply::Empty)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Text(text) => write!(f, "{}", text),
            Reply::ToolInvocation { arguments, .. } => write!(f, "{}", arguments),
            Reply::Empty => write!(f, "..."),
        }
    }
}

/// Stateful-agent service
pub trait AgentBackend: Send + Sync {
    /// Allocate a new session
    fn create_session(&self, spec: &SessionSpec) -> Result<SessionHandle>;

    /// Overwrite one memory block of a session
    fn update_block(&self, session: &SessionHandle, label: &str, value: &str) -> Result<()>;

    /// Send a single turn and return the response turns
    fn send_message(&self, session: &SessionHandle, text: &str, role: Role) -> Result<Vec<Turn>>;

    /// Whether the service provides a tool with this name
    fn has_tool(&self, name: &str) -> Result<bool>;

    /// Cheap reachability check
    fn ping(&self) -> Result<()>;
}
