//! Letta REST client
//!
//! Speaks the v1 agents API over blocking HTTP.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::backend::{AgentBackend, Role, SessionHandle, SessionSpec, Turn, TurnContent};

pub struct LettaClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CreateAgentRequest<'a> {
    name: &'a str,
    system: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding: Option<&'a str>,
    memory_blocks: Vec<BlockRequest<'a>>,
    tools: &'a [String],
}

#[derive(Debug, Serialize)]
struct BlockRequest<'a> {
    label: &'a str,
    value: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct UpdateBlockRequest<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    messages: Vec<MessageCreate<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageCreate<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct LettaResponse {
    #[serde(default)]
    messages: Vec<LettaMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
enum LettaMessage {
    AssistantMessage {
        content: MessageContent,
    },
    ToolCallMessage {
        tool_call: ToolCall,
    },
    UserMessage {
        content: MessageContent,
    },
    SystemMessage {
        content: MessageContent,
    },
    /// Reasoning, tool returns and anything newer
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolSummary {
    name: String,
}

impl LettaClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl AgentBackend for LettaClient {
    fn create_session(&self, spec: &SessionSpec) -> Result<SessionHandle> {
        log::info!("Creating agent '{}' with model {}", spec.name, spec.model);

        let request = CreateAgentRequest {
            name: &spec.name,
            system: &spec.system,
            model: &spec.model,
            embedding: spec.embedding.as_deref(),
            memory_blocks: spec
                .blocks
                .iter()
                .map(|b| BlockRequest {
                    label: &b.label,
                    value: &b.value,
                    limit: b.limit,
                })
                .collect(),
            tools: &spec.tools,
        };
        let request_body = serde_json::to_string(&request).context("Failed to serialize request")?;

        let mut response = self
            .agent
            .post(&self.url("/v1/agents/"))
            .header("Authorization", &self.bearer())
            .header("Content-Type", "application/json")
            .send(request_body.as_bytes())
            .with_context(|| format!("Failed to create agent '{}'", spec.name))?;

        let response_body = response
            .body_mut()
            .read_to_string()
            .context("Failed to read response")?;
        let agent: AgentResponse = serde_json::from_str(&response_body).context("Failed to parse agent response")?;

        log::debug!("Agent '{}' created with id {}", spec.name, agent.id);
        Ok(SessionHandle::new(agent.id))
    }

    fn update_block(&self, session: &SessionHandle, label: &str, value: &str) -> Result<()> {
        let request_body =
            serde_json::to_string(&UpdateBlockRequest { value }).context("Failed to serialize request")?;

        self.agent
            .patch(&self.url(&format!("/v1/agents/{}/core-memory/blocks/{}", session.as_str(), label)))
            .header("Authorization", &self.bearer())
            .header("Content-Type", "application/json")
            .send(request_body.as_bytes())
            .with_context(|| format!("Failed to update block '{}' of agent {}", label, session))?;

        log::debug!("Updated block '{}' of agent {}", label, session);
        Ok(())
    }

    fn send_message(&self, session: &SessionHandle, text: &str, role: Role) -> Result<Vec<Turn>> {
        let request = SendMessageRequest {
            messages: vec![MessageCreate {
                role: role.as_str(),
                content: text,
            }],
        };
        let request_body = serde_json::to_string(&request).context("Failed to serialize request")?;

        let mut response = self
            .agent
            .post(&self.url(&format!("/v1/agents/{}/messages", session.as_str())))
            .header("Authorization", &self.bearer())
            .header("Content-Type", "application/json")
            .send(request_body.as_bytes())
            .with_context(|| format!("Failed to send message to agent {}", session))?;

        let response_body = response
            .body_mut()
            .read_to_string()
            .context("Failed to read response")?;

        parse_turns(&response_body)
    }

    fn has_tool(&self, name: &str) -> Result<bool> {
        let mut response = self
            .agent
            .get(&self.url("/v1/tools/"))
            .query("name", name)
            .header("Authorization", &self.bearer())
            .call()
            .context("Failed to list tools")?;

        let response_body = response
            .body_mut()
            .read_to_string()
            .context("Failed to read response")?;
        let tools: Vec<ToolSummary> = serde_json::from_str(&response_body).context("Failed to parse tool list")?;

        Ok(tools.iter().any(|t| t.name == name))
    }

    fn ping(&self) -> Result<()> {
        self.agent
            .get(&self.url("/v1/health/"))
            .header("Authorization", &self.bearer())
            .call()
            .with_context(|| format!("Backend at {} is unreachable", self.base_url))?;
        Ok(())
    }
}

/// Map a messages response to turns, dropping kinds the room does not use
fn parse_turns(body: &str) -> Result<Vec<Turn>> {
    let response: LettaResponse = serde_json::from_str(body).context("Failed to parse message response")?;

    let turns = response
        .messages
        .into_iter()
        .filter_map(|message| match message {
            LettaMessage::AssistantMessage { content } => Some(Turn {
                role: Role::Assistant,
                content: TurnContent::Text(content.into_text()),
            }),
            LettaMessage::ToolCallMessage { tool_call } => Some(Turn {
                role: Role::Assistant,
                content: TurnContent::ToolCall {
                    name: tool_call.name.unwrap_or_default(),
                    arguments: tool_call.arguments.unwrap_or_default(),
                },
            }),
            LettaMessage::UserMessage { content } => Some(Turn {
                role: Role::User,
                content: TurnContent::Text(content.into_text()),
            }),
            LettaMessage::SystemMessage { content } => Some(Turn {
                role: Role::System,
                content: TurnContent::Text(content.into_text()),
            }),
            LettaMessage::Other => None,
        })
        .collect();

    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::backend::Reply;

    #[test]
    fn test_parse_assistant_message() {
        let body = r#"{
            "messages": [
                {"message_type": "reasoning_message", "reasoning": "They greeted me."},
                {"message_type": "assistant_message", "content": "Hello, operator."}
            ],
            "usage": {"total_tokens": 42}
        }"#;

        let turns = parse_turns(body).unwrap();
        assert_eq!(turns, vec![Turn::assistant_text("Hello, operator.")]);
    }

    #[test]
    fn test_parse_content_parts() {
        let body = r#"{"messages": [
            {"message_type": "assistant_message", "content": [{"type": "text", "text": "Two "}, {"type": "text", "text": "parts"}]}
        ]}"#;

        let turns = parse_turns(body).unwrap();
        assert_eq!(Reply::from_turns(&turns), Reply::Text("Two parts".to_string()));
    }

    #[test]
    fn test_parse_tool_call() {
        let body = r#"{"messages": [
            {"message_type": "tool_call_message", "tool_call": {"name": "send_message_to_agent_async", "arguments": "{\"message\": \"hi Bob\"}"}},
            {"message_type": "tool_return_message", "tool_return": "ok", "status": "success"}
        ]}"#;

        let turns = parse_turns(body).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(
            Reply::from_turns(&turns),
            Reply::ToolInvocation {
                name: "send_message_to_agent_async".to_string(),
                arguments: "{\"message\": \"hi Bob\"}".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_empty_messages() {
        let turns = parse_turns(r#"{"messages": []}"#).unwrap();
        assert!(turns.is_empty());
        assert_eq!(Reply::from_turns(&turns), Reply::Empty);
    }

    #[test]
    fn test_parse_invalid_body() {
        assert!(parse_turns("not json").is_err());
    }

    #[test]
    fn test_create_request_shape() {
        let tools = vec!["send_message_to_agent_async".to_string()];
        let request = CreateAgentRequest {
            name: "agent_alice",
            system: "You are in a room.",
            model: "anthropic/claude-3-5-sonnet-latest",
            embedding: None,
            memory_blocks: vec![BlockRequest {
                label: "persona",
                value: "You are Alice.",
                limit: 2000,
            }],
            tools: &tools,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["memory_blocks"][0]["label"], "persona");
        assert_eq!(json["tools"][0], "send_message_to_agent_async");
        assert!(json.get("embedding").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LettaClient::new("http://localhost:8283/", "key".to_string(), Duration::from_secs(5));
        assert_eq!(client.url("/v1/agents/"), "http://localhost:8283/v1/agents/");
    }
}
