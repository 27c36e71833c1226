//! Stateful agents behind the personas
//!
//! - `backend`: the request/response seam to the agent service
//! - `letta`: HTTP client for a Letta server
//! - `proxy`: one proxy per persona, owning its session and presence flag

pub mod backend;
#[cfg(test)]
pub mod fake;
pub mod letta;
pub mod proxy;

pub use backend::AgentBackend;
pub use letta::LettaClient;
pub use proxy::{AgentProxy, SessionTemplate};
