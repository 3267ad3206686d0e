//! # Agents
//!
//! The orchestrator never looks inside an agent: AI backends and human
//! desks are opaque capabilities reached through the single
//! [`AgentConnector`] seam, and policy branches only on the closed
//! [`AgentKind`] set. The pool owns the handles; a session holds a
//! non-owning clone of whichever handle is assigned to it.

pub mod pool;

pub use pool::{AgentPool, Assignment, PoolNotice, PoolStats};

use crate::types::{ConversationKey, Message, TicketRef};
use crate::state_table::ConversationState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Agent ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(format!("agent-{}", uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of agent flavors the orchestrator routes between
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum AgentKind {
    Ai,
    Human,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Ai => "ai",
            AgentKind::Human => "human",
        };
        write!(f, "{}", name)
    }
}

/// Everything an agent gets to see when invoked: the ordered message
/// history of this session up to the current sequence number, plus ticket
/// context if one exists.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub key: ConversationKey,
    pub state: ConversationState,
    pub history: Vec<Message>,
    pub ticket: Option<TicketRef>,
}

/// What an agent invocation produced
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// A reply to send back to the end user
    Reply(String),
    /// The agent cannot resolve this conversation
    Escalate { reason: String },
    /// Nothing to send (e.g. a human acknowledged without responding)
    NoReply,
}

/// Agent invocation failure. There is no transient variant: adapters and
/// backends do their own retries, and anything that surfaces here moves
/// the session to `Failed`.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("unrecoverable agent error: {0}")]
    Unrecoverable(String),
}

/// The one invocation capability the orchestrator requires of any agent
#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn invoke(&self, context: SessionContext) -> Result<AgentOutcome, AgentError>;
}

/// Non-owning reference to a pool-registered agent
#[derive(Clone)]
pub struct AgentHandle {
    pub id: AgentId,
    pub kind: AgentKind,
    pub connector: Arc<dyn AgentConnector>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
