//! Error types for conversation orchestration

use crate::types::ConversationKey;
use thiserror::Error;

/// Orchestrator-level failures. The collaborator seams carry their own
/// narrower error types (`TicketingUnavailable`, `AgentError`,
/// `DeliveryFailed`); this enum covers what the engine itself can fail on.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("transcript sink error: {0}")]
    Transcript(String),

    #[error("session for {0} is closed")]
    SessionClosed(ConversationKey),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
