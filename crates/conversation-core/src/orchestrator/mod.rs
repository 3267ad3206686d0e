//! # Orchestrator
//!
//! The core control loop that binds an end-user identity, an organization,
//! a channel, and an agent into one continuously-addressable session.
//!
//! ```text
//! Channel Adapter ──InboundEvent──► ConversationEngine
//!                                        │ get_or_create
//!                                        ▼
//!                                  SessionRegistry ──► per-session worker
//!                                        │                   │
//!                                  AgentPool ◄── assign ─────┤
//!                                                            ▼
//!                                            state table transition
//!                                          ┌─────────┼──────────┐
//!                                          ▼         ▼          ▼
//!                                   TranscriptSink  Channel  Ticketing
//!                                   (write-ahead)   reply    Gateway
//! ```
//!
//! Every session is its own mutual-exclusion domain: one worker task owns
//! the session and drains a FIFO command queue, so no two events for the
//! same key are ever processed concurrently while independent sessions run
//! fully in parallel. Agent invocation and ticketing calls are the only
//! suspension points.

pub mod engine;
pub(crate) mod session_task;

pub use engine::{ConversationEngine, ConversationEngineBuilder};

use crate::adapters::ChannelRouter;
use crate::agent::AgentPool;
use crate::config::EngineConfig;
use crate::state_table::ConversationState;
use crate::ticketing::TicketingClient;
use crate::transcript::TranscriptSink;
use crate::types::{CloseReason, ConversationKey, MessageDirection};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Notifications published to observers (UI push, monitoring) as sessions
/// progress. Lossy by design: a lagging subscriber never slows a session.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    StateChanged {
        key: ConversationKey,
        from: ConversationState,
        to: ConversationState,
    },
    MessageAccepted {
        key: ConversationKey,
        sequence: u64,
        direction: MessageDirection,
    },
    TicketOpened {
        key: ConversationKey,
        ticket_id: String,
    },
    TicketUpdated {
        key: ConversationKey,
    },
    TicketPendingSync {
        key: ConversationKey,
    },
    Incident {
        key: ConversationKey,
        detail: String,
    },
    SessionClosed {
        key: ConversationKey,
        reason: CloseReason,
    },
    SessionFailed {
        key: ConversationKey,
    },
}

/// Collaborators shared by every session worker
pub struct SessionDeps {
    pub config: EngineConfig,
    pub pool: Arc<AgentPool>,
    pub transcript: Arc<dyn TranscriptSink>,
    pub ticketing: TicketingClient,
    pub router: Arc<ChannelRouter>,
    pub notices: broadcast::Sender<SessionNotice>,
}

impl SessionDeps {
    /// Publish a notice; nobody listening is fine
    pub fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }
}
