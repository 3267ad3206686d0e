use crate::agent::{AgentHandle, SessionContext};
use crate::state_table::ConversationState;
use crate::ticketing::SessionSnapshot;
use crate::types::{ConversationKey, Message, MessageDirection, TicketRef};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared read view of a session, safe to inspect from outside the worker.
/// The idle sweep and stats reporting read this instead of entering the
/// session's serialization domain.
pub struct SessionMeta {
    pub key: ConversationKey,
    pub created_at: DateTime<Utc>,
    state: RwLock<ConversationState>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl SessionMeta {
    pub fn new(key: ConversationKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            created_at: now,
            state: RwLock::new(ConversationState::New),
            last_activity: RwLock::new(now),
        }
    }

    pub fn state(&self) -> ConversationState {
        *self.state.read()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    pub(crate) fn set_state(&self, state: ConversationState) {
        *self.state.write() = state;
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }
}

/// The live, stateful unit of conversation. Owned exclusively by its worker
/// task; everything here is mutated only through orchestrator-issued
/// transitions, which is what makes per-session state lock-free.
pub struct Session {
    pub meta: Arc<SessionMeta>,
    pub state: ConversationState,
    pub assigned: Option<AgentHandle>,
    /// Human agent reserved by the pool, not yet adopted by a transition
    pub pending_handoff: Option<AgentHandle>,
    pub last_activity_at: DateTime<Utc>,
    pub ticket: Option<TicketRef>,
    /// Ordered message history for this session incarnation; the source of
    /// the context agents are invoked with
    pub history: Vec<Message>,
    /// Most recently recorded outbound (sequence, body), pending fan-out
    pub last_outbound: Option<(u64, String)>,
    sequence: u64,
}

impl Session {
    pub fn new(meta: Arc<SessionMeta>) -> Self {
        let last_activity_at = meta.last_activity();
        Self {
            meta,
            state: ConversationState::New,
            assigned: None,
            pending_handoff: None,
            last_activity_at,
            ticket: None,
            history: Vec::new(),
            last_outbound: None,
            sequence: 0,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.meta.key
    }

    /// Hand out the next sequence number. Strictly increasing, gap-free,
    /// starting at 1.
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Undo the last `next_sequence` after a failed transcript append, so
    /// the numbering stays gap-free
    pub fn rollback_sequence(&mut self) {
        self.sequence = self.sequence.saturating_sub(1);
    }

    /// Record activity on the session (external events only; internal
    /// follow-ups don't keep a session alive)
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
        self.meta.touch();
    }

    pub fn set_state(&mut self, state: ConversationState) {
        self.state = state;
        self.meta.set_state(state);
    }

    /// Context the assigned agent is invoked with
    pub fn context(&self) -> SessionContext {
        SessionContext {
            key: self.meta.key.clone(),
            state: self.state,
            history: self.history.clone(),
            ticket: self.ticket.clone(),
        }
    }

    /// Snapshot handed to the ticketing gateway
    pub fn snapshot(&self, reason: impl Into<String>) -> SessionSnapshot {
        let short_description = self
            .history
            .iter()
            .rev()
            .find(|m| m.direction == MessageDirection::Inbound)
            .map(|m| m.body.clone())
            .unwrap_or_else(|| format!("conversation on {}", self.meta.key.channel));
        SessionSnapshot {
            key: self.meta.key.clone(),
            state: self.state,
            reason: reason.into(),
            short_description,
        }
    }
}
