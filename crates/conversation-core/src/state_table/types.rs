use crate::types::CloseReason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConversationState {
    /// Session created, no agent assigned yet
    New,
    /// An AI agent is handling the conversation
    ActiveAi,
    /// Escalation signalled; human assignment in flight
    Escalating,
    /// No human capacity; queued until one frees up
    WaitingForHuman,
    /// A human agent is handling the conversation
    ActiveHuman,
    /// Closed on request or idle timeout (terminal)
    Closed,
    /// Unrecoverable agent error (terminal, no auto-retry)
    Failed,
}

impl ConversationState {
    /// All states, for table totality checks
    pub const ALL: [ConversationState; 7] = [
        ConversationState::New,
        ConversationState::ActiveAi,
        ConversationState::Escalating,
        ConversationState::WaitingForHuman,
        ConversationState::ActiveHuman,
        ConversationState::Closed,
        ConversationState::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Closed | ConversationState::Failed)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConversationState::New => "new",
            ConversationState::ActiveAi => "active-ai",
            ConversationState::Escalating => "escalating",
            ConversationState::WaitingForHuman => "waiting-for-human",
            ConversationState::ActiveHuman => "active-human",
            ConversationState::Closed => "closed",
            ConversationState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Events that drive session transitions. Inbound* events come from channel
/// adapters (via the engine), Agent* events are produced by agent
/// invocation, and the rest are pool / sweep coordination events.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    // Channel events
    InboundMessage { body: String },
    InboundEscalation { reason: String },
    InboundClose { reason: CloseReason },

    // Agent invocation outcomes
    AgentReplied { body: String },
    AgentEscalated { reason: String },
    AgentFailed { detail: String },

    // Pool coordination events
    HumanReady { agent_id: String },
    NoHumanCapacity,

    // Sweep events
    IdleExpired,
}

impl EventType {
    /// Get the type name of this event (without parameter values)
    pub fn type_name(&self) -> &'static str {
        match self {
            EventType::InboundMessage { .. } => "InboundMessage",
            EventType::InboundEscalation { .. } => "InboundEscalation",
            EventType::InboundClose { .. } => "InboundClose",
            EventType::AgentReplied { .. } => "AgentReplied",
            EventType::AgentEscalated { .. } => "AgentEscalated",
            EventType::AgentFailed { .. } => "AgentFailed",
            EventType::HumanReady { .. } => "HumanReady",
            EventType::NoHumanCapacity => "NoHumanCapacity",
            EventType::IdleExpired => "IdleExpired",
        }
    }

    /// Normalize the event for state table lookups by removing
    /// runtime-specific field values, so the table matches on event type
    /// rather than exact payloads.
    pub fn normalize(&self) -> Self {
        match self {
            EventType::InboundMessage { .. } => EventType::InboundMessage {
                body: String::new(),
            },
            EventType::InboundEscalation { .. } => EventType::InboundEscalation {
                reason: String::new(),
            },
            EventType::InboundClose { .. } => EventType::InboundClose {
                reason: CloseReason::default(),
            },
            EventType::AgentReplied { .. } => EventType::AgentReplied {
                body: String::new(),
            },
            EventType::AgentEscalated { .. } => EventType::AgentEscalated {
                reason: String::new(),
            },
            EventType::AgentFailed { .. } => EventType::AgentFailed {
                detail: String::new(),
            },
            EventType::HumanReady { .. } => EventType::HumanReady {
                agent_id: String::new(),
            },

            // Events without fields pass through unchanged
            _ => self.clone(),
        }
    }

    /// One normalized exemplar per variant, for table totality checks
    pub fn exemplars() -> Vec<EventType> {
        vec![
            EventType::InboundMessage {
                body: String::new(),
            },
            EventType::InboundEscalation {
                reason: String::new(),
            },
            EventType::InboundClose {
                reason: CloseReason::default(),
            },
            EventType::AgentReplied {
                body: String::new(),
            },
            EventType::AgentEscalated {
                reason: String::new(),
            },
            EventType::AgentFailed {
                detail: String::new(),
            },
            EventType::HumanReady {
                agent_id: String::new(),
            },
            EventType::NoHumanCapacity,
            EventType::IdleExpired,
        ]
    }
}

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateKey {
    pub state: ConversationState,
    pub event: EventType,
}

/// Guards that must be satisfied for a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Guard {
    /// The session currently has an assigned agent
    AgentAssigned,
}

/// Actions to execute during a transition. These are the steps of the
/// per-message pipeline; their order within a transition is normative
/// (in particular, `RecordInbound` always precedes `InvokeAgent`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Assign the next sequence number and append the inbound message to
    /// the transcript sink before anything else touches it
    RecordInbound,
    /// Ask the pool for an AI agent and attach it to the session
    AssignAi,
    /// Invoke the currently assigned agent with full session context
    InvokeAgent,
    /// Assign the next sequence number and append the outbound reply
    RecordOutbound,
    /// Fan the recorded outbound reply out to the channel adapter
    DeliverOutbound,
    /// Deliver the configured waiting notice to the end user
    DeliverWaitNotice,
    /// Return the assigned agent's capacity to the pool
    ReleaseAgent,
    /// Ask the pool for a human agent; queues the session when none idle
    RequestHuman,
    /// Attach the human agent staged by a pool hand-off
    CompleteHandoff,
    /// Lazily open the session's ticket, or update it if one exists
    EnsureTicket,
    /// Append an incident record to the transcript (never delivered)
    RecordIncident,
}

/// Event templates for publishing to observers after a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTemplate {
    StateChanged,
    SessionClosed,
    SessionFailed,
}

/// Transition definition - what happens when an event occurs in a state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Conditions that must be true for this transition
    pub guards: Vec<Guard>,

    /// Actions to execute, in order
    pub actions: Vec<Action>,

    /// Next state (if changing)
    pub next_state: Option<ConversationState>,

    /// Events to publish after transition
    pub publish_events: Vec<EventTemplate>,
}

impl Transition {
    /// A defined no-op: the event is consumed and dropped. Used to make the
    /// table total over states the event is meaningless in.
    pub fn ignore() -> Self {
        Transition {
            guards: vec![],
            actions: vec![],
            next_state: None,
            publish_events: vec![],
        }
    }
}

/// Master state table containing all transitions
pub struct MasterStateTable {
    transitions: HashMap<StateKey, Transition>,
}

impl MasterStateTable {
    pub fn new() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        // Always normalize the event when inserting
        let normalized_key = StateKey {
            state: key.state,
            event: key.event.normalize(),
        };
        self.transitions.insert(normalized_key, transition);
    }

    pub fn get(&self, key: &StateKey) -> Option<&Transition> {
        let normalized_key = StateKey {
            state: key.state,
            event: key.event.normalize(),
        };
        self.transitions.get(&normalized_key)
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.get(key).is_some()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Check that every (state, event) pair has a defined transition,
    /// including explicit ignores. Session state transitions are total:
    /// there is no undefined pair.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for state in ConversationState::ALL {
            for event in EventType::exemplars() {
                let key = StateKey { state, event };
                if !self.has_transition(&key) {
                    errors.push(format!(
                        "No transition defined for {:?} in state {}",
                        key.event.type_name(),
                        state
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
