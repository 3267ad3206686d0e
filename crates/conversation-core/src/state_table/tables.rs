//! The conversation transition definitions.
//!
//! Every (state, event) pair resolves to exactly one transition; pairs that
//! are meaningless in a state get an explicit ignore. That is what lets the
//! executor drop stale agent results after an escalation or close instead of
//! applying them to a session that has moved on.

use super::builder::StateTableBuilder;
use super::types::{
    Action, ConversationState, EventTemplate, EventType, Guard, Transition,
};
use crate::types::CloseReason;

fn msg() -> EventType {
    EventType::InboundMessage {
        body: String::new(),
    }
}

fn escalation() -> EventType {
    EventType::InboundEscalation {
        reason: String::new(),
    }
}

fn close() -> EventType {
    EventType::InboundClose {
        reason: CloseReason::default(),
    }
}

fn replied() -> EventType {
    EventType::AgentReplied {
        body: String::new(),
    }
}

fn agent_escalated() -> EventType {
    EventType::AgentEscalated {
        reason: String::new(),
    }
}

fn agent_failed() -> EventType {
    EventType::AgentFailed {
        detail: String::new(),
    }
}

fn human_ready() -> EventType {
    EventType::HumanReady {
        agent_id: String::new(),
    }
}

/// Transition to Closed, releasing any assigned agent
fn close_transition() -> Transition {
    Transition {
        guards: vec![],
        actions: vec![Action::ReleaseAgent],
        next_state: Some(ConversationState::Closed),
        publish_events: vec![EventTemplate::StateChanged, EventTemplate::SessionClosed],
    }
}

/// Transition to Failed: surface the incident to transcript and ticketing,
/// then release. Failed sessions do not auto-retry.
fn failure_transition() -> Transition {
    Transition {
        guards: vec![],
        actions: vec![
            Action::RecordIncident,
            Action::EnsureTicket,
            Action::ReleaseAgent,
        ],
        next_state: Some(ConversationState::Failed),
        publish_events: vec![EventTemplate::StateChanged, EventTemplate::SessionFailed],
    }
}

/// Hand the session from the AI to the escalation path: release the AI
/// agent, make sure a ticket exists, then ask for a human.
fn escalate_transition() -> Transition {
    Transition {
        guards: vec![],
        actions: vec![
            Action::RecordInbound,
            Action::ReleaseAgent,
            Action::EnsureTicket,
            Action::RequestHuman,
        ],
        next_state: Some(ConversationState::Escalating),
        publish_events: vec![EventTemplate::StateChanged],
    }
}

/// Build the complete conversation state table
pub fn build_transitions(builder: &mut StateTableBuilder) {
    use ConversationState::*;

    // --- New ------------------------------------------------------------
    // First inbound message: record it, attach an AI agent, invoke.
    builder.add_transition(
        New,
        msg(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::AssignAi, Action::InvokeAgent],
            next_state: Some(ActiveAi),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );
    // An explicit escalation before any AI turn goes straight to the
    // escalation path.
    builder.add_transition(New, escalation(), escalate_transition());
    builder.add_transition(New, close(), close_transition());
    builder.add_transition(New, EventType::IdleExpired, close_transition());

    // --- ActiveAi -------------------------------------------------------
    builder.add_transition(
        ActiveAi,
        msg(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::InvokeAgent],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        ActiveAi,
        replied(),
        Transition {
            guards: vec![Guard::AgentAssigned],
            actions: vec![Action::RecordOutbound, Action::DeliverOutbound],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(ActiveAi, escalation(), escalate_transition());
    builder.add_transition(
        ActiveAi,
        agent_escalated(),
        Transition {
            guards: vec![],
            actions: vec![
                Action::ReleaseAgent,
                Action::EnsureTicket,
                Action::RequestHuman,
            ],
            next_state: Some(Escalating),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );
    builder.add_transition(ActiveAi, agent_failed(), failure_transition());
    builder.add_transition(ActiveAi, close(), close_transition());
    builder.add_transition(ActiveAi, EventType::IdleExpired, close_transition());

    // --- Escalating -----------------------------------------------------
    // Messages that land while the hand-off is in flight are recorded but
    // there is no agent to invoke yet.
    builder.add_transition(
        Escalating,
        msg(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound],
            next_state: None,
            publish_events: vec![],
        },
    );
    // A repeat escalation signal updates the existing ticket.
    builder.add_transition(
        Escalating,
        escalation(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::EnsureTicket],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        Escalating,
        human_ready(),
        Transition {
            guards: vec![],
            actions: vec![Action::CompleteHandoff],
            next_state: Some(ActiveHuman),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );
    builder.add_transition(
        Escalating,
        EventType::NoHumanCapacity,
        Transition {
            guards: vec![],
            actions: vec![Action::DeliverWaitNotice],
            next_state: Some(WaitingForHuman),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );
    builder.add_transition(Escalating, agent_failed(), failure_transition());
    builder.add_transition(Escalating, close(), close_transition());
    builder.add_transition(Escalating, EventType::IdleExpired, close_transition());

    // --- WaitingForHuman ------------------------------------------------
    builder.add_transition(
        WaitingForHuman,
        msg(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        WaitingForHuman,
        escalation(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::EnsureTicket],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        WaitingForHuman,
        human_ready(),
        Transition {
            guards: vec![],
            actions: vec![Action::CompleteHandoff],
            next_state: Some(ActiveHuman),
            publish_events: vec![EventTemplate::StateChanged],
        },
    );
    builder.add_transition(WaitingForHuman, agent_failed(), failure_transition());
    builder.add_transition(WaitingForHuman, close(), close_transition());
    builder.add_transition(WaitingForHuman, EventType::IdleExpired, close_transition());

    // --- ActiveHuman ----------------------------------------------------
    builder.add_transition(
        ActiveHuman,
        msg(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::InvokeAgent],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        ActiveHuman,
        replied(),
        Transition {
            guards: vec![Guard::AgentAssigned],
            actions: vec![Action::RecordOutbound, Action::DeliverOutbound],
            next_state: None,
            publish_events: vec![],
        },
    );
    // Already with a human; a further escalation just annotates the ticket.
    builder.add_transition(
        ActiveHuman,
        escalation(),
        Transition {
            guards: vec![],
            actions: vec![Action::RecordInbound, Action::EnsureTicket],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(
        ActiveHuman,
        agent_escalated(),
        Transition {
            guards: vec![],
            actions: vec![Action::EnsureTicket],
            next_state: None,
            publish_events: vec![],
        },
    );
    builder.add_transition(ActiveHuman, agent_failed(), failure_transition());
    builder.add_transition(ActiveHuman, close(), close_transition());
    builder.add_transition(ActiveHuman, EventType::IdleExpired, close_transition());

    // --- Defined ignores ------------------------------------------------
    // Stale agent results after a hand-off started.
    for state in [New, Escalating, WaitingForHuman] {
        builder.add_ignore(state, replied());
    }
    builder.add_ignore(New, agent_escalated());
    builder.add_ignore(New, agent_failed());
    builder.add_ignore(Escalating, agent_escalated());
    builder.add_ignore(WaitingForHuman, agent_escalated());

    // A hand-off offer in a state that no longer wants one; the worker
    // returns the staged agent to the pool.
    for state in [New, ActiveAi, ActiveHuman] {
        builder.add_ignore(state, human_ready());
    }
    for state in [New, ActiveAi, WaitingForHuman, ActiveHuman] {
        builder.add_ignore(state, EventType::NoHumanCapacity);
    }

    // Terminal states consume everything.
    for state in [Closed, Failed] {
        for event in EventType::exemplars() {
            builder.add_ignore(state, event);
        }
    }
}
