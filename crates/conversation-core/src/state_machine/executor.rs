//! The transition executor: resolves each event against the master table
//! and runs the resulting actions. Internal follow-up events produced by
//! actions (agent outcomes, pool assignment results) are drained in the
//! same pass, which is how a session moves `Escalating -> ActiveHuman`
//! without a new inbound event ever arriving.

use std::collections::VecDeque;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::actions::execute_action;
use crate::error::Result;
use crate::orchestrator::{SessionDeps, SessionNotice};
use crate::registry::Session;
use crate::state_table::{EventTemplate, EventType, Guard, StateKey, MASTER_TABLE};
use crate::types::CloseReason;

/// What one call to `process_event` did to the session
#[derive(Debug, Clone)]
pub struct ProcessEventResult {
    pub events_handled: usize,
    pub final_state: crate::state_table::ConversationState,
}

/// Process one event and every internal follow-up it produces, in order.
/// Events with no defined transition never occur (the table is total), but
/// a lookup miss is still logged and dropped rather than crashing the
/// worker. A failed action aborts its transition with the session state
/// untouched.
pub(crate) async fn process_event(
    session: &mut Session,
    event: EventType,
    deps: &SessionDeps,
    closed: &watch::Receiver<Option<CloseReason>>,
) -> ProcessEventResult {
    let mut queue = VecDeque::new();
    queue.push_back(event);
    let mut events_handled = 0;

    while let Some(event) = queue.pop_front() {
        events_handled += 1;
        let key = StateKey {
            state: session.state,
            event: event.clone(),
        };
        let Some(transition) = MASTER_TABLE.get(&key) else {
            warn!(
                "No transition for {} in state {}; dropping event for {}",
                event.type_name(),
                session.state,
                session.key()
            );
            continue;
        };

        if !guards_met(&transition.guards, session) {
            debug!(
                "Guards not met for {} in state {}; dropping event for {}",
                event.type_name(),
                session.state,
                session.key()
            );
            continue;
        }

        if transition.actions.is_empty() && transition.next_state.is_none() {
            debug!(
                "Ignoring {} in state {} for {}",
                event.type_name(),
                session.state,
                session.key()
            );
            continue;
        }

        if let Err(e) = run_actions(transition.actions.as_slice(), &event, session, deps, &mut queue, closed).await {
            warn!(
                "Transition for {} in state {} aborted for {}: {}",
                event.type_name(),
                session.state,
                session.key(),
                e
            );
            continue;
        }

        if let Some(next) = transition.next_state {
            if next != session.state {
                let from = session.state;
                session.set_state(next);
                debug!("Session {} moved {} -> {}", session.key(), from, next);
                publish_templates(&transition.publish_events, &event, from, next, session, deps);
            }
        }
    }

    ProcessEventResult {
        events_handled,
        final_state: session.state,
    }
}

async fn run_actions(
    actions: &[crate::state_table::Action],
    event: &EventType,
    session: &mut Session,
    deps: &SessionDeps,
    queue: &mut VecDeque<EventType>,
    closed: &watch::Receiver<Option<CloseReason>>,
) -> Result<()> {
    for action in actions {
        execute_action(action, event, session, deps, queue, closed).await?;
    }
    Ok(())
}

fn guards_met(guards: &[Guard], session: &Session) -> bool {
    guards.iter().all(|guard| match guard {
        Guard::AgentAssigned => session.assigned.is_some(),
    })
}

fn publish_templates(
    templates: &[EventTemplate],
    event: &EventType,
    from: crate::state_table::ConversationState,
    to: crate::state_table::ConversationState,
    session: &Session,
    deps: &SessionDeps,
) {
    for template in templates {
        match template {
            EventTemplate::StateChanged => {
                deps.notify(SessionNotice::StateChanged {
                    key: session.key().clone(),
                    from,
                    to,
                });
            }
            EventTemplate::SessionClosed => {
                let reason = match event {
                    EventType::InboundClose { reason } => *reason,
                    EventType::IdleExpired => CloseReason::IdleTimeout,
                    _ => CloseReason::Operator,
                };
                deps.notify(SessionNotice::SessionClosed {
                    key: session.key().clone(),
                    reason,
                });
            }
            EventTemplate::SessionFailed => {
                deps.notify(SessionNotice::SessionFailed {
                    key: session.key().clone(),
                });
            }
        }
    }
}
