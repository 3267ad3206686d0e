//! The per-session worker: one task per live conversation key, draining a
//! FIFO command queue. This task is the serialization point where sequence
//! numbers are assigned, in arrival order, and the only place session state
//! is ever mutated.

use std::sync::Arc;

use tracing::{debug, info};

use super::SessionDeps;
use crate::adapters::InboundPayload;
use crate::registry::{Session, SessionCommand, SessionRegistry, SessionSeed};
use crate::state_machine::executor::process_event;
use crate::state_table::EventType;

pub(crate) async fn run(seed: SessionSeed, deps: Arc<SessionDeps>, registry: Arc<SessionRegistry>) {
    let SessionSeed {
        epoch,
        meta,
        mut commands,
        mut closed,
    } = seed;
    let mut session = Session::new(meta);

    loop {
        tokio::select! {
            biased;
            changed = closed.changed() => {
                if changed.is_err() {
                    // Registry entry and all handles gone
                    break;
                }
                let Some(reason) = *closed.borrow_and_update() else { continue };
                info!("Session {} closing ({})", session.key(), reason);
                process_event(
                    &mut session,
                    EventType::InboundClose { reason },
                    &deps,
                    &closed,
                )
                .await;
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(command, &mut session, &deps, &closed).await;
            }
        }

        if session.state.is_terminal() {
            break;
        }
    }

    // Exactly-once release of anything still held, then leave the registry.
    if let Some(handle) = session.assigned.take() {
        deps.pool.release(&handle);
    }
    if let Some(handle) = session.pending_handoff.take() {
        deps.pool.release(&handle);
    }
    deps.pool.forget_waiting(session.key());
    registry.remove(session.key(), epoch);
    debug!(
        "Session worker for {} exited in state {}",
        session.key(),
        session.state
    );
}

async fn handle_command(
    command: SessionCommand,
    session: &mut Session,
    deps: &Arc<SessionDeps>,
    closed: &tokio::sync::watch::Receiver<Option<crate::types::CloseReason>>,
) {
    match command {
        SessionCommand::Inbound(event) => {
            session.touch();
            let event = match event.payload {
                InboundPayload::Message { body } => {
                    if is_escalation_request(deps, &body) {
                        EventType::InboundEscalation { reason: body }
                    } else {
                        EventType::InboundMessage { body }
                    }
                }
                InboundPayload::Escalate { reason } => EventType::InboundEscalation { reason },
                InboundPayload::Close { reason } => EventType::InboundClose { reason },
            };
            process_event(session, event, deps, closed).await;
        }
        SessionCommand::HumanReady(handle) => {
            session.touch();
            let agent_id = handle.id.0.clone();
            session.pending_handoff = Some(handle);
            process_event(session, EventType::HumanReady { agent_id }, deps, closed).await;
            // The transition didn't want the offer (e.g. the session moved
            // on); give the reserved capacity back.
            if let Some(unclaimed) = session.pending_handoff.take() {
                deps.pool.release(&unclaimed);
            }
        }
        SessionCommand::ExpireIfIdleSince { cutoff } => {
            if session.last_activity_at <= cutoff {
                process_event(session, EventType::IdleExpired, deps, closed).await;
            } else {
                debug!(
                    "Idle expiry for {} skipped; activity at {}",
                    session.key(),
                    session.last_activity_at
                );
            }
        }
    }
}

/// Configurable trigger phrases count as an explicit escalation request
fn is_escalation_request(deps: &SessionDeps, body: &str) -> bool {
    let lowered = body.to_lowercase();
    deps.config
        .escalation_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
}
