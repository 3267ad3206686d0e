//! Execution of the individual transition actions. Each action is one step
//! of the per-message pipeline; the executor runs them in table order and
//! aborts the remaining steps (and the state change) if one fails, so a
//! half-executed transition can never corrupt session state.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapters::OutboundDelivery;
use crate::agent::{AgentError, AgentKind, AgentOutcome, Assignment};
use crate::error::Result;
use crate::orchestrator::{SessionDeps, SessionNotice};
use crate::registry::Session;
use crate::state_table::{Action, EventType};
use crate::ticketing::TicketSync;
use crate::types::{CloseReason, Message, MessageDirection, MessageSender};

/// Execute one action from the state table
pub(crate) async fn execute_action(
    action: &Action,
    event: &EventType,
    session: &mut Session,
    deps: &SessionDeps,
    followups: &mut VecDeque<EventType>,
    closed: &watch::Receiver<Option<CloseReason>>,
) -> Result<()> {
    debug!("Executing action {:?} for {}", action, session.key());

    match action {
        Action::RecordInbound => {
            let body = match event {
                EventType::InboundMessage { body } => body.clone(),
                EventType::InboundEscalation { reason } => reason.clone(),
                _ => return Ok(()),
            };
            if body.is_empty() {
                return Ok(());
            }
            record_message(
                session,
                deps,
                MessageDirection::Inbound,
                MessageSender::EndUser,
                body,
            )
            .await?;
        }

        Action::AssignAi => {
            if session.assigned.is_some() {
                return Ok(());
            }
            match deps.pool.assign(session.key(), AgentKind::Ai) {
                Assignment::Assigned(handle) => {
                    info!("Assigned AI agent {} to {}", handle.id, session.key());
                    session.assigned = Some(handle);
                }
                Assignment::NoAgentAvailable => {
                    // No AI capacity at all: fall through to the human path
                    // instead of failing the conversation.
                    warn!(
                        "No AI capacity for {}; escalating to human path",
                        session.key()
                    );
                    followups.push_back(EventType::AgentEscalated {
                        reason: "no AI agent capacity".to_string(),
                    });
                }
            }
        }

        Action::InvokeAgent => {
            let Some(agent) = session.assigned.clone() else {
                debug!("No assigned agent to invoke for {}", session.key());
                return Ok(());
            };
            if closed.borrow().is_some() {
                debug!("Session {} closing; skipping agent invocation", session.key());
                return Ok(());
            }
            let context = session.context();
            let mut closed = closed.clone();
            // Invocation may be long-running; a close signal abandons it
            // best-effort and the (never observed) result is discarded.
            tokio::select! {
                biased;
                _ = closed.changed() => {
                    debug!(
                        "Close signalled during agent invocation for {}; discarding result",
                        session.key()
                    );
                }
                outcome = agent.connector.invoke(context) => match outcome {
                    Ok(AgentOutcome::Reply(body)) => {
                        followups.push_back(EventType::AgentReplied { body });
                    }
                    Ok(AgentOutcome::Escalate { reason }) => {
                        info!("Agent {} escalated {}: {}", agent.id, session.key(), reason);
                        followups.push_back(EventType::AgentEscalated { reason });
                    }
                    Ok(AgentOutcome::NoReply) => {
                        debug!("Agent {} had nothing to send for {}", agent.id, session.key());
                    }
                    Err(AgentError::Unrecoverable(detail)) => {
                        warn!("Agent {} failed for {}: {}", agent.id, session.key(), detail);
                        followups.push_back(EventType::AgentFailed { detail });
                    }
                },
            }
        }

        Action::RecordOutbound => {
            let EventType::AgentReplied { body } = event else {
                return Ok(());
            };
            let sender = match session.assigned.as_ref().map(|a| a.kind) {
                Some(AgentKind::Human) => MessageSender::HumanAgent,
                _ => MessageSender::AiAgent,
            };
            let sequence = record_message(
                session,
                deps,
                MessageDirection::Outbound,
                sender,
                body.clone(),
            )
            .await?;
            session.last_outbound = Some((sequence, body.clone()));
        }

        Action::DeliverOutbound => {
            let Some((sequence, body)) = session.last_outbound.take() else {
                return Ok(());
            };
            deps.router
                .deliver(OutboundDelivery {
                    key: session.key().clone(),
                    sequence,
                    body,
                })
                .await;
        }

        Action::DeliverWaitNotice => {
            let body = deps.config.waiting_notice.clone();
            if body.is_empty() {
                return Ok(());
            }
            let sequence = record_message(
                session,
                deps,
                MessageDirection::Outbound,
                MessageSender::AiAgent,
                body.clone(),
            )
            .await?;
            deps.router
                .deliver(OutboundDelivery {
                    key: session.key().clone(),
                    sequence,
                    body,
                })
                .await;
        }

        Action::ReleaseAgent => {
            if let Some(handle) = session.assigned.take() {
                info!("Released agent {} from {}", handle.id, session.key());
                deps.pool.release(&handle);
            }
        }

        Action::RequestHuman => {
            match deps.pool.assign(session.key(), AgentKind::Human) {
                Assignment::Assigned(handle) => {
                    let agent_id = handle.id.0.clone();
                    session.pending_handoff = Some(handle);
                    followups.push_back(EventType::HumanReady { agent_id });
                }
                Assignment::NoAgentAvailable => {
                    followups.push_back(EventType::NoHumanCapacity);
                }
            }
        }

        Action::CompleteHandoff => {
            match session.pending_handoff.take() {
                Some(handle) => {
                    // The previous agent should already be released by the
                    // escalation transition; guard the exactly-once rule
                    // anyway.
                    if let Some(old) = session.assigned.take() {
                        deps.pool.release(&old);
                    }
                    info!("Human agent {} took over {}", handle.id, session.key());
                    session.assigned = Some(handle);
                }
                None => warn!("Hand-off completion with no staged agent for {}", session.key()),
            }
        }

        Action::EnsureTicket => {
            let reason = match event {
                EventType::InboundEscalation { reason } => reason.clone(),
                EventType::AgentEscalated { reason } => reason.clone(),
                EventType::AgentFailed { detail } => detail.clone(),
                _ => "escalation requested".to_string(),
            };
            let snapshot = session.snapshot(reason);
            let key = session.key().clone();
            match deps.ticketing.ensure_ticket(&mut session.ticket, snapshot).await {
                TicketSync::Opened(ticket_id) => {
                    deps.notify(SessionNotice::TicketOpened { key, ticket_id });
                }
                TicketSync::Updated => {
                    deps.notify(SessionNotice::TicketUpdated { key });
                }
                TicketSync::PendingSync => {
                    deps.notify(SessionNotice::TicketPendingSync { key });
                }
            }
        }

        Action::RecordIncident => {
            let EventType::AgentFailed { detail } = event else {
                return Ok(());
            };
            let sender = match session.assigned.as_ref().map(|a| a.kind) {
                Some(AgentKind::Human) => MessageSender::HumanAgent,
                _ => MessageSender::AiAgent,
            };
            // Goes to the transcript for operators; never delivered to the
            // end user.
            record_message(
                session,
                deps,
                MessageDirection::Outbound,
                sender,
                format!("incident: unrecoverable agent error: {}", detail),
            )
            .await?;
            deps.notify(SessionNotice::Incident {
                key: session.key().clone(),
                detail: detail.clone(),
            });
        }
    }

    Ok(())
}

/// Assign the next sequence number and append to the transcript sink. The
/// sequence is only consumed if the append succeeds, keeping the numbering
/// gap-free even when the sink rejects a record.
async fn record_message(
    session: &mut Session,
    deps: &SessionDeps,
    direction: MessageDirection,
    sender: MessageSender,
    body: String,
) -> Result<u64> {
    let sequence = session.next_sequence();
    let message = Message {
        key: session.key().clone(),
        sequence,
        direction,
        sender,
        body,
        timestamp: Utc::now(),
    };
    if let Err(e) = deps.transcript.append(&message).await {
        session.rollback_sequence();
        return Err(e);
    }
    session.history.push(message);
    deps.notify(SessionNotice::MessageAccepted {
        key: session.key().clone(),
        sequence,
        direction,
    });
    Ok(sequence)
}
