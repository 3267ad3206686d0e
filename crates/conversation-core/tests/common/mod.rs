//! Shared fixtures for the integration tests: scripted agent connectors,
//! counting ticketing gateways, and a recording channel adapter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use opsdesk_conversation_core::prelude::*;

pub fn key(user: &str) -> ConversationKey {
    ConversationKey::new(
        OrganizationId::from_uuid(uuid::Uuid::nil()),
        EndUserId(user.to_string()),
        Channel::WebChat,
    )
}

/// Engine config tuned for tests: tiny backoffs, short queues
pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_ticketing(TicketingConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    })
}

/// Replies to the latest end-user message with an echo
pub struct EchoAi;

#[async_trait]
impl AgentConnector for EchoAi {
    async fn invoke(&self, context: SessionContext) -> Result<AgentOutcome, AgentError> {
        let last = context
            .history
            .iter()
            .rev()
            .find(|m| m.direction == MessageDirection::Inbound)
            .map(|m| m.body.clone())
            .unwrap_or_default();
        Ok(AgentOutcome::Reply(format!("echo: {}", last)))
    }
}

/// Always reports it cannot resolve the conversation
pub struct EscalatingAi;

#[async_trait]
impl AgentConnector for EscalatingAi {
    async fn invoke(&self, _context: SessionContext) -> Result<AgentOutcome, AgentError> {
        Ok(AgentOutcome::Escalate {
            reason: "cannot resolve".to_string(),
        })
    }
}

/// Takes a long time before replying; used to test close-cancellation
pub struct SlowAi(pub Duration);

#[async_trait]
impl AgentConnector for SlowAi {
    async fn invoke(&self, _context: SessionContext) -> Result<AgentOutcome, AgentError> {
        tokio::time::sleep(self.0).await;
        Ok(AgentOutcome::Reply("late answer".to_string()))
    }
}

/// Fails every invocation unrecoverably
pub struct BrokenAi;

#[async_trait]
impl AgentConnector for BrokenAi {
    async fn invoke(&self, _context: SessionContext) -> Result<AgentOutcome, AgentError> {
        Err(AgentError::Unrecoverable("backend exploded".to_string()))
    }
}

/// Stands in for a human agent console
pub struct HumanConsole;

#[async_trait]
impl AgentConnector for HumanConsole {
    async fn invoke(&self, _context: SessionContext) -> Result<AgentOutcome, AgentError> {
        Ok(AgentOutcome::Reply("a human here, reading your history now".to_string()))
    }
}

/// Healthy gateway that counts opens and updates
pub struct CountingGateway {
    pub opens: AtomicU32,
    pub updates: AtomicU32,
}

impl CountingGateway {
    pub fn new() -> Self {
        Self {
            opens: AtomicU32::new(0),
            updates: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TicketingGateway for CountingGateway {
    async fn open_ticket(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<TicketRef, TicketingUnavailable> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TicketRef {
            key: snapshot.key.clone(),
            external_id: Some(format!("INC-{:04}", n)),
            status: TicketStatus::Open,
        })
    }

    async fn update_ticket(
        &self,
        _ticket: &TicketRef,
        _delta: &TicketDelta,
    ) -> Result<(), TicketingUnavailable> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway that is down; counts the attempts it rejected
pub struct DownGateway {
    pub attempts: AtomicU32,
}

impl DownGateway {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TicketingGateway for DownGateway {
    async fn open_ticket(
        &self,
        _snapshot: &SessionSnapshot,
    ) -> Result<TicketRef, TicketingUnavailable> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TicketingUnavailable)
    }

    async fn update_ticket(
        &self,
        _ticket: &TicketRef,
        _delta: &TicketDelta,
    ) -> Result<(), TicketingUnavailable> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TicketingUnavailable)
    }
}

/// Adapter that records everything delivered to its channel
pub struct RecordingAdapter {
    channel: Channel,
    pub sent: Mutex<Vec<OutboundDelivery>>,
}

impl RecordingAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().iter().map(|d| d.body.clone()).collect()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, delivery: OutboundDelivery) -> Result<(), DeliveryFailed> {
        self.sent.lock().push(delivery);
        Ok(())
    }
}

/// Wait (bounded) for a notice matching the predicate
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionNotice>, pred: F) -> SessionNotice
where
    F: Fn(&SessionNotice) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(notice) if pred(&notice) => return notice,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("Notice stream closed while waiting")
                }
            }
        }
    })
    .await
    .expect("Timed out waiting for a matching notice")
}
