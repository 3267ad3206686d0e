//! # Ticketing Gateway
//!
//! Narrow create/update contract toward the external ITSM/ITOM system, plus
//! the retry discipline around it. Gateway outages degrade the ticket to
//! `PendingSync` after a bounded, capped-exponential retry run; they never
//! block or fail the conversation itself.

use crate::config::TicketingConfig;
use crate::state_table::ConversationState;
use crate::types::{ConversationKey, TicketRef, TicketStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The external system could not be reached or answered with an outage
#[derive(Debug, Clone, Error)]
#[error("ticketing backend unavailable")]
pub struct TicketingUnavailable;

/// What the gateway gets to see when a ticket is opened: enough context to
/// file a meaningful incident without coupling it to session internals.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: ConversationKey,
    pub state: ConversationState,
    /// Why a ticket is needed (escalation reason or incident detail)
    pub reason: String,
    /// Derived from the last end-user message
    pub short_description: String,
}

/// Incremental update to an existing ticket
#[derive(Debug, Clone)]
pub struct TicketDelta {
    pub note: String,
}

/// Contract toward the external ITSM system
#[async_trait]
pub trait TicketingGateway: Send + Sync {
    async fn open_ticket(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<TicketRef, TicketingUnavailable>;

    async fn update_ticket(
        &self,
        ticket: &TicketRef,
        delta: &TicketDelta,
    ) -> Result<(), TicketingUnavailable>;
}

/// How an `ensure_ticket` call resolved
#[derive(Debug, Clone, PartialEq)]
pub enum TicketSync {
    Opened(String),
    Updated,
    PendingSync,
}

/// Gateway wrapper owning the retry/backoff policy. One client is shared by
/// all session workers.
#[derive(Clone)]
pub struct TicketingClient {
    gateway: Arc<dyn TicketingGateway>,
    config: TicketingConfig,
}

impl TicketingClient {
    pub fn new(gateway: Arc<dyn TicketingGateway>, config: TicketingConfig) -> Self {
        Self { gateway, config }
    }

    /// Open the session's ticket if none exists, otherwise update it.
    /// Idempotent by session key: repeat escalations in one session never
    /// produce a second ticket. On exhausted retries the ticket is marked
    /// `PendingSync` and the call still succeeds.
    pub async fn ensure_ticket(
        &self,
        ticket: &mut Option<TicketRef>,
        snapshot: SessionSnapshot,
    ) -> TicketSync {
        match ticket {
            Some(existing) if existing.external_id.is_some() => {
                let delta = TicketDelta {
                    note: snapshot.reason.clone(),
                };
                match self.update_with_retry(existing, &delta).await {
                    Ok(()) => {
                        existing.status = TicketStatus::Open;
                        debug!("Updated ticket for {}", snapshot.key);
                        TicketSync::Updated
                    }
                    Err(TicketingUnavailable) => {
                        existing.status = TicketStatus::PendingSync;
                        warn!("Ticket update for {} deferred (pending sync)", snapshot.key);
                        TicketSync::PendingSync
                    }
                }
            }
            _ => {
                // No ticket yet, or an earlier open never reached the
                // external system: (re)try the open.
                match self.open_with_retry(&snapshot).await {
                    Ok(opened) => {
                        let id = opened.external_id.clone().unwrap_or_default();
                        info!("Opened ticket {} for {}", id, snapshot.key);
                        *ticket = Some(opened);
                        TicketSync::Opened(id)
                    }
                    Err(TicketingUnavailable) => {
                        warn!("Ticket open for {} deferred (pending sync)", snapshot.key);
                        *ticket = Some(TicketRef {
                            key: snapshot.key.clone(),
                            external_id: None,
                            status: TicketStatus::PendingSync,
                        });
                        TicketSync::PendingSync
                    }
                }
            }
        }
    }

    async fn open_with_retry(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<TicketRef, TicketingUnavailable> {
        self.with_retry(|| self.gateway.open_ticket(snapshot)).await
    }

    async fn update_with_retry(
        &self,
        ticket: &TicketRef,
        delta: &TicketDelta,
    ) -> Result<(), TicketingUnavailable> {
        self.with_retry(|| self.gateway.update_ticket(ticket, delta))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T, TicketingUnavailable>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TicketingUnavailable>>,
    {
        let mut delay = self.config.initial_backoff;
        for attempt in 1..=self.config.max_attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(TicketingUnavailable) => {
                    if attempt == self.config.max_attempts {
                        break;
                    }
                    // Jittered so parallel sessions don't hammer in step
                    let jittered = delay.mul_f64(0.8 + rand::random::<f64>() * 0.4);
                    debug!(
                        "Ticketing attempt {}/{} failed, retrying in {:?}",
                        attempt, self.config.max_attempts, jittered
                    );
                    tokio::time::sleep(jittered).await;
                    delay = (delay * 2).min(self.config.max_backoff);
                }
            }
        }
        Err(TicketingUnavailable)
    }
}
