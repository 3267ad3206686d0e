//! # Channel Adapters
//!
//! The orchestrator's boundary toward channel-native transports. Adapters
//! translate channel events (SMTP, Twilio signaling, WhatsApp Business API
//! framing, web-socket chat) into normalized [`InboundEvent`]s and carry
//! normalized [`OutboundDelivery`]s back out. Protocol mechanics, transport
//! retries, and transport-level deduplication all live on the adapter side;
//! the orchestrator validates events against session state as the backstop.
//!
//! Outbound delivery failures are the adapter's problem to retry. The
//! router logs them and moves on.

use crate::types::{Channel, CloseReason, ConversationKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Normalized payload of an inbound channel event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundPayload {
    /// An end-user message
    Message { body: String },
    /// An explicit request for a human, already recognized by the adapter
    /// (e.g. an IVR menu choice on the voice channel)
    Escalate { reason: String },
    /// The end user or channel ended the conversation
    Close { reason: CloseReason },
}

/// One normalized event from a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub key: ConversationKey,
    pub payload: InboundPayload,
    /// Channel-native payload as the adapter received it, kept for audit
    /// and debugging; the orchestrator never interprets it
    pub raw_payload: Option<serde_json::Value>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn message(key: ConversationKey, body: impl Into<String>) -> Self {
        Self {
            key,
            payload: InboundPayload::Message { body: body.into() },
            raw_payload: None,
            received_at: Utc::now(),
        }
    }

    pub fn escalate(key: ConversationKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            payload: InboundPayload::Escalate {
                reason: reason.into(),
            },
            raw_payload: None,
            received_at: Utc::now(),
        }
    }

    pub fn close(key: ConversationKey, reason: CloseReason) -> Self {
        Self {
            key,
            payload: InboundPayload::Close { reason },
            raw_payload: None,
            received_at: Utc::now(),
        }
    }

    /// Attach the channel-native payload for audit
    pub fn with_raw_payload(mut self, raw: serde_json::Value) -> Self {
        self.raw_payload = Some(raw);
        self
    }
}

/// One outbound message bound for a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundDelivery {
    pub key: ConversationKey,
    pub sequence: u64,
    pub body: String,
}

/// Reported by an adapter when a delivery could not be handed to the
/// channel
#[derive(Debug, Clone, Error)]
#[error("delivery failed on {channel}: {detail}")]
pub struct DeliveryFailed {
    pub channel: Channel,
    pub detail: String,
}

/// Outbound side of a channel adapter
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    async fn deliver(&self, delivery: OutboundDelivery) -> Result<(), DeliveryFailed>;
}

/// Routes outbound deliveries to the adapter registered for the target
/// channel
pub struct ChannelRouter {
    adapters: DashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    /// Register (or replace) the adapter for its channel
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let channel = adapter.channel();
        self.adapters.insert(channel, adapter);
        debug!("Registered channel adapter for {}", channel);
    }

    /// Hand one delivery to its channel adapter. Failures are logged, not
    /// retried; retry policy lives on the adapter side.
    pub async fn deliver(&self, delivery: OutboundDelivery) {
        let channel = delivery.key.channel;
        let adapter = self.adapters.get(&channel).map(|a| a.clone());
        match adapter {
            Some(adapter) => {
                if let Err(e) = adapter.deliver(delivery).await {
                    warn!("Outbound delivery failed: {}", e);
                }
            }
            None => {
                warn!(
                    "No adapter registered for {}; dropping outbound seq {} for {}",
                    channel, delivery.sequence, delivery.key
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndUserId, OrganizationId};
    use parking_lot::Mutex;

    struct RecordingAdapter {
        channel: Channel,
        sent: Mutex<Vec<OutboundDelivery>>,
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

    #[tokio::test]
    async fn routes_by_conversation_channel() {
        let router = ChannelRouter::new();
        let sms = Arc::new(RecordingAdapter {
            channel: Channel::Sms,
            sent: Mutex::new(Vec::new()),
        });
        router.register(sms.clone());

        let key = ConversationKey::new(
            OrganizationId::from_uuid(uuid::Uuid::nil()),
            EndUserId("+15550100".to_string()),
            Channel::Sms,
        );
        router
            .deliver(OutboundDelivery {
                key,
                sequence: 2,
                body: "hello".to_string(),
            })
            .await;

        let sent = sms.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sequence, 2);
    }
}
