//! # OpsDesk Conversation Core
//!
//! Conversation and session orchestration for the OpsDesk AI operations
//! platform. This crate binds a human identity, an organization, and a
//! communication channel into one continuously-addressable session, routes
//! normalized events from heterogeneous channel adapters into that session,
//! manages hand-off between AI and human agents, and guarantees ordered,
//! write-ahead-recorded delivery of messages to every listener (channel
//! reply, transcript sink, observer push, ticketing).
//!
//! ## Architecture
//!
//! - [`adapters`]: normalized inbound/outbound contracts toward channel
//!   transports (web chat, voice, SMS, WhatsApp, email)
//! - [`registry`]: the key -> live-session map; linearizable creation,
//!   idempotent close, background idle expiry
//! - [`agent`]: the single agent invocation seam plus the capacity pool
//!   with waiting-session hand-off
//! - [`state_table`] / [`state_machine`]: a total, declarative transition
//!   table and the executor that drives sessions through it
//! - [`transcript`]: append-only write-ahead message store seam
//! - [`ticketing`]: ITSM create/update contract with capped-backoff retry
//! - [`orchestrator`]: the engine wiring it all together
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use opsdesk_conversation_core::prelude::*;
//!
//! # use async_trait::async_trait;
//! # struct MyAi;
//! # #[async_trait]
//! # impl AgentConnector for MyAi {
//! #     async fn invoke(&self, _c: SessionContext) -> Result<AgentOutcome, AgentError> {
//! #         Ok(AgentOutcome::Reply("hi".into()))
//! #     }
//! # }
//! # struct MyItsm;
//! # #[async_trait]
//! # impl TicketingGateway for MyItsm {
//! #     async fn open_ticket(&self, s: &SessionSnapshot) -> Result<TicketRef, TicketingUnavailable> {
//! #         Ok(TicketRef { key: s.key.clone(), external_id: Some("INC-1".into()), status: TicketStatus::Open })
//! #     }
//! #     async fn update_ticket(&self, _t: &TicketRef, _d: &TicketDelta) -> Result<(), TicketingUnavailable> {
//! #         Ok(())
//! #     }
//! # }
//! # async fn example() -> opsdesk_conversation_core::Result<()> {
//! let engine = ConversationEngine::builder()
//!     .with_ticketing_gateway(Arc::new(MyItsm))
//!     .with_ai_connector(Arc::new(MyAi), 32)
//!     .build()?;
//! engine.start();
//!
//! let key = ConversationKey::new(
//!     OrganizationId::new(),
//!     EndUserId("alice@example.com".into()),
//!     Channel::WebChat,
//! );
//! engine.handle_inbound(InboundEvent::message(key, "my laptop won't boot")).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod state_machine;
pub mod state_table;
pub mod ticketing;
pub mod transcript;
pub mod types;

pub use error::{OrchestratorError, Result};

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::adapters::{
        ChannelAdapter, ChannelRouter, DeliveryFailed, InboundEvent, InboundPayload,
        OutboundDelivery,
    };
    pub use crate::agent::{
        AgentConnector, AgentError, AgentHandle, AgentId, AgentKind, AgentOutcome, AgentPool,
        Assignment, SessionContext,
    };
    pub use crate::config::{EngineConfig, TicketingConfig};
    pub use crate::error::{OrchestratorError, Result};
    pub use crate::orchestrator::{ConversationEngine, ConversationEngineBuilder, SessionNotice};
    pub use crate::registry::{RegistryStats, SessionRegistry};
    pub use crate::state_table::ConversationState;
    pub use crate::ticketing::{
        SessionSnapshot, TicketDelta, TicketingGateway, TicketingUnavailable,
    };
    pub use crate::transcript::{InMemoryTranscript, TranscriptSink};
    pub use crate::types::{
        Channel, CloseReason, ConversationKey, EndUserId, Message, MessageDirection,
        MessageSender, OrganizationId, TicketRef, TicketStatus,
    };
}
