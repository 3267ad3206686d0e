//! # Conversation Engine
//!
//! Owns the registry, pool, sinks, and background tasks, and is the single
//! entry point channel adapters push normalized events into. Built through
//! [`ConversationEngineBuilder`]; call [`ConversationEngine::start`] to run
//! the idle sweep and the pool hand-off loop.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{session_task, SessionDeps, SessionNotice};
use crate::adapters::{ChannelAdapter, ChannelRouter, InboundEvent, InboundPayload};
use crate::agent::{AgentConnector, AgentId, AgentPool, PoolNotice, PoolStats};
use crate::config::EngineConfig;
use crate::error::{OrchestratorError, Result};
use crate::registry::{RegistryStats, SessionCommand, SessionRegistry};
use crate::state_table::ConversationState;
use crate::ticketing::{TicketingClient, TicketingGateway};
use crate::transcript::{InMemoryTranscript, TranscriptSink};
use crate::types::{CloseReason, ConversationKey};

/// Builder for [`ConversationEngine`]
pub struct ConversationEngineBuilder {
    config: EngineConfig,
    transcript: Option<Arc<dyn TranscriptSink>>,
    ticketing: Option<Arc<dyn TicketingGateway>>,
    ai_connectors: Vec<(Arc<dyn AgentConnector>, usize)>,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl ConversationEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            transcript: None,
            ticketing: None,
            ai_connectors: Vec::new(),
            adapters: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a transcript sink; defaults to the in-memory store
    pub fn with_transcript(mut self, transcript: Arc<dyn TranscriptSink>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Install the ITSM gateway. Required.
    pub fn with_ticketing_gateway(mut self, gateway: Arc<dyn TicketingGateway>) -> Self {
        self.ticketing = Some(gateway);
        self
    }

    /// Register an AI connector with a concurrent-session capacity
    pub fn with_ai_connector(mut self, connector: Arc<dyn AgentConnector>, capacity: usize) -> Self {
        self.ai_connectors.push((connector, capacity));
        self
    }

    /// Register a channel adapter for outbound delivery
    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Result<ConversationEngine> {
        let gateway = self.ticketing.ok_or_else(|| {
            OrchestratorError::Config("a ticketing gateway is required".to_string())
        })?;
        let transcript = self
            .transcript
            .unwrap_or_else(|| Arc::new(InMemoryTranscript::new()));

        let (pool, pool_notices) = AgentPool::new();
        for (connector, capacity) in self.ai_connectors {
            pool.register_ai(connector, capacity);
        }

        let router = Arc::new(ChannelRouter::new());
        for adapter in self.adapters {
            router.register(adapter);
        }

        let (notices, _) = broadcast::channel(256);
        let ticketing = TicketingClient::new(gateway, self.config.ticketing.clone());
        let registry = Arc::new(SessionRegistry::new(self.config.session_queue_depth));

        let deps = Arc::new(SessionDeps {
            config: self.config.clone(),
            pool: pool.clone(),
            transcript,
            ticketing,
            router,
            notices,
        });

        Ok(ConversationEngine {
            config: self.config,
            deps,
            registry,
            pool,
            pool_notices: Mutex::new(Some(pool_notices)),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// The orchestration core: consumes normalized channel events, advances
/// session state machines, invokes agents, and fans results out to the
/// transcript sink, channel adapters, observers, and the ticketing gateway.
pub struct ConversationEngine {
    config: EngineConfig,
    deps: Arc<SessionDeps>,
    registry: Arc<SessionRegistry>,
    pool: Arc<AgentPool>,
    pool_notices: Mutex<Option<mpsc::UnboundedReceiver<PoolNotice>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConversationEngine {
    pub fn builder() -> ConversationEngineBuilder {
        ConversationEngineBuilder::new()
    }

    /// Start the background tasks: the idle sweep and the pool hand-off
    /// loop. Sessions work without them, but idle expiry and
    /// waiting-for-human hand-offs need them running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();

        {
            let registry = self.registry.clone();
            let idle_timeout = self.config.idle_timeout;
            let sweep_interval = self.config.sweep_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    registry.expire_idle(idle_timeout);
                }
            }));
        }

        if let Some(mut notices) = self.pool_notices.lock().take() {
            let registry = self.registry.clone();
            let pool = self.pool.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(PoolNotice { key, agent }) = notices.recv().await {
                    match registry.get(&key) {
                        Some(handle) => {
                            if let Err(_unsent) =
                                handle.send(SessionCommand::HumanReady(agent.clone())).await
                            {
                                debug!("Session {} gone before hand-off; releasing {}", key, agent.id);
                                pool.release(&agent);
                            }
                        }
                        None => {
                            debug!("Waiting session {} vanished; releasing {}", key, agent.id);
                            pool.release(&agent);
                        }
                    }
                }
            }));
        }

        info!("Conversation engine started");
    }

    /// Feed one normalized channel event into the orchestrator.
    ///
    /// Close events never create a session: closing an unknown key is a
    /// no-op. Anything else resolves (or creates) the session for the key
    /// and queues the event into its FIFO, waiting when the queue is full.
    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<()> {
        if let InboundPayload::Close { reason } = &event.payload {
            self.registry.close(&event.key, *reason);
            return Ok(());
        }

        let key = event.key.clone();
        let mut event = event;
        for attempt in 0..2 {
            let handle = self.registry.get_or_create(&event.key, |seed| {
                let deps = self.deps.clone();
                let registry = self.registry.clone();
                tokio::spawn(session_task::run(seed, deps, registry));
            });

            match handle.send(SessionCommand::Inbound(event)).await {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    // The worker exited between lookup and send (terminal
                    // race); evict the dead entry and create a fresh
                    // session for the event.
                    let SessionCommand::Inbound(returned) = returned else {
                        break;
                    };
                    debug!(
                        "Session {} exited mid-dispatch (attempt {}); recreating",
                        returned.key, attempt
                    );
                    self.registry.remove(&returned.key, handle.epoch);
                    event = returned;
                }
            }
        }

        warn!("Could not dispatch inbound event for {}", key);
        Err(OrchestratorError::SessionClosed(key))
    }

    /// Close the session for `key`. Idempotent; unknown keys are a no-op.
    pub fn close_session(&self, key: &ConversationKey, reason: CloseReason) {
        self.registry.close(key, reason);
    }

    /// Run one idle sweep immediately (the background task does this on
    /// its own once `start` has been called)
    pub fn expire_idle_once(&self) {
        self.registry.expire_idle(self.config.idle_timeout);
    }

    /// Subscribe to session notices (UI push, monitoring)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.deps.notices.subscribe()
    }

    /// Register a human agent with the pool
    pub fn register_human(&self, connector: Arc<dyn AgentConnector>) -> AgentId {
        self.pool.register_human(connector)
    }

    /// Update a human agent's presence
    pub fn set_human_presence(&self, id: &AgentId, available: bool) {
        self.pool.set_presence(id, available);
    }

    /// Register (or replace) a channel adapter at runtime
    pub fn register_adapter(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.deps.router.register(adapter);
    }

    /// The transcript sink this engine records into
    pub fn transcript(&self) -> Arc<dyn TranscriptSink> {
        self.deps.transcript.clone()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Current state of the session for `key`, if one is live
    pub fn session_state(&self, key: &ConversationKey) -> Option<ConversationState> {
        self.registry.get(key).map(|handle| handle.meta.state())
    }

    /// Close every session and stop the background tasks
    pub async fn shutdown(&self) {
        info!("Conversation engine shutting down");
        self.registry.close_all(CloseReason::Shutdown);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
