//! # Agent Pool
//!
//! Holds AI connector capacity and human presence state, and matches freed
//! human capacity to the longest-waiting session. Assignment never fails
//! outright for humans: when nobody is idle the session is queued
//! (backpressure), and a [`PoolNotice`] is emitted as soon as capacity
//! frees up so the engine can complete the hand-off without waiting for a
//! new inbound event.

use super::{AgentConnector, AgentHandle, AgentId, AgentKind};
use crate::types::ConversationKey;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of an assignment request
#[derive(Debug, Clone)]
pub enum Assignment {
    Assigned(AgentHandle),
    /// Queued for the next free human; not an error
    NoAgentAvailable,
}

/// Pushed to the engine when a freed human has been reserved for a
/// waiting session
#[derive(Debug, Clone)]
pub struct PoolNotice {
    pub key: ConversationKey,
    pub agent: AgentHandle,
}

/// Point-in-time pool occupancy
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    pub ai_agents: usize,
    pub human_agents: usize,
    pub humans_idle: usize,
    pub waiting_sessions: usize,
}

struct AgentSlot {
    handle: AgentHandle,
    capacity: usize,
    in_use: usize,
    /// Presence: humans toggle this; AI connectors are always present
    available: bool,
}

impl AgentSlot {
    fn has_room(&self) -> bool {
        self.available && self.in_use < self.capacity
    }
}

struct PoolInner {
    /// Registration order decides assignment preference, so the map is
    /// insertion-ordered
    agents: IndexMap<AgentId, AgentSlot>,
    /// Sessions awaiting a human, oldest first
    waiting: VecDeque<ConversationKey>,
}

/// Process-wide agent capacity registry
pub struct AgentPool {
    inner: Mutex<PoolInner>,
    notices: mpsc::UnboundedSender<PoolNotice>,
}

impl AgentPool {
    /// Create a pool and the notice stream the engine drains
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PoolNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            inner: Mutex::new(PoolInner {
                agents: IndexMap::new(),
                waiting: VecDeque::new(),
            }),
            notices: tx,
        });
        (pool, rx)
    }

    /// Register an AI connector with the given concurrent-session capacity
    pub fn register_ai(&self, connector: Arc<dyn AgentConnector>, capacity: usize) -> AgentId {
        let id = AgentId::new();
        let handle = AgentHandle {
            id: id.clone(),
            kind: AgentKind::Ai,
            connector,
        };
        let mut inner = self.inner.lock();
        inner.agents.insert(
            id.clone(),
            AgentSlot {
                handle,
                capacity,
                in_use: 0,
                available: true,
            },
        );
        info!("Registered AI agent {} with capacity {}", id, capacity);
        id
    }

    /// Register a human agent (capacity 1, initially present)
    pub fn register_human(&self, connector: Arc<dyn AgentConnector>) -> AgentId {
        let id = AgentId::new();
        let handle = AgentHandle {
            id: id.clone(),
            kind: AgentKind::Human,
            connector,
        };
        {
            let mut inner = self.inner.lock();
            inner.agents.insert(
                id.clone(),
                AgentSlot {
                    handle,
                    capacity: 1,
                    in_use: 0,
                    available: true,
                },
            );
        }
        info!("Registered human agent {}", id);
        // A fresh human may already have someone waiting for them
        self.match_waiting();
        id
    }

    /// Update a human agent's presence. Going available can complete a
    /// pending hand-off.
    pub fn set_presence(&self, id: &AgentId, available: bool) {
        {
            let mut inner = self.inner.lock();
            match inner.agents.get_mut(id) {
                Some(slot) => {
                    slot.available = available;
                    debug!("Agent {} presence set to {}", id, available);
                }
                None => {
                    warn!("Presence update for unknown agent {}", id);
                    return;
                }
            }
        }
        if available {
            self.match_waiting();
        }
    }

    /// Remove an agent from the pool entirely
    pub fn deregister(&self, id: &AgentId) {
        let mut inner = self.inner.lock();
        if inner.agents.shift_remove(id).is_some() {
            info!("Deregistered agent {}", id);
        }
    }

    /// Reserve an agent of the requested kind for a session. For humans,
    /// no idle capacity queues the session instead of failing.
    pub fn assign(&self, key: &ConversationKey, kind: AgentKind) -> Assignment {
        let mut inner = self.inner.lock();
        let slot = inner
            .agents
            .values_mut()
            .filter(|s| s.handle.kind == kind)
            .find(|s| s.has_room());

        match slot {
            Some(slot) => {
                slot.in_use += 1;
                debug!(
                    "Assigned {} agent {} to {} ({}/{} in use)",
                    kind, slot.handle.id, key, slot.in_use, slot.capacity
                );
                Assignment::Assigned(slot.handle.clone())
            }
            None if kind == AgentKind::Human => {
                if !inner.waiting.contains(key) {
                    inner.waiting.push_back(key.clone());
                }
                info!(
                    "No human agent idle; queued {} ({} waiting)",
                    key,
                    inner.waiting.len()
                );
                Assignment::NoAgentAvailable
            }
            None => {
                warn!("No {} agent capacity for {}", kind, key);
                Assignment::NoAgentAvailable
            }
        }
    }

    /// Return a previously assigned agent's capacity to the pool. Must be
    /// called exactly once per successful assignment; freed human capacity
    /// is immediately offered to the longest-waiting session.
    pub fn release(&self, handle: &AgentHandle) {
        {
            let mut inner = self.inner.lock();
            match inner.agents.get_mut(&handle.id) {
                Some(slot) => {
                    if slot.in_use == 0 {
                        warn!("Release of agent {} that was not in use", handle.id);
                    } else {
                        slot.in_use -= 1;
                    }
                    debug!("Released agent {} ({} in use)", handle.id, slot.in_use);
                }
                None => {
                    // Deregistered while assigned; nothing to return
                    debug!("Released unknown agent {}", handle.id);
                    return;
                }
            }
        }
        self.match_waiting();
    }

    /// Drop a session from the waiting queue (it closed or was served)
    pub fn forget_waiting(&self, key: &ConversationKey) {
        let mut inner = self.inner.lock();
        inner.waiting.retain(|k| k != key);
    }

    pub fn waiting_len(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let mut stats = PoolStats {
            waiting_sessions: inner.waiting.len(),
            ..Default::default()
        };
        for slot in inner.agents.values() {
            match slot.handle.kind {
                AgentKind::Ai => stats.ai_agents += 1,
                AgentKind::Human => {
                    stats.human_agents += 1;
                    if slot.has_room() {
                        stats.humans_idle += 1;
                    }
                }
            }
        }
        stats
    }

    /// Pair idle humans with waiting sessions, oldest session first. The
    /// reserved capacity is handed to the engine via the notice stream;
    /// the engine releases it back if the session is already gone.
    fn match_waiting(&self) {
        let mut matched = Vec::new();
        {
            let mut inner = self.inner.lock();
            while let Some(key) = inner.waiting.pop_front() {
                let slot = inner
                    .agents
                    .values_mut()
                    .filter(|s| s.handle.kind == AgentKind::Human)
                    .find(|s| s.has_room());
                match slot {
                    Some(slot) => {
                        slot.in_use += 1;
                        let agent = slot.handle.clone();
                        matched.push(PoolNotice { key, agent });
                    }
                    None => {
                        inner.waiting.push_front(key);
                        break;
                    }
                }
            }
        }
        for notice in matched {
            info!(
                "Human agent {} freed for waiting session {}",
                notice.agent.id, notice.key
            );
            if self.notices.send(notice).is_err() {
                warn!("Pool notice receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, AgentOutcome, SessionContext};
    use crate::types::{Channel, EndUserId, OrganizationId};
    use async_trait::async_trait;

    struct NullConnector;

    #[async_trait]
    impl AgentConnector for NullConnector {
        async fn invoke(&self, _context: SessionContext) -> Result<AgentOutcome, AgentError> {
            Ok(AgentOutcome::NoReply)
        }
    }

    fn key(user: &str) -> ConversationKey {
        ConversationKey::new(
            OrganizationId::from_uuid(uuid::Uuid::nil()),
            EndUserId(user.to_string()),
            Channel::WebChat,
        )
    }

    #[tokio::test]
    async fn ai_capacity_is_bounded() {
        let (pool, _rx) = AgentPool::new();
        pool.register_ai(Arc::new(NullConnector), 2);

        let a = pool.assign(&key("a"), AgentKind::Ai);
        let b = pool.assign(&key("b"), AgentKind::Ai);
        let c = pool.assign(&key("c"), AgentKind::Ai);

        assert!(matches!(a, Assignment::Assigned(_)));
        assert!(matches!(b, Assignment::Assigned(_)));
        assert!(matches!(c, Assignment::NoAgentAvailable));
    }

    #[tokio::test]
    async fn freed_human_is_matched_to_longest_waiting_session() {
        let (pool, mut rx) = AgentPool::new();
        pool.register_human(Arc::new(NullConnector));

        let first = match pool.assign(&key("first"), AgentKind::Human) {
            Assignment::Assigned(h) => h,
            Assignment::NoAgentAvailable => panic!("Should assign the idle human"),
        };
        assert!(matches!(
            pool.assign(&key("second"), AgentKind::Human),
            Assignment::NoAgentAvailable
        ));
        assert!(matches!(
            pool.assign(&key("third"), AgentKind::Human),
            Assignment::NoAgentAvailable
        ));
        assert_eq!(pool.waiting_len(), 2);

        pool.release(&first);
        let notice = rx.recv().await.expect("Should emit a pool notice");
        assert_eq!(notice.key, key("second"));
        assert_eq!(pool.waiting_len(), 1);
    }

    #[tokio::test]
    async fn double_queueing_is_deduplicated() {
        let (pool, _rx) = AgentPool::new();
        let k = key("dup");
        pool.assign(&k, AgentKind::Human);
        pool.assign(&k, AgentKind::Human);
        assert_eq!(pool.waiting_len(), 1);
    }

    #[tokio::test]
    async fn presence_gates_assignment() {
        let (pool, _rx) = AgentPool::new();
        let id = pool.register_human(Arc::new(NullConnector));
        pool.set_presence(&id, false);
        assert!(matches!(
            pool.assign(&key("x"), AgentKind::Human),
            Assignment::NoAgentAvailable
        ));
    }
}
