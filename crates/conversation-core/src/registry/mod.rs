//! # Session Registry
//!
//! Maps each [`ConversationKey`] to its live session worker. Creation is
//! atomic per key (dashmap shard entry), so two concurrent creators for the
//! same key always end up talking to the same session. Close is idempotent
//! and unknown keys are a no-op. The idle sweep never enters a session's
//! serialization domain: it reads the shared meta view, then asks matching
//! workers to expire themselves, and each worker re-checks its own activity
//! before actually closing.

pub mod session;

pub use session::{Session, SessionMeta};

use crate::adapters::InboundEvent;
use crate::agent::AgentHandle;
use crate::state_table::ConversationState;
use crate::types::{CloseReason, ConversationKey};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Commands accepted by a session worker, processed strictly in order
#[derive(Debug)]
pub enum SessionCommand {
    /// A normalized channel event
    Inbound(InboundEvent),
    /// The pool reserved this human agent for the session
    HumanReady(AgentHandle),
    /// Close the session unless it saw activity after `cutoff`
    ExpireIfIdleSince { cutoff: DateTime<Utc> },
}

/// Everything a freshly spawned worker needs
pub struct SessionSeed {
    pub epoch: u64,
    pub meta: Arc<SessionMeta>,
    pub commands: mpsc::Receiver<SessionCommand>,
    pub closed: watch::Receiver<Option<CloseReason>>,
}

/// Client side of one live session worker
#[derive(Clone)]
pub struct SessionHandle {
    pub epoch: u64,
    pub meta: Arc<SessionMeta>,
    commands: mpsc::Sender<SessionCommand>,
    close_tx: Arc<watch::Sender<Option<CloseReason>>>,
}

impl SessionHandle {
    /// Enqueue a command; waits when the session's FIFO is full
    /// (backpressure). Fails only when the worker has already exited.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionCommand> {
        self.commands.send(command).await.map_err(|e| e.0)
    }

    /// Enqueue without waiting; used by the sweep, which must never block
    pub fn try_send(&self, command: SessionCommand) -> bool {
        self.commands.try_send(command).is_ok()
    }

    /// Flip the close signal. Reaches the worker even when the command
    /// queue is full and interrupts an in-flight agent invocation.
    pub fn signal_close(&self, reason: CloseReason) {
        // send only fails when the worker is gone, which is fine for an
        // idempotent close
        let _ = self.close_tx.send(Some(reason));
    }
}

/// Session counts by state
#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    pub total: usize,
    pub new: usize,
    pub active_ai: usize,
    pub escalating: usize,
    pub waiting_for_human: usize,
    pub active_human: usize,
}

/// Process-wide key -> session map
pub struct SessionRegistry {
    sessions: DashMap<ConversationKey, SessionHandle>,
    queue_depth: usize,
    epochs: AtomicU64,
}

impl SessionRegistry {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_depth,
            epochs: AtomicU64::new(0),
        }
    }

    /// Look up the live session for `key`, creating (and spawning, via
    /// `spawn`) one if absent. Atomic with respect to concurrent creators
    /// for the same key; never fails for valid input.
    pub fn get_or_create<F>(&self, key: &ConversationKey, spawn: F) -> SessionHandle
    where
        F: FnOnce(SessionSeed),
    {
        let entry = self.sessions.entry(key.clone()).or_insert_with(|| {
            let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
            let meta = Arc::new(SessionMeta::new(key.clone()));
            let (command_tx, command_rx) = mpsc::channel(self.queue_depth);
            let (close_tx, close_rx) = watch::channel(None);

            info!("Created new session for {}", key);
            spawn(SessionSeed {
                epoch,
                meta: meta.clone(),
                commands: command_rx,
                closed: close_rx,
            });

            SessionHandle {
                epoch,
                meta,
                commands: command_tx,
                close_tx: Arc::new(close_tx),
            }
        });
        entry.value().clone()
    }

    /// Fetch the live session for `key`, if any
    pub fn get(&self, key: &ConversationKey) -> Option<SessionHandle> {
        self.sessions.get(key).map(|e| e.value().clone())
    }

    /// Close the session for `key`. Idempotent: closing an already-closed
    /// or unknown session is a no-op.
    pub fn close(&self, key: &ConversationKey, reason: CloseReason) {
        match self.get(key) {
            Some(handle) => {
                debug!("Close requested for {} ({})", key, reason);
                handle.signal_close(reason);
            }
            None => debug!("Close for unknown session {} ignored", key),
        }
    }

    /// Close every live session (shutdown path)
    pub fn close_all(&self, reason: CloseReason) {
        for entry in self.sessions.iter() {
            entry.value().signal_close(reason);
        }
    }

    /// Ask every session idle since before `now - threshold` to expire.
    /// Candidates are collected from the shared meta view first so no
    /// session lock is held across the scan; each worker re-checks its own
    /// activity before closing, so a message that slipped in while the
    /// sweep ran keeps the session alive.
    pub fn expire_idle(&self, threshold: Duration) {
        let Ok(threshold) = chrono::Duration::from_std(threshold) else {
            warn!("Idle threshold out of range; skipping sweep");
            return;
        };
        let cutoff = Utc::now() - threshold;

        let candidates: Vec<SessionHandle> = self
            .sessions
            .iter()
            .filter(|e| e.value().meta.last_activity() <= cutoff)
            .map(|e| e.value().clone())
            .collect();

        if candidates.is_empty() {
            return;
        }
        debug!("Idle sweep: {} candidate session(s)", candidates.len());
        for handle in candidates {
            // A full queue means the session has work in flight; it is not
            // idle, so skipping it here is correct.
            if !handle.try_send(SessionCommand::ExpireIfIdleSince { cutoff }) {
                debug!("Idle sweep skipped busy session {}", handle.meta.key);
            }
        }
    }

    /// Remove a worker's registry entry, but only if it still owns it (a
    /// newer incarnation for the same key must not be evicted by an old
    /// worker's cleanup).
    pub fn remove(&self, key: &ConversationKey, epoch: u64) {
        self.sessions.remove_if(key, |_, h| h.epoch == epoch);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get session statistics
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.sessions.iter() {
            stats.total += 1;
            match entry.value().meta.state() {
                ConversationState::New => stats.new += 1,
                ConversationState::ActiveAi => stats.active_ai += 1,
                ConversationState::Escalating => stats.escalating += 1,
                ConversationState::WaitingForHuman => stats.waiting_for_human += 1,
                ConversationState::ActiveHuman => stats.active_human += 1,
                // Terminal sessions leave the registry with their worker
                ConversationState::Closed | ConversationState::Failed => {}
            }
        }
        stats
    }
}
