//! # Transcript Sink
//!
//! Append-only message store seam. The orchestrator appends every accepted
//! message here *before* invoking an agent (write-ahead ordering), so no
//! message can be acknowledged to a channel without being recorded first.
//! The sink supports lookup by `(key, sequence)` for audit and debugging.
//!
//! Durable history storage is an external collaborator; [`InMemoryTranscript`]
//! is the default in-process implementation and the reference for what an
//! external store must provide.

use crate::error::{OrchestratorError, Result};
use crate::types::{ConversationKey, Message};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Append one record. Called with strictly increasing sequence numbers
    /// per key.
    async fn append(&self, message: &Message) -> Result<()>;

    /// Fetch one record by its position in the session
    async fn lookup(&self, key: &ConversationKey, sequence: u64) -> Result<Option<Message>>;

    /// Fetch the full ordered history for a session
    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>>;
}

/// In-process transcript store backed by per-session ordered maps
pub struct InMemoryTranscript {
    records: RwLock<HashMap<ConversationKey, BTreeMap<u64, Message>>>,
}

impl InMemoryTranscript {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of stored records, across all sessions
    pub async fn len(&self) -> usize {
        let records = self.records.read().await;
        records.values().map(|m| m.len()).sum()
    }
}

#[async_trait]
impl TranscriptSink for InMemoryTranscript {
    async fn append(&self, message: &Message) -> Result<()> {
        let mut records = self.records.write().await;
        let session = records.entry(message.key.clone()).or_default();
        if session.insert(message.sequence, message.clone()).is_some() {
            return Err(OrchestratorError::Transcript(format!(
                "duplicate sequence {} for {}",
                message.sequence, message.key
            )));
        }
        Ok(())
    }

    async fn lookup(&self, key: &ConversationKey, sequence: u64) -> Result<Option<Message>> {
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .and_then(|session| session.get(&sequence))
            .cloned())
    }

    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .map(|session| session.values().cloned().collect())
            .unwrap_or_default())
    }
}
