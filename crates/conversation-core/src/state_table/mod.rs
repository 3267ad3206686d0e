//! # Conversation State Table
//!
//! Declarative (state, event) -> transition table for the session state
//! machine. The table is the single source of truth for what happens to a
//! session: the executor only ever looks transitions up here, so the
//! reachable behavior of the orchestrator can be read (and tested) in one
//! place. The table is total: `validate()` walks the full state x event
//! cross product and fails on any undefined pair.

pub mod builder;
pub mod tables;
pub mod types;

pub use builder::StateTableBuilder;
pub use types::*;

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The master state table - single source of truth for all transitions
    pub static ref MASTER_TABLE: Arc<MasterStateTable> = Arc::new(build_master_table());
}

/// Build and validate the complete master state table
fn build_master_table() -> MasterStateTable {
    let mut builder = StateTableBuilder::new();
    tables::build_transitions(&mut builder);
    let table = builder.build();

    if let Err(errors) = table.validate() {
        panic!("Invalid master state table: {:?}", errors);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_table_is_total() {
        let table = &*MASTER_TABLE;
        assert!(table.validate().is_ok());
        assert_eq!(
            table.transition_count(),
            ConversationState::ALL.len() * EventType::exemplars().len()
        );
    }

    #[test]
    fn lookup_normalizes_event_payloads() {
        let table = &*MASTER_TABLE;
        let key = StateKey {
            state: ConversationState::ActiveAi,
            event: EventType::InboundMessage {
                body: "hello there".to_string(),
            },
        };
        assert!(table.get(&key).is_some(), "Should match on event type, not payload");
    }
}
