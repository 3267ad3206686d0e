use super::types::{EventType, MasterStateTable, StateKey, ConversationState, Transition};

/// Incrementally builds the master state table
pub struct StateTableBuilder {
    table: MasterStateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self {
            table: MasterStateTable::new(),
        }
    }

    pub fn add_transition(
        &mut self,
        state: ConversationState,
        event: EventType,
        transition: Transition,
    ) -> &mut Self {
        self.table.insert(StateKey { state, event }, transition);
        self
    }

    /// Mark an event as a defined no-op in the given state
    pub fn add_ignore(&mut self, state: ConversationState, event: EventType) -> &mut Self {
        self.add_transition(state, event, Transition::ignore())
    }

    pub fn build(self) -> MasterStateTable {
        self.table
    }
}
