use super::types::{ConversationTurn, WireMessage};

/// Append-only conversation history for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last_assistant(&self) -> Option<&ConversationTurn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == super::types::Role::Assistant)
    }

    /// What gets sent upstream with the next submission.
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.turns.iter().map(ConversationTurn::to_wire).collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
