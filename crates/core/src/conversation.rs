use crate::types::Message;
use situator_llm::ConversationEntry;

/// Provider-facing history and the user-facing transcript, kept side by side.
/// Both are append-only within a scenario and cleared together.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    history: Vec<ConversationEntry>,
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ConversationEntry] {
        &self.history
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_entry(&mut self, entry: ConversationEntry) {
        self.history.push(entry);
    }

    /// Record a player line in both the transcript and the history.
    pub fn push_user_turn(&mut self, text: &str) {
        self.messages.push(Message::user(text));
        self.history.push(ConversationEntry::user(text));
    }

    /// Drop the provider history only; the transcript is kept.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Clear history and transcript together.
    pub fn reset(&mut self) {
        self.history.clear();
        self.messages.clear();
    }
}
