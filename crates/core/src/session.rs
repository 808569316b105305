//! Explicit session state threaded through the scenario and chat functions.
//!
//! Each scenario session carries an id. Calls capture it when dispatched and
//! their results are dropped if the id changed while they were in flight.

use crate::config::SituatorCfg;
use crate::conversation::ConversationState;
use crate::types::{Message, Person, ScenarioSelection, ScenarioState, ScenarioTemplate};
use serde_json::Value;
use situator_llm::ProviderConfig;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub cfg: SituatorCfg,
    pub state: ScenarioState,
    pub template: Option<ScenarioTemplate>,
    pub selection: Option<ScenarioSelection>,
    /// Retained `scenario` object from the generation reply.
    pub scenario_data: Option<Value>,
    /// Free-form text appended after the response format on every turn.
    pub scenario_context: Option<String>,
    pub people: Vec<Person>,
    pub conversation: ConversationState,
    /// True while an AI call is in flight.
    pub processing: bool,
    /// True while the front-end should be asking the player to pick a template.
    pub awaiting_template: bool,
    session_id: Uuid,
}

impl SessionContext {
    pub fn new(cfg: SituatorCfg) -> Self {
        Self {
            cfg,
            state: ScenarioState::Idle,
            template: None,
            selection: None,
            scenario_data: None,
            scenario_context: None,
            people: Vec::new(),
            conversation: ConversationState::new(),
            processing: false,
            awaiting_template: false,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Check if a previously captured session id is still current.
    pub fn is_current(&self, captured: Uuid) -> bool {
        self.session_id == captured
    }

    pub fn provider(&self) -> ProviderConfig {
        self.cfg.active_provider()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.conversation.push_message(Message::system(content));
    }

    pub fn is_active(&self) -> bool {
        self.state == ScenarioState::Active
    }

    /// Start a fresh scenario session: new id, empty transcript, history and people.
    pub(crate) fn begin_session(&mut self) -> Uuid {
        self.session_id = Uuid::new_v4();
        self.conversation.reset();
        self.people.clear();
        self.scenario_data = None;
        self.selection = None;
        self.session_id
    }

    /// Return to `Idle`, discarding all scenario state. Any call still in
    /// flight belongs to the old session and will be ignored on completion.
    pub fn reset(&mut self) {
        self.begin_session();
        self.state = ScenarioState::Idle;
        self.processing = false;
        tracing::info!(session = %self.session_id, "session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_state_and_changes_id() {
        let mut ctx = SessionContext::new(SituatorCfg::default());
        let before = ctx.session_id();
        ctx.conversation.push_user_turn("hi");
        ctx.conversation.push_message(Message::system("x"));
        ctx.state = ScenarioState::Active;
        ctx.processing = true;

        ctx.reset();
        assert!(!ctx.is_current(before));
        assert!(ctx.messages().is_empty());
        assert!(ctx.conversation.history().is_empty());
        assert_eq!(ctx.state, ScenarioState::Idle);
        assert!(!ctx.processing);
    }
}
