//! One player turn: validate, build the prompt, call the provider, and fold
//! the structured reply back into transcript, people and history.

use crate::error::SessionError;
use crate::prompt::build_system_prompt;
use crate::session::SessionContext;
use crate::types::{Message, Person, PersonUpdate, TurnResponse};
use situator_llm::{ConversationEntry, Gateway, LlmError, ProviderConfig, StructuredResponse};
use uuid::Uuid;

pub const NO_SCENARIO_NOTICE: &str = "Please start a new scenario first.";

const FAILURE_PREFIX: &str = "Error processing response. ";
const KEY_HINT: &str = "Please check your API key and try again.";
const SCHEMA_HINT: &str =
    "The AI returned invalid JSON format. This may be a provider compatibility issue.";

/// Result of one turn attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply applied to the session.
    Completed,
    /// Preconditions failed; nothing was sent.
    Skipped(SessionError),
    /// The call or its decoding failed; one system message explains why.
    Failed(SessionError),
    /// The session was reset while the call was in flight; the reply was dropped.
    Discarded,
}

/// A chat call captured at dispatch time.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub session_id: Uuid,
    pub provider: ProviderConfig,
    pub temperature: f32,
    pub system_prompt: String,
    pub history: Vec<ConversationEntry>,
}

/// Validate player input and record it. Blank input, a missing API key or a
/// call in flight are silent no-ops; a missing scenario leaves one notice and
/// touches nothing else.
pub fn begin_turn(ctx: &mut SessionContext, text: &str) -> Result<PendingTurn, SessionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SessionError::EmptyInput);
    }
    if !ctx.cfg.has_api_key() {
        return Err(SessionError::MissingApiKey(ctx.cfg.selected_provider));
    }
    if ctx.processing {
        return Err(SessionError::Busy);
    }
    if !ctx.is_active() {
        ctx.push_system(NO_SCENARIO_NOTICE);
        return Err(SessionError::MissingActiveScenario);
    }

    ctx.conversation.push_user_turn(text);
    prepare_turn(ctx)
}

/// Build the request for the current history and mark the session busy.
pub fn prepare_turn(ctx: &mut SessionContext) -> Result<PendingTurn, SessionError> {
    if ctx.processing {
        return Err(SessionError::Busy);
    }
    if !ctx.is_active() || ctx.template.is_none() {
        ctx.push_system(NO_SCENARIO_NOTICE);
        return Err(SessionError::MissingActiveScenario);
    }

    let system_prompt = match &ctx.template {
        Some(template) => build_system_prompt(
            template,
            ctx.scenario_data.as_ref(),
            ctx.scenario_context.as_deref(),
        ),
        None => return Err(SessionError::MissingActiveScenario),
    };
    let provider = ctx.provider();
    tracing::debug!(
        provider = provider.kind.tag(),
        model = %provider.model,
        history_len = ctx.conversation.history().len(),
        "dispatching turn"
    );
    ctx.processing = true;

    Ok(PendingTurn {
        session_id: ctx.session_id(),
        temperature: ctx.cfg.temperature,
        provider,
        system_prompt,
        history: ctx.conversation.history().to_vec(),
    })
}

/// Apply a turn reply to the session it was dispatched for.
pub fn finish_turn(
    ctx: &mut SessionContext,
    pending: &PendingTurn,
    result: Result<StructuredResponse, LlmError>,
) -> TurnOutcome {
    if !ctx.is_current(pending.session_id) {
        tracing::warn!(session = %pending.session_id, "discarding turn reply for a stale session");
        return TurnOutcome::Discarded;
    }
    ctx.processing = false;

    let decoded = result.and_then(|raw| {
        serde_json::from_value::<TurnResponse>(raw.clone())
            .map(|response| (raw, response))
            .map_err(|e| LlmError::JsonContract(format!("turn reply: {e}")))
    });

    match decoded {
        Ok((raw, response)) => {
            apply_response(ctx, &response);
            // The model's own structured output becomes its history entry.
            ctx.conversation
                .push_entry(ConversationEntry::assistant(raw.to_string()));
            TurnOutcome::Completed
        }
        Err(err) => {
            let err = SessionError::from(err);
            tracing::warn!(error = %err, "turn failed");
            ctx.push_system(failure_notice(&err));
            TurnOutcome::Failed(err)
        }
    }
}

/// Dialog lines, observable changes and people updates from one reply.
pub fn apply_response(ctx: &mut SessionContext, response: &TurnResponse) {
    for line in &response.dialog {
        ctx.conversation
            .push_message(Message::npc(&line.speaker, &line.text));
    }
    if !response.observable_changes.is_empty() {
        ctx.push_system(&response.observable_changes);
    }
    apply_people_updates(&mut ctx.people, &response.people_updates);
}

/// Update `observable` of people matched by exact name. Unknown names are ignored.
pub fn apply_people_updates(people: &mut [Person], updates: &[PersonUpdate]) {
    for update in updates {
        match people.iter_mut().find(|p| p.name == update.name) {
            Some(person) => person.observable = update.observable.clone(),
            None => tracing::debug!(name = %update.name, "update for unknown person ignored"),
        }
    }
}

/// User-facing text for a failed turn.
pub fn failure_notice(err: &SessionError) -> String {
    let hint = match err {
        SessionError::Gateway(LlmError::HttpStatus { .. }) => KEY_HINT.to_owned(),
        SessionError::Gateway(LlmError::JsonContract(_)) => SCHEMA_HINT.to_owned(),
        other => {
            let message = other.to_string();
            if ["API error", "401", "403"].iter().any(|s| message.contains(s)) {
                KEY_HINT.to_owned()
            } else if message.contains("JSON") || message.contains("parse") {
                SCHEMA_HINT.to_owned()
            } else {
                format!("Details: {message}")
            }
        }
    };
    format!("{FAILURE_PREFIX}{hint}")
}

/// Record `text` and run one turn against the selected provider.
pub async fn send_message(ctx: &mut SessionContext, gateway: &Gateway, text: &str) -> TurnOutcome {
    match begin_turn(ctx, text) {
        Ok(pending) => dispatch(ctx, gateway, pending).await,
        Err(e) => TurnOutcome::Skipped(e),
    }
}

/// Run a turn on the existing history without adding player input.
pub async fn process_with_ai(ctx: &mut SessionContext, gateway: &Gateway) -> TurnOutcome {
    match prepare_turn(ctx) {
        Ok(pending) => dispatch(ctx, gateway, pending).await,
        Err(e) => TurnOutcome::Skipped(e),
    }
}

async fn dispatch(ctx: &mut SessionContext, gateway: &Gateway, pending: PendingTurn) -> TurnOutcome {
    let result = gateway
        .invoke(
            &pending.provider,
            pending.temperature,
            &pending.system_prompt,
            &pending.history,
        )
        .await;
    finish_turn(ctx, &pending, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SituatorCfg;
    use crate::types::{MessageKind, ScenarioState, ScenarioTemplate};
    use serde_json::json;
    use situator_llm::provider::{HttpResponse, MockTransport};
    use situator_llm::{DebugKind, DebugRecorder, Role};
    use std::sync::Arc;

    const REPLY: &str = r#"{"dialog":[{"speaker":"Ravi","text":"Fresh bread!"},{"speaker":"Ines","text":"Move along."}],"observableChanges":"Ines steps closer.","internalNotes":"Ines suspects the player.","peopleUpdates":[{"name":"Ines","observable":"hand on sword"},{"name":"Ghost","observable":"boo"}]}"#;

    fn person(name: &str) -> Person {
        Person {
            name: name.into(),
            role: "civilian".into(),
            observable: "idle".into(),
            color: "#34C759".into(),
        }
    }

    fn active_ctx() -> SessionContext {
        let mut cfg = SituatorCfg::default();
        cfg.openai.api_key = "sk-test".into();
        let mut ctx = SessionContext::new(cfg);
        ctx.template = Some(ScenarioTemplate {
            name: "Market".into(),
            system_prompt: "Scene:\n<CURRENT SCENARIO DATA>".into(),
            ..Default::default()
        });
        ctx.scenario_data = Some(json!({ "setting": "market" }));
        ctx.people = vec![person("Ravi"), person("Ines")];
        ctx.state = ScenarioState::Active;
        ctx
    }

    fn gateway(replies: Vec<Result<HttpResponse, LlmError>>) -> (Gateway, Arc<MockTransport>, Arc<DebugRecorder>) {
        let mock = Arc::new(MockTransport::new(replies));
        let recorder = Arc::new(DebugRecorder::default());
        (Gateway::new(mock.clone(), recorder.clone()), mock, recorder)
    }

    fn oai(content: &str) -> Result<HttpResponse, LlmError> {
        Ok(HttpResponse::ok(
            json!({ "choices": [{ "message": { "content": content } }] }).to_string(),
        ))
    }

    #[tokio::test]
    async fn turn_applies_dialog_changes_and_people() {
        let (gw, mock, _) = gateway(vec![oai(REPLY)]);
        let mut ctx = active_ctx();

        let outcome = send_message(&mut ctx, &gw, "  Hello there  ").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(!ctx.processing);

        let msgs = ctx.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], Message::user("Hello there"));
        assert_eq!(msgs[1], Message::npc("Ravi", "Fresh bread!"));
        assert_eq!(msgs[2].sender, "Ines");
        assert_eq!(msgs[3], Message::system("Ines steps closer."));

        assert_eq!(ctx.people.len(), 2);
        assert_eq!(ctx.people[1].observable, "hand on sword");
        assert_eq!(ctx.people[0].observable, "idle");

        let history = ctx.conversation.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationEntry::user("Hello there"));
        assert_eq!(history[1].role, Role::Assistant);

        let sent = &mock.requests()[0];
        let system = sent.body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("\"setting\": \"market\""));
        assert!(system.contains("## RESPONSE FORMAT"));
        assert_eq!(sent.body["messages"][1]["content"], "Hello there");
    }

    #[tokio::test]
    async fn assistant_history_round_trips_exactly() {
        let (gw, _, _) = gateway(vec![oai(REPLY)]);
        let mut ctx = active_ctx();
        send_message(&mut ctx, &gw, "hi").await;
        let stored = &ctx.conversation.history()[1].content;
        let original: serde_json::Value = serde_json::from_str(REPLY).unwrap();
        assert_eq!(stored, &original.to_string());
        assert_eq!(stored, REPLY);
    }

    #[test]
    fn unknown_person_update_changes_nothing() {
        let mut people = vec![person("Ravi")];
        let before = people.clone();
        apply_people_updates(
            &mut people,
            &[PersonUpdate { name: "Stranger".into(), observable: "waves".into() }],
        );
        assert_eq!(people, before);
    }

    #[test]
    fn empty_observable_changes_adds_no_message() {
        let mut ctx = active_ctx();
        apply_response(
            &mut ctx,
            &TurnResponse { dialog: vec![], ..Default::default() },
        );
        assert!(ctx.messages().is_empty());
    }

    #[tokio::test]
    async fn no_scenario_leaves_single_notice() {
        let (gw, mock, _) = gateway(vec![]);
        let mut ctx = active_ctx();
        ctx.state = ScenarioState::Idle;
        ctx.template = None;
        let people_before = ctx.people.clone();

        let outcome = send_message(&mut ctx, &gw, "hi").await;
        assert_eq!(outcome, TurnOutcome::Skipped(SessionError::MissingActiveScenario));
        assert!(ctx.conversation.history().is_empty());
        assert_eq!(ctx.people, people_before);
        assert_eq!(ctx.messages().len(), 1);
        assert_eq!(ctx.messages()[0].kind, MessageKind::System);
        assert_eq!(ctx.messages()[0].content, NO_SCENARIO_NOTICE);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn silent_no_ops() {
        let (gw, mock, _) = gateway(vec![]);

        let mut ctx = active_ctx();
        assert_eq!(send_message(&mut ctx, &gw, "   ").await, TurnOutcome::Skipped(SessionError::EmptyInput));

        ctx.processing = true;
        assert_eq!(send_message(&mut ctx, &gw, "hi").await, TurnOutcome::Skipped(SessionError::Busy));
        ctx.processing = false;

        ctx.cfg.openai.api_key.clear();
        assert!(matches!(
            send_message(&mut ctx, &gw, "hi").await,
            TurnOutcome::Skipped(SessionError::MissingApiKey(_))
        ));

        assert!(ctx.messages().is_empty());
        assert!(ctx.conversation.history().is_empty());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_produces_one_error_and_key_hint() {
        let (gw, _, recorder) = gateway(vec![Ok(HttpResponse { status: 401, body: "invalid key".into() })]);
        let mut ctx = active_ctx();

        let outcome = send_message(&mut ctx, &gw, "hi").await;
        assert!(matches!(outcome, TurnOutcome::Failed(SessionError::Gateway(LlmError::HttpStatus { status: 401, .. }))));
        assert!(!ctx.processing);

        let errors = recorder.entries().into_iter().filter(|e| e.kind == DebugKind::Error).count();
        assert_eq!(errors, 1);

        let system: Vec<_> = ctx.messages().iter().filter(|m| m.kind == MessageKind::System).collect();
        assert_eq!(system.len(), 1);
        assert!(system[0].content.contains("check your API key"));
        // failed turn adds no assistant entry
        assert_eq!(ctx.conversation.history().len(), 1);
    }

    #[tokio::test]
    async fn non_json_reply_gets_schema_hint() {
        let (gw, _, _) = gateway(vec![oai("Sorry, I can't do that.")]);
        let mut ctx = active_ctx();
        let outcome = send_message(&mut ctx, &gw, "hi").await;
        assert!(matches!(outcome, TurnOutcome::Failed(SessionError::Gateway(LlmError::JsonContract(_)))));
        assert!(ctx.messages().last().unwrap().content.contains("invalid JSON format"));
    }

    #[tokio::test]
    async fn reply_missing_dialog_is_contract_error() {
        let (gw, _, _) = gateway(vec![oai(r#"{"observableChanges":"x"}"#)]);
        let mut ctx = active_ctx();
        let outcome = send_message(&mut ctx, &gw, "hi").await;
        assert!(matches!(outcome, TurnOutcome::Failed(SessionError::Gateway(LlmError::JsonContract(_)))));
        assert_eq!(ctx.messages().len(), 2);
    }

    #[test]
    fn failure_notice_classification() {
        let net = SessionError::Gateway(LlmError::Network("connection reset".into()));
        assert_eq!(failure_notice(&net), "Error processing response. Details: network error: connection reset");
        let net403 = SessionError::Gateway(LlmError::Network("proxy said 403".into()));
        assert!(failure_notice(&net403).ends_with(KEY_HINT));
        let parse = SessionError::Gateway(LlmError::Network("could not parse body".into()));
        assert!(failure_notice(&parse).ends_with(SCHEMA_HINT));
    }

    #[test]
    fn stale_turn_reply_is_discarded() {
        let mut ctx = active_ctx();
        let pending = begin_turn(&mut ctx, "hi").unwrap();
        assert!(ctx.processing);
        ctx.reset();

        let reply: serde_json::Value = serde_json::from_str(REPLY).unwrap();
        assert_eq!(finish_turn(&mut ctx, &pending, Ok(reply)), TurnOutcome::Discarded);
        assert!(ctx.messages().is_empty());
        assert!(ctx.conversation.history().is_empty());
        assert!(ctx.people.is_empty());
    }

    #[tokio::test]
    async fn process_with_ai_reuses_history() {
        let (gw, mock, _) = gateway(vec![
            Ok(HttpResponse { status: 500, body: "down".into() }),
            oai(REPLY),
        ]);
        let mut ctx = active_ctx();
        assert!(matches!(send_message(&mut ctx, &gw, "hi").await, TurnOutcome::Failed(_)));
        assert_eq!(process_with_ai(&mut ctx, &gw).await, TurnOutcome::Completed);

        let sent = mock.requests();
        assert_eq!(sent[1].body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(ctx.conversation.history().len(), 2);
    }
}
