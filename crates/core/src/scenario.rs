//! Scenario engine: `Idle → GeneratingScenario → Active`.
//!
//! Starting a scenario samples one option per template dimension, asks the
//! provider to generate the scene, and turns the reply into people, an
//! opening system message and the retained scenario data.

use crate::error::SessionError;
use crate::prompt::build_generation_prompt;
use crate::session::SessionContext;
use crate::types::{
    Dimension, GeneratedScenario, Message, Occupant, PERSON_COLORS, Person, ScenarioSelection,
    ScenarioState, ScenarioTemplate,
};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use situator_llm::{Gateway, LlmError, ProviderConfig, StructuredResponse};
use uuid::Uuid;

pub const NO_TEMPLATE_NOTICE: &str = "Please select a scenario template first.";
pub const GENERATION_ERROR_NOTICE: &str =
    "Error generating scenario. Please check your API key and try again.";
const NO_DESCRIPTION: &str = "No initial description provided";

/// Result of one scenario start attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Scenario generated; the engine is `Active`.
    Started,
    /// Preconditions failed; nothing was sent.
    Skipped(SessionError),
    /// The provider call failed; the engine is back to `Idle`.
    Failed(SessionError),
    /// The session was reset while the call was in flight; the reply was dropped.
    Discarded,
}

/// A generation call captured at dispatch time.
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub session_id: Uuid,
    pub provider: ProviderConfig,
    pub temperature: f32,
    pub prompt: String,
}

/// Draw one option per dimension, uniformly at random. Each call draws afresh.
pub fn sample_selection<R: Rng + ?Sized>(dimensions: &[Dimension], rng: &mut R) -> ScenarioSelection {
    let mut selection = ScenarioSelection::default();
    for dim in dimensions {
        let options = dim.option_list();
        if let Some(choice) = options.choose(rng) {
            selection.insert(dim.name.clone(), *choice);
        }
    }
    selection
}

/// People from generated occupants, colors cycling by index. A repeated
/// given name keeps its first occurrence; unnamed occupants are all kept
/// as `Unknown`.
pub fn people_from_occupants(occupants: &[Occupant]) -> Vec<Person> {
    let mut people: Vec<Person> = Vec::with_capacity(occupants.len());
    for (index, occupant) in occupants.iter().enumerate() {
        if let Some(name) = &occupant.name {
            if people.iter().any(|p| &p.name == name) {
                tracing::debug!(%name, "duplicate occupant name dropped");
                continue;
            }
        }
        let name = occupant.name.clone().unwrap_or_else(|| "Unknown".into());
        people.push(Person {
            name,
            role: occupant.role.clone().unwrap_or_else(|| "civilian".into()),
            observable: occupant
                .appearance
                .clone()
                .unwrap_or_else(|| "No description available".into()),
            color: PERSON_COLORS[index % PERSON_COLORS.len()].into(),
        });
    }
    people
}

/// Make `template` current without starting it.
pub fn select_template(ctx: &mut SessionContext, template: ScenarioTemplate) {
    tracing::info!(template = %template.name, "scenario template selected");
    ctx.template = Some(template);
}

/// Ask the front-end to show the template picker.
pub fn request_template_choice(ctx: &mut SessionContext) {
    ctx.awaiting_template = true;
}

/// Validate and enter `GeneratingScenario`.
///
/// Clears transcript, history and people, samples the dimensions and builds
/// the generation prompt. Missing template or API key leaves one system
/// message and no other change.
pub fn begin_generation<R: Rng + ?Sized>(
    ctx: &mut SessionContext,
    rng: &mut R,
) -> Result<PendingGeneration, SessionError> {
    if ctx.processing {
        return Err(SessionError::Busy);
    }
    let Some(template) = ctx.template.clone() else {
        ctx.push_system(NO_TEMPLATE_NOTICE);
        return Err(SessionError::MissingTemplate);
    };
    let provider = ctx.provider();
    if !provider.has_api_key() {
        ctx.push_system(format!(
            "Please set your {} API key in settings first.",
            provider.kind.tag().to_uppercase()
        ));
        return Err(SessionError::MissingApiKey(provider.kind));
    }

    let session_id = ctx.begin_session();
    ctx.state = ScenarioState::GeneratingScenario;
    ctx.processing = true;

    let selection = sample_selection(&template.dimensions, rng);
    let prompt = build_generation_prompt(&template, &selection);
    tracing::info!(
        template = %template.name,
        provider = provider.kind.tag(),
        parameters = %selection.parameters_text(),
        "generating scenario"
    );
    ctx.selection = Some(selection);

    Ok(PendingGeneration {
        session_id,
        temperature: ctx.cfg.temperature,
        provider,
        prompt,
    })
}

/// Apply a generation reply to the session it was dispatched for.
pub fn finish_generation(
    ctx: &mut SessionContext,
    pending: &PendingGeneration,
    result: Result<StructuredResponse, LlmError>,
) -> GenerationOutcome {
    if !ctx.is_current(pending.session_id) {
        tracing::warn!(session = %pending.session_id, "discarding scenario reply for a stale session");
        return GenerationOutcome::Discarded;
    }
    ctx.processing = false;

    let generated = result.and_then(|value| {
        serde_json::from_value::<GeneratedScenario>(value)
            .map_err(|e| LlmError::JsonContract(format!("scenario reply: {e}")))
    });

    match generated {
        Ok(generated) => {
            ctx.people = people_from_occupants(&generated.occupants());
            ctx.conversation.push_message(Message::system(
                generated
                    .initial_description
                    .as_deref()
                    .unwrap_or(NO_DESCRIPTION),
            ));
            ctx.scenario_data = Some(
                generated
                    .scenario
                    .unwrap_or_else(|| Value::Object(Default::default())),
            );
            ctx.conversation.clear_history();
            ctx.state = ScenarioState::Active;
            tracing::info!(people = ctx.people.len(), "scenario active");
            GenerationOutcome::Started
        }
        Err(err) => {
            tracing::warn!(error = %err, "scenario generation failed");
            ctx.push_system(GENERATION_ERROR_NOTICE);
            ctx.state = ScenarioState::Idle;
            GenerationOutcome::Failed(err.into())
        }
    }
}

/// Generate a new scenario from the current template.
pub async fn start_new_scenario(ctx: &mut SessionContext, gateway: &Gateway) -> GenerationOutcome {
    let pending = match begin_generation(ctx, &mut rand::thread_rng()) {
        Ok(p) => p,
        Err(e) => return GenerationOutcome::Skipped(e),
    };
    let result = gateway
        .invoke(&pending.provider, pending.temperature, &pending.prompt, &[])
        .await;
    finish_generation(ctx, &pending, result)
}

/// Pick `template`, close the template picker, and start it.
pub async fn select_and_start(
    ctx: &mut SessionContext,
    gateway: &Gateway,
    template: ScenarioTemplate,
) -> GenerationOutcome {
    if ctx.processing {
        return GenerationOutcome::Skipped(SessionError::Busy);
    }
    select_template(ctx, template);
    ctx.awaiting_template = false;
    start_new_scenario(ctx, gateway).await
}

/// Pick `template` and start it straight away.
pub async fn quick_start(
    ctx: &mut SessionContext,
    gateway: &Gateway,
    template: ScenarioTemplate,
) -> GenerationOutcome {
    if ctx.processing {
        return GenerationOutcome::Skipped(SessionError::Busy);
    }
    select_template(ctx, template);
    start_new_scenario(ctx, gateway).await
}
