use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── User-facing transcript ─────────────────────────────────────

/// Sender label for the player's own messages.
pub const USER_SENDER: &str = "You";
/// Sender label for system notices.
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Npc,
    System,
}

/// One line of the rendered transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { sender: USER_SENDER.into(), content: content.into(), kind: MessageKind::User }
    }

    pub fn npc(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self { sender: sender.into(), content: content.into(), kind: MessageKind::Npc }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { sender: SYSTEM_SENDER.into(), content: content.into(), kind: MessageKind::System }
    }
}

// ── People ─────────────────────────────────────────────────────

/// Display colors assigned to occupants by index, cycling.
pub const PERSON_COLORS: [&str; 4] = ["#34C759", "#FF9500", "#FF3B30", "#AF52DE"];

/// A simulated character present in the scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub role: String,
    /// Externally visible state. The only field updated after creation.
    pub observable: String,
    pub color: String,
}

// ── Templates ──────────────────────────────────────────────────

/// Prompt text given either as one string or as lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptText {
    Text(String),
    Lines(Vec<String>),
}

impl PromptText {
    pub fn joined(&self) -> String {
        match self {
            PromptText::Text(s) => s.clone(),
            PromptText::Lines(lines) => lines.join("\n"),
        }
    }
}

impl Default for PromptText {
    fn default() -> Self {
        PromptText::Text(String::new())
    }
}

impl From<&str> for PromptText {
    fn from(s: &str) -> Self {
        PromptText::Text(s.to_owned())
    }
}

impl From<String> for PromptText {
    fn from(s: String) -> Self {
        PromptText::Text(s)
    }
}

/// A named axis of variation; `options` is comma-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub options: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, options: impl Into<String>) -> Self {
        Self { name: name.into(), options: options.into() }
    }

    /// Options split on `,` and trimmed.
    pub fn option_list(&self) -> Vec<&str> {
        self.options.split(',').map(str::trim).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioTemplate {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub system_prompt: PromptText,
    #[serde(default)]
    pub generation_prompt: PromptText,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

/// Sampled option per dimension, in dimension order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioSelection(Map<String, Value>);

impl ScenarioSelection {
    pub fn insert(&mut self, dimension: impl Into<String>, option: impl Into<String>) {
        self.0.insert(dimension.into(), Value::String(option.into()));
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0.get(dimension).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `SCENARIO PARAMETERS: {"dim":"option",...}`
    pub fn parameters_text(&self) -> String {
        format!("SCENARIO PARAMETERS: {}", Value::Object(self.0.clone()))
    }
}

/// Where the scenario engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScenarioState {
    #[default]
    Idle,
    GeneratingScenario,
    Active,
}

// ── Model reply shapes ─────────────────────────────────────────

/// Reply to a scenario-generation prompt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedScenario {
    #[serde(default)]
    pub initial_description: Option<String>,
    #[serde(default)]
    pub scenario: Option<Value>,
}

impl GeneratedScenario {
    /// Occupant list under `scenario.occupants`, empty when absent or malformed.
    pub fn occupants(&self) -> Vec<Occupant> {
        self.scenario
            .as_ref()
            .and_then(|s| s.get("occupants"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter().map(Occupant::from_value).collect()
            })
            .unwrap_or_default()
    }
}

/// One generated occupant. Fields are read independently, so a malformed
/// field only loses itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupant {
    pub name: Option<String>,
    pub role: Option<String>,
    pub appearance: Option<String>,
}

impl Occupant {
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        Self {
            name: field("name"),
            role: field("role"),
            appearance: field("appearance"),
        }
    }
}

/// Reply to a chat turn. `dialog` is required; the rest default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub dialog: Vec<DialogLine>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub observable_changes: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub internal_notes: String,
    #[serde(default)]
    pub people_updates: Vec<PersonUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogLine {
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonUpdate {
    pub name: String,
    pub observable: String,
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}
