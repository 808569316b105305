use crate::types::{ScenarioSelection, ScenarioTemplate};
use serde_json::Value;

/// Placeholder in a template's system prompt, replaced by the retained scenario data.
pub const SCENARIO_DATA_PLACEHOLDER: &str = "<CURRENT SCENARIO DATA>";
/// Placeholder in a template's generation prompt, replaced by the sampled parameters.
pub const SCENARIO_PARAMETERS_PLACEHOLDER: &str = "<SCENARIO PARAMETERS>";

/// Response contract appended to every chat system prompt. Identical for all
/// providers and all turns.
pub const RESPONSE_FORMAT: &str = r#"

## RESPONSE FORMAT

Respond with a JSON object containing:
* dialog: array of {speaker: string, text: string} - ONLY actual spoken words (what characters say). Do NOT include actions, body language, or narrative descriptions.
* observableChanges:
    - string describing only SIGNIFICANT actions or changes that are noteworthy (new objects appearing, important movements, suspicious behavior)
    - avoid minor details like tone of voice, small gestures, or obvious reactions
    - this field can be blank if nothing particularly noteworthy happens
* internalNotes: string with hidden thoughts, motivations, background events (AI reference only - never revealed to player)
* peopleUpdates: array of {name: string, observable: string} where 'observable' contains ONLY visible/audible changes

IMPORTANT: Respond ONLY with valid JSON in the exact format shown below. Do not include any text before or after the JSON.

EXAMPLE JSON FORMAT:
{
    "dialog": [
        {
            "speaker": "Character Name",
            "text": "What they say"
        }
    ],
    "observableChanges": "Description of significant actions or changes",
    "internalNotes": "AI reference notes",
    "peopleUpdates": [
        {
            "name": "Character Name",
            "observable": "Visible changes"
        }
    ]
}"#;

/// Full system prompt for a chat turn.
///
/// Template prompt, with the first `<CURRENT SCENARIO DATA>` replaced by the
/// pretty-printed scenario data when both exist, then the response format,
/// then `scenario_context` verbatim.
pub fn build_system_prompt(
    template: &ScenarioTemplate,
    scenario_data: Option<&Value>,
    scenario_context: Option<&str>,
) -> String {
    let base = template.system_prompt.joined();
    let processed = match scenario_data {
        Some(data) if base.contains(SCENARIO_DATA_PLACEHOLDER) => {
            let rendered = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            base.replacen(SCENARIO_DATA_PLACEHOLDER, &rendered, 1)
        }
        _ => base,
    };

    let mut prompt = String::with_capacity(processed.len() + RESPONSE_FORMAT.len() + 2);
    prompt.push_str(&processed);
    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    if let Some(ctx) = scenario_context {
        prompt.push_str(ctx);
    }
    prompt
}

/// Generation prompt with the sampled parameters substituted in.
pub fn build_generation_prompt(template: &ScenarioTemplate, selection: &ScenarioSelection) -> String {
    template
        .generation_prompt
        .joined()
        .replacen(SCENARIO_PARAMETERS_PLACEHOLDER, &selection.parameters_text(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptText;
    use serde_json::json;

    fn template(system: &str) -> ScenarioTemplate {
        ScenarioTemplate {
            name: "Tavern".into(),
            system_prompt: system.into(),
            generation_prompt: "Invent a tavern.\n<SCENARIO PARAMETERS>".into(),
            ..Default::default()
        }
    }

    #[test]
    fn injects_scenario_data() {
        let t = template("You run this scene.\n<CURRENT SCENARIO DATA>");
        let data = json!({ "location": "tavern", "occupants": [] });
        let prompt = build_system_prompt(&t, Some(&data), None);
        assert!(!prompt.contains(SCENARIO_DATA_PLACEHOLDER));
        assert!(prompt.contains("{\n  \"location\": \"tavern\""));
    }

    #[test]
    fn placeholder_kept_without_data() {
        let t = template("Scene: <CURRENT SCENARIO DATA>");
        let prompt = build_system_prompt(&t, None, None);
        assert!(prompt.starts_with("Scene: <CURRENT SCENARIO DATA>\n\n"));
    }

    #[test]
    fn response_format_identical_and_context_last() {
        let a = build_system_prompt(&template("A"), None, None);
        let b = build_system_prompt(&template("B"), Some(&json!({})), Some("\nCTX"));
        assert_eq!(a, format!("A\n\n{RESPONSE_FORMAT}"));
        assert!(b.ends_with(&format!("{RESPONSE_FORMAT}\nCTX")));
        for key in ["dialog", "observableChanges", "internalNotes", "peopleUpdates"] {
            assert!(RESPONSE_FORMAT.contains(key));
        }
    }

    #[test]
    fn line_array_prompt_is_joined() {
        let mut t = template("");
        t.system_prompt = PromptText::Lines(vec!["one".into(), "two".into()]);
        assert!(build_system_prompt(&t, None, None).starts_with("one\ntwo\n\n"));
    }

    #[test]
    fn generation_prompt_substitutes_parameters() {
        let mut sel = ScenarioSelection::default();
        sel.insert("time", "night");
        let prompt = build_generation_prompt(&template(""), &sel);
        assert_eq!(prompt, "Invent a tavern.\nSCENARIO PARAMETERS: {\"time\":\"night\"}");
    }
}
