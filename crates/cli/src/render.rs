//! Plain-text rendering of session data for the terminal.

use situator_core::types::{Message, MessageKind, Person, ScenarioTemplate};
use situator_llm::debug::format_json;
use situator_llm::DebugEntry;

pub fn message(msg: &Message) -> String {
    match msg.kind {
        MessageKind::User | MessageKind::Npc => format!("{}: {}", msg.sender, msg.content),
        MessageKind::System => format!("* {}", msg.content),
    }
}

pub fn people(people: &[Person]) -> String {
    if people.is_empty() {
        return "Nobody is here yet.".to_owned();
    }
    people
        .iter()
        .map(|p| {
            let role = if p.role.is_empty() { String::new() } else { format!(" ({})", p.role) };
            format!("{}{role} [{}]\n    {}", p.name, p.color, p.observable)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn templates(templates: &[ScenarioTemplate]) -> String {
    if templates.is_empty() {
        return "No templates loaded.".to_owned();
    }
    templates
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if t.summary.is_empty() {
                format!("{:>2}. {}", i + 1, t.name)
            } else {
                format!("{:>2}. {} - {}", i + 1, t.name, t.summary)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Header line plus every payload field, each formatted with `format_json`.
pub fn debug_entry(entry: &DebugEntry, pretty: bool) -> String {
    let mut out = format!(
        "[{}] {} {}/{}",
        entry.timestamp,
        entry.kind.as_str(),
        entry.provider,
        entry.model
    );
    for (key, value) in &entry.payload {
        let text = format_json(value, pretty);
        if text.is_empty() {
            continue;
        }
        out.push_str(&format!("\n  {key}: {text}"));
    }
    out
}
