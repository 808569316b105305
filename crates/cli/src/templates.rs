//! Markdown scenario templates.
//!
//! A template file is YAML front matter (`name`, `summary`) followed by
//! level-1 sections `# System Prompt`, `# Generation Prompt` and
//! `# Dimensions`, the last being a `- name: a, b, c` list.

use anyhow::{Context, bail};
use serde::Deserialize;
use situator_core::types::{Dimension, ScenarioTemplate};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    templates: Vec<String>,
}

/// Parse one template file.
pub fn parse_template(content: &str) -> anyhow::Result<ScenarioTemplate> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let Some(rest) = normalized.strip_prefix("---") else {
        bail!("invalid template format: missing YAML frontmatter");
    };
    let rest = rest.trim_start_matches([' ', '\t']);
    let Some(rest) = rest.strip_prefix('\n') else {
        bail!("invalid template format: missing YAML frontmatter");
    };
    let Some(end) = rest.find("\n---") else {
        bail!("invalid template format: unterminated YAML frontmatter");
    };
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches([' ', '\t']);
    let body = body.strip_prefix('\n').unwrap_or(body);

    let front: FrontMatter = if yaml.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(yaml).context("invalid YAML frontmatter")?
    };
    let mut sections = parse_sections(body);

    Ok(ScenarioTemplate {
        name: front.name,
        summary: front.summary,
        system_prompt: sections.remove("System Prompt").unwrap_or_default().into(),
        generation_prompt: sections.remove("Generation Prompt").unwrap_or_default().into(),
        dimensions: parse_dimensions(sections.get("Dimensions").map(String::as_str).unwrap_or("")),
    })
}

/// Level-1 `# Header` sections, content trimmed.
fn parse_sections(markdown: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in markdown.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            if let Some((name, lines)) = current.take() {
                sections.insert(name, lines.join("\n").trim().to_owned());
            }
            current = Some((header.trim().to_owned(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        sections.insert(name, lines.join("\n").trim().to_owned());
    }
    sections
}

/// `- name: options` lines; anything else is ignored.
fn parse_dimensions(text: &str) -> Vec<Dimension> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .filter_map(|item| {
            let item = item.trim();
            let colon = item.find(':').filter(|&i| i > 0)?;
            Some(Dimension::new(item[..colon].trim(), item[colon + 1..].trim()))
        })
        .collect()
}

/// Load every template in `dir`. Uses `manifest.json` (`{"templates": [...]}`)
/// when present, otherwise all `*.md` files in name order. Files that fail
/// to parse are skipped with a warning.
pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<ScenarioTemplate>> {
    let manifest_path = dir.join("manifest.json");
    let files: Vec<String> = if manifest_path.is_file() {
        let raw = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("reading {}", manifest_path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", manifest_path.display()))?;
        manifest.templates
    } else {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .with_context(|| format!("reading template directory {}", dir.display()))?
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(".md"))
            .collect();
        names.sort();
        names
    };

    let mut templates = Vec::with_capacity(files.len());
    for file in files {
        let path = dir.join(&file);
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| parse_template(&content));
        match parsed {
            Ok(t) => {
                tracing::info!(file = %file, name = %t.name, "template loaded");
                templates.push(t);
            }
            Err(e) => tracing::warn!(file = %file, error = %e, "template skipped"),
        }
    }
    Ok(templates)
}
