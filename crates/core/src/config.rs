use serde::{Deserialize, Serialize};
use situator_llm::debug::DEBUG_LOG_CAPACITY;
use situator_llm::{ProviderConfig, ProviderKind};
use std::collections::HashMap;

/// API key + model for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

/// All situator settings. Built from defaults, then overridden from the
/// environment (`SITUATOR_*` and `<PROVIDER>_API_KEY`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituatorCfg {
    pub selected_provider: ProviderKind,

    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub google: ProviderSettings,
    pub xai: ProviderSettings,
    pub deepseek: ProviderSettings,

    pub temperature: f32,

    // debug log
    pub debug_enabled: bool,
    pub debug_pretty: bool,
    pub debug_capacity: usize,
}

impl Default for SituatorCfg {
    fn default() -> Self {
        let settings = |kind: ProviderKind| ProviderSettings {
            api_key: String::new(),
            model: kind.default_model().to_owned(),
            base_url: None,
        };
        Self {
            selected_provider: ProviderKind::OpenAi,
            openai: settings(ProviderKind::OpenAi),
            anthropic: settings(ProviderKind::Anthropic),
            google: settings(ProviderKind::Google),
            xai: settings(ProviderKind::XAi),
            deepseek: settings(ProviderKind::DeepSeek),
            temperature: 0.8,
            debug_enabled: true,
            debug_pretty: true,
            debug_capacity: DEBUG_LOG_CAPACITY,
        }
    }
}

impl SituatorCfg {
    /// Load config from the process environment.
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let selected_provider = m
            .get("SITUATOR_PROVIDER")
            .and_then(|tag| {
                let kind = ProviderKind::from_tag(tag);
                if kind.is_none() {
                    tracing::warn!(provider = %tag, "unknown SITUATOR_PROVIDER, using default");
                }
                kind
            })
            .unwrap_or(d.selected_provider);

        Self {
            selected_provider,
            openai: provider_from_map(m, ProviderKind::OpenAi, &d.openai),
            anthropic: provider_from_map(m, ProviderKind::Anthropic, &d.anthropic),
            google: provider_from_map(m, ProviderKind::Google, &d.google),
            xai: provider_from_map(m, ProviderKind::XAi, &d.xai),
            deepseek: provider_from_map(m, ProviderKind::DeepSeek, &d.deepseek),
            temperature: get_or(m, "SITUATOR_TEMPERATURE", d.temperature),
            debug_enabled: get_or(m, "SITUATOR_DEBUG", d.debug_enabled),
            debug_pretty: get_or(m, "SITUATOR_DEBUG_PRETTY", d.debug_pretty),
            // never above the 100-entry bound
            debug_capacity: get_or(m, "SITUATOR_DEBUG_CAPACITY", d.debug_capacity).min(DEBUG_LOG_CAPACITY),
        }
    }

    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Google => &self.google,
            ProviderKind::XAi => &self.xai,
            ProviderKind::DeepSeek => &self.deepseek,
        }
    }

    pub fn settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
            ProviderKind::Google => &mut self.google,
            ProviderKind::XAi => &mut self.xai,
            ProviderKind::DeepSeek => &mut self.deepseek,
        }
    }

    /// Connection config for the currently selected provider.
    pub fn active_provider(&self) -> ProviderConfig {
        let s = self.settings(self.selected_provider);
        ProviderConfig::new(
            self.selected_provider,
            s.api_key.clone(),
            s.model.clone(),
            s.base_url.clone(),
        )
    }

    pub fn has_api_key(&self) -> bool {
        !self.settings(self.selected_provider).api_key.trim().is_empty()
    }
}

fn provider_from_map(
    m: &HashMap<String, String>,
    kind: ProviderKind,
    d: &ProviderSettings,
) -> ProviderSettings {
    let upper = kind.tag().to_uppercase();
    ProviderSettings {
        api_key: m
            .get(&format!("{upper}_API_KEY"))
            .cloned()
            .unwrap_or_else(|| d.api_key.clone()),
        model: m
            .get(&format!("SITUATOR_{upper}_MODEL"))
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| d.model.clone()),
        base_url: m
            .get(&format!("SITUATOR_{upper}_BASE_URL"))
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .or_else(|| d.base_url.clone()),
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
