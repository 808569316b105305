use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Model name fragments that identify reasoning models.
/// Matched as substrings of the configured model identifier.
pub const REASONING_MODELS: &[&str] = &[
    "o1",
    "o1-pro",
    "o3",
    "o3-mini",
    "o4-mini",
    "gemini-2.0-flash-thinking-exp-1219",
    "gemini-2.0-flash-thinking-exp-01-21",
    "deepseek-reasoner",
];

/// Temperature reasoning models always run at.
pub const REASONING_TEMPERATURE: f32 = 1.0;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
    #[serde(rename = "xai")]
    XAi,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Google,
        Self::XAi,
        Self::DeepSeek,
    ];

    /// Parse a provider tag (`openai`, `anthropic`, `google`, `xai`, `deepseek`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            "xai" => Some(Self::XAi),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::XAi => "xai",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4.1-nano",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Google => "gemini-2.5-flash-preview-05-20",
            Self::XAi => "grok-3",
            Self::DeepSeek => "deepseek-chat",
        }
    }

    pub(crate) fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com",
            Self::XAi => "https://api.x.ai/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Connection settings for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    /// Base URL without trailing slash; the endpoint path is appended per provider.
    pub base_url: String,
    pub supports_temperature: bool,
}

impl ProviderConfig {
    /// Build from kind + API key + model + optional base URL override.
    pub fn new(
        kind: ProviderKind,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        let model = model.into();
        let base = base_url.unwrap_or_else(|| kind.default_base_url().to_owned());
        Self {
            kind,
            api_key: api_key.into(),
            supports_temperature: supports_temperature(&model),
            model,
            base_url: base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Temperature actually sent: configured value, or 1.0 for reasoning models.
    pub fn effective_temperature(&self, configured: f32) -> f32 {
        if self.supports_temperature {
            configured
        } else {
            REASONING_TEMPERATURE
        }
    }

    /// Full request URL for this provider.
    pub fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::OpenAi | ProviderKind::XAi | ProviderKind::DeepSeek => {
                format!("{}/chat/completions", self.base_url)
            }
            ProviderKind::Anthropic => format!("{}/v1/messages", self.base_url),
            ProviderKind::Google => format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ),
        }
    }
}

/// False when the model identifier contains any reasoning-model fragment.
pub fn supports_temperature(model: &str) -> bool {
    !REASONING_MODELS.iter().any(|rm| model.contains(rm))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One provider-facing history turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Error type for gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status}")]
    HttpStatus { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    /// Envelope or model text is not valid JSON, or misses required fields.
    #[error("JSON contract violated: {0}")]
    JsonContract(String),
}

/// A fully built outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

/// Raw status + body text of a completed POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single POST. Implementations never retry.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        request: &HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, LlmError>> + Send + '_>>;
}

/// Mock transport for tests. Replays queued responses and records requests.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, LlmError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(replies: Vec<Result<HttpResponse, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one successful reply with the given body.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self::new(vec![Ok(HttpResponse::ok(body))])
    }

    pub fn push(&self, reply: Result<HttpResponse, LlmError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Transport for MockTransport {
    fn post(
        &self,
        request: &HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, LlmError>> + Send + '_>> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(LlmError::Network("mock transport exhausted".into())));
        Box::pin(async move { reply })
    }
}
