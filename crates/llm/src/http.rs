//! HTTP-based provider adapters.
//!
//! Supports OpenAI-compatible APIs (OpenAI, xAI, DeepSeek), Anthropic's
//! Messages API and Google's `generateContent`. Every call goes through
//! [`Gateway::perform_call`], which logs to the [`DebugRecorder`].

use crate::debug::{DebugKind, DebugRecorder};
use crate::provider::{
    ConversationEntry, HttpRequest, HttpResponse, LlmError, ProviderConfig, ProviderKind, Role,
    Transport,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// The JSON object a model returned, decoded from its text payload.
pub type StructuredResponse = Value;

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct OaiRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    response_format: OaiResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OaiResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    content: String,
}

// ── Anthropic Messages API types ──

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<OaiMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Deserialize)]
struct AnthropicResponseBlock {
    text: String,
}

// ── Google generateContent types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    generation_config: GoogleGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GoogleContent {
    #[serde(default)]
    role: String,
    parts: Vec<GooglePart>,
}

#[derive(Serialize, Deserialize)]
struct GooglePart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

fn to_body<T: Serialize>(body: &T) -> Value {
    // Request structs contain only strings, floats and vecs.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

/// Build the provider-specific request for one call.
pub fn build_request(
    provider: &ProviderConfig,
    temperature: f32,
    system_prompt: &str,
    history: &[ConversationEntry],
) -> HttpRequest {
    let effective = provider.effective_temperature(temperature);
    let url = provider.endpoint();
    match provider.kind {
        ProviderKind::OpenAi | ProviderKind::XAi | ProviderKind::DeepSeek => {
            let mut messages = vec![OaiMessage { role: "system", content: system_prompt }];
            messages.extend(history.iter().map(|m| OaiMessage {
                role: m.role.as_str(),
                content: &m.content,
            }));
            // OpenAI omits temperature for reasoning models; xAI and DeepSeek always send it.
            let temperature = match provider.kind {
                ProviderKind::OpenAi if !provider.supports_temperature => None,
                _ => Some(effective),
            };
            let body = OaiRequest {
                model: &provider.model,
                messages,
                response_format: OaiResponseFormat { kind: "json_object" },
                temperature,
            };
            HttpRequest {
                url,
                headers: vec![
                    ("Content-Type", "application/json".into()),
                    ("Authorization", format!("Bearer {}", provider.api_key)),
                ],
                body: to_body(&body),
            }
        }
        ProviderKind::Anthropic => {
            let messages = history
                .iter()
                .map(|m| OaiMessage {
                    role: match m.role {
                        Role::System => Role::Assistant.as_str(),
                        other => other.as_str(),
                    },
                    content: &m.content,
                })
                .collect();
            let body = AnthropicRequest {
                model: &provider.model,
                system: system_prompt,
                messages,
                temperature: effective,
            };
            HttpRequest {
                url,
                headers: vec![
                    ("Content-Type", "application/json".into()),
                    ("x-api-key", provider.api_key.clone()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body: to_body(&body),
            }
        }
        ProviderKind::Google => {
            let transcript = history
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            let body = GoogleRequest {
                contents: vec![GoogleContent {
                    role: "user".into(),
                    parts: vec![GooglePart {
                        text: format!("{system_prompt}\n\nConversation history:\n{transcript}"),
                    }],
                }],
                generation_config: GoogleGenerationConfig {
                    temperature: effective,
                    response_mime_type: "application/json",
                },
            };
            HttpRequest {
                url,
                headers: vec![("Content-Type", "application/json".into())],
                body: to_body(&body),
            }
        }
    }
}

/// Extract the model's text from a decoded envelope and JSON-decode it.
pub fn parse_response(kind: ProviderKind, envelope: &Value) -> Result<StructuredResponse, LlmError> {
    let text = match kind {
        ProviderKind::OpenAi | ProviderKind::XAi | ProviderKind::DeepSeek => {
            let api: OaiResponse = decode_envelope(envelope)?;
            api.choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| missing("choices[0].message.content"))?
        }
        ProviderKind::Anthropic => {
            let api: AnthropicResponse = decode_envelope(envelope)?;
            api.content
                .into_iter()
                .next()
                .map(|b| b.text)
                .ok_or_else(|| missing("content[0].text"))?
        }
        ProviderKind::Google => {
            let api: GoogleResponse = decode_envelope(envelope)?;
            api.candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .ok_or_else(|| missing("candidates[0].content.parts[0].text"))?
        }
    };
    serde_json::from_str(&text)
        .map_err(|e| LlmError::JsonContract(format!("model text is not valid JSON: {e}")))
}

fn decode_envelope<T: for<'de> Deserialize<'de>>(envelope: &Value) -> Result<T, LlmError> {
    T::deserialize(envelope)
        .map_err(|e| LlmError::JsonContract(format!("unexpected response envelope: {e}")))
}

fn missing(path: &str) -> LlmError {
    LlmError::JsonContract(format!("response envelope has no {path}"))
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Transport for ReqwestTransport {
    fn post(
        &self,
        request: &HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, LlmError>> + Send + '_>> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        let builder = builder.json(&request.body);
        Box::pin(async move {
            let resp = builder
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;
            Ok(HttpResponse { status, body })
        })
    }
}

/// Single entry point for all provider calls.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    recorder: Arc<DebugRecorder>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, recorder: Arc<DebugRecorder>) -> Self {
        Self { transport, recorder }
    }

    /// Gateway over real HTTP.
    pub fn http(recorder: Arc<DebugRecorder>) -> Self {
        Self::new(Arc::new(ReqwestTransport::new()), recorder)
    }

    pub fn recorder(&self) -> &Arc<DebugRecorder> {
        &self.recorder
    }

    /// Send `system_prompt` + `history` to `provider` and return the decoded JSON reply.
    pub async fn invoke(
        &self,
        provider: &ProviderConfig,
        temperature: f32,
        system_prompt: &str,
        history: &[ConversationEntry],
    ) -> Result<StructuredResponse, LlmError> {
        let request = build_request(provider, temperature, system_prompt, history);
        let kind = provider.kind;
        self.perform_call(provider, request, |envelope| parse_response(kind, envelope))
            .await
    }

    /// Log, POST once, unwrap, log again. Never retries.
    pub async fn perform_call<F>(
        &self,
        provider: &ProviderConfig,
        request: HttpRequest,
        parser: F,
    ) -> Result<StructuredResponse, LlmError>
    where
        F: FnOnce(&Value) -> Result<StructuredResponse, LlmError>,
    {
        let tag = provider.kind.tag();
        let model = provider.model.as_str();
        let started = Instant::now();

        self.recorder.log(
            DebugKind::Request,
            tag,
            model,
            object(json!({ "request": request.body, "url": request.url })),
        );

        let result = self.exchange(&request, parser).await;
        let duration = started.elapsed().as_millis() as u64;

        match result {
            Ok((envelope, parsed)) => {
                tracing::debug!(provider = tag, model, duration_ms = duration, "provider call succeeded");
                self.recorder.log(
                    DebugKind::Response,
                    tag,
                    model,
                    object(json!({
                        "response": envelope,
                        "parsedResponse": parsed,
                        "duration": duration,
                    })),
                );
                Ok(parsed)
            }
            Err(err) => {
                let message = match &err {
                    LlmError::HttpStatus { status, body } => format!("HTTP {status}: {body}"),
                    other => other.to_string(),
                };
                tracing::warn!(provider = tag, model, duration_ms = duration, error = %message, "provider call failed");
                self.recorder.log(
                    DebugKind::Error,
                    tag,
                    model,
                    object(json!({ "error": message, "duration": duration })),
                );
                Err(err)
            }
        }
    }

    async fn exchange<F>(
        &self,
        request: &HttpRequest,
        parser: F,
    ) -> Result<(Value, StructuredResponse), LlmError>
    where
        F: FnOnce(&Value) -> Result<StructuredResponse, LlmError>,
    {
        let resp = self.transport.post(request).await?;
        if !resp.is_success() {
            return Err(LlmError::HttpStatus { status: resp.status, body: resp.body });
        }
        let envelope: Value = serde_json::from_str(&resp.body)
            .map_err(|e| LlmError::JsonContract(format!("response body is not valid JSON: {e}")))?;
        let parsed = parser(&envelope)?;
        Ok((envelope, parsed))
    }
}

fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockTransport;

    const REPLY: &str = r#"{"dialog":[{"speaker":"Mara","text":"Hello."}],"observableChanges":"","internalNotes":"calm","peopleUpdates":[]}"#;

    fn history() -> Vec<ConversationEntry> {
        vec![
            ConversationEntry::user("hi"),
            ConversationEntry { role: Role::System, content: "note".into() },
            ConversationEntry::assistant("{}"),
        ]
    }

    fn provider(kind: ProviderKind, model: &str) -> ProviderConfig {
        ProviderConfig::new(kind, "sk-test", model, None)
    }

    fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
        req.headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn openai_request_shape() {
        let req = build_request(&provider(ProviderKind::OpenAi, "gpt-4.1-nano"), 0.8, "SYS", &history());
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(header(&req, "Authorization"), Some("Bearer sk-test"));
        assert_eq!(req.body["model"], "gpt-4.1-nano");
        assert_eq!(req.body["response_format"]["type"], "json_object");
        let temp = req.body["temperature"].as_f64().unwrap();
        assert!((temp - 0.8).abs() < 1e-6);
        let msgs = req.body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], json!({ "role": "system", "content": "SYS" }));
        assert_eq!(msgs[2], json!({ "role": "system", "content": "note" }));
    }

    #[test]
    fn openai_reasoning_model_omits_temperature() {
        let req = build_request(&provider(ProviderKind::OpenAi, "o3-mini"), 0.3, "SYS", &[]);
        assert!(req.body.get("temperature").is_none());
    }

    #[test]
    fn xai_and_deepseek_always_send_effective_temperature() {
        let req = build_request(&provider(ProviderKind::XAi, "grok-3"), 0.4, "SYS", &[]);
        assert_eq!(req.url, "https://api.x.ai/v1/chat/completions");
        assert!((req.body["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);

        let req = build_request(&provider(ProviderKind::DeepSeek, "deepseek-reasoner"), 0.4, "SYS", &[]);
        assert_eq!(req.url, "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(req.body["temperature"], json!(1.0));
    }

    #[test]
    fn anthropic_request_shape() {
        let req = build_request(&provider(ProviderKind::Anthropic, "claude-sonnet-4-20250514"), 0.5, "SYS", &history());
        assert_eq!(header(&req, "x-api-key"), Some("sk-test"));
        assert_eq!(header(&req, "anthropic-version"), Some("2023-06-01"));
        assert_eq!(req.body["system"], "SYS");
        assert_eq!(req.body["temperature"], json!(0.5));
        let msgs = req.body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1]["role"], "assistant");
        assert!(msgs.iter().all(|m| m["role"] != "system"));
    }

    #[test]
    fn google_request_flattens_history() {
        let cfg = provider(ProviderKind::Google, "gemini-2.5-flash-preview-05-20");
        let req = build_request(&cfg, 0.8, "SYS", &history());
        assert!(req.url.ends_with(":generateContent?key=sk-test"));
        assert!(header(&req, "Authorization").is_none());
        let contents = req.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(
            contents[0]["parts"][0]["text"],
            "SYS\n\nConversation history:\nuser: hi\nsystem: note\nassistant: {}"
        );
        assert_eq!(req.body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn parses_each_envelope() {
        let oai = json!({ "choices": [{ "message": { "content": REPLY } }] });
        let ant = json!({ "content": [{ "type": "text", "text": REPLY }] });
        let goo = json!({ "candidates": [{ "content": { "parts": [{ "text": REPLY }] } }] });
        let expected: Value = serde_json::from_str(REPLY).unwrap();
        assert_eq!(parse_response(ProviderKind::OpenAi, &oai).unwrap(), expected);
        assert_eq!(parse_response(ProviderKind::DeepSeek, &oai).unwrap(), expected);
        assert_eq!(parse_response(ProviderKind::Anthropic, &ant).unwrap(), expected);
        assert_eq!(parse_response(ProviderKind::Google, &goo).unwrap(), expected);
    }

    #[test]
    fn non_json_model_text_is_hard_error() {
        let oai = json!({ "choices": [{ "message": { "content": "Sure! Here you go." } }] });
        let err = parse_response(ProviderKind::OpenAi, &oai).unwrap_err();
        assert!(matches!(err, LlmError::JsonContract(_)));
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn empty_choices_is_contract_error() {
        let err = parse_response(ProviderKind::XAi, &json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, LlmError::JsonContract(_)));
    }

    #[tokio::test]
    async fn successful_call_logs_request_then_response() {
        let envelope = json!({ "choices": [{ "message": { "content": REPLY } }] }).to_string();
        let recorder = Arc::new(DebugRecorder::default());
        let gateway = Gateway::new(Arc::new(MockTransport::with_body(envelope)), recorder.clone());

        let parsed = gateway
            .invoke(&provider(ProviderKind::OpenAi, "gpt-4.1-nano"), 0.8, "SYS", &[])
            .await
            .unwrap();
        assert_eq!(parsed["dialog"][0]["speaker"], "Mara");

        let entries = recorder.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, DebugKind::Response);
        assert_eq!(entries[1].kind, DebugKind::Request);
        assert_eq!(entries[1].get("url"), Some(&json!("https://api.openai.com/v1/chat/completions")));
        assert_eq!(entries[0].get("parsedResponse"), Some(&parsed));
        assert!(entries[0].get("duration").unwrap().is_string());
    }

    #[tokio::test]
    async fn http_error_logs_status_and_body() {
        let mock = MockTransport::new(vec![Ok(HttpResponse { status: 401, body: "bad key".into() })]);
        let recorder = Arc::new(DebugRecorder::default());
        let gateway = Gateway::new(Arc::new(mock), recorder.clone());

        let err = gateway
            .invoke(&provider(ProviderKind::Anthropic, "claude-sonnet-4-20250514"), 0.8, "SYS", &[])
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::HttpStatus { status: 401, body: "bad key".into() });

        let entries = recorder.entries();
        let errors: Vec<_> = entries.iter().filter(|e| e.kind == DebugKind::Error).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].get("error"), Some(&json!("HTTP 401: bad key")));
        assert_eq!(errors[0].provider, "anthropic");
    }

    #[tokio::test]
    async fn network_failure_is_logged_and_returned() {
        let mock = MockTransport::new(vec![Err(LlmError::Network("connection refused".into()))]);
        let recorder = Arc::new(DebugRecorder::default());
        let gateway = Gateway::new(Arc::new(mock), recorder.clone());

        let err = gateway
            .invoke(&provider(ProviderKind::Google, "gemini-pro"), 0.8, "SYS", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
        assert_eq!(recorder.entries()[0].kind, DebugKind::Error);
        assert_eq!(recorder.len(), 2);
    }

    #[tokio::test]
    async fn malformed_envelope_is_contract_error() {
        let recorder = Arc::new(DebugRecorder::default());
        let gateway = Gateway::new(Arc::new(MockTransport::with_body("<html>")), recorder.clone());
        let err = gateway
            .invoke(&provider(ProviderKind::DeepSeek, "deepseek-chat"), 0.8, "SYS", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::JsonContract(_)));
        assert_eq!(recorder.entries()[0].kind, DebugKind::Error);
    }
}
