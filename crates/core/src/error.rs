use situator_llm::{LlmError, ProviderKind};

/// Why a session operation did not run or did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no API key configured for {0}")]
    MissingApiKey(ProviderKind),
    #[error("no active scenario")]
    MissingActiveScenario,
    #[error("no scenario template selected")]
    MissingTemplate,
    #[error("another AI call is in flight")]
    Busy,
    #[error("empty input")]
    EmptyInput,
    #[error(transparent)]
    Gateway(#[from] LlmError),
}
