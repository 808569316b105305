//! Provider gateway for the situator scene simulator.
//!
//! One call contract over five LLM backends, plus the bounded debug log
//! that records every call.

pub mod debug;
pub mod http;
pub mod provider;

pub use debug::{DebugEntry, DebugKind, DebugRecorder};
pub use http::{Gateway, StructuredResponse};
pub use provider::{ConversationEntry, LlmError, ProviderConfig, ProviderKind, Role};
