//! Scenario and conversation orchestration for the situator scene simulator.
//!
//! The flow of one session:
//! scenario start → generation call → people + opening description →
//! player turns → structured replies folded into transcript, people and history.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prompt;
pub mod scenario;
pub mod session;
pub mod types;

pub use error::SessionError;
pub use session::SessionContext;
