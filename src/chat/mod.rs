//! Streaming chat orchestration and the outbound event protocol.

pub mod events;
pub mod orchestrator;

pub use events::{ChatEvent, ChatRequest};
pub use orchestrator::ChatService;
