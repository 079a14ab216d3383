//! carebot-agent: the chat pipeline.
//!
//! [`ChatOrchestrator`] sequences the policy gates, the intent router and
//! the answer sources for one question at a time. Transport layers hand
//! it a [`ChatRequest`] and get back either a [`ChatbotResponse`] or a
//! [`ChatFailure`] that already carries the HTTP status and user-facing
//! text.

pub mod health;
pub mod orchestrator;
pub mod response;
pub mod templates;
pub mod tools;

pub use orchestrator::{ChatOrchestrator, Collaborators, PipelineOptions};
pub use response::{ChatFailure, ChatRequest, ChatbotResponse, ResponseMetadata};
pub use templates::LocalReply;
pub use tools::{AdminTool, ToolInfo, ToolRegistry};
