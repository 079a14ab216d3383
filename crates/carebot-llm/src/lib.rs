//! carebot-llm: remote model clients for the chat pipeline.
//!
//! Two upstreams live here: the intent classifier ([`IntentRouter`] over a
//! [`ClassifierBackend`]) and the generative model
//! ([`GenerativeAnswerService`] over an [`LlmBackend`]). Both are trait
//! objects so the pipeline can be driven by scripted backends in tests.

pub mod audit;
pub mod backend;
pub mod classification;
pub mod classifier;
pub mod generative;
pub mod router;

pub use backend::{GeminiBackend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message, SafetyRating};
pub use classification::{DataClass, PromptGuard};
pub use classifier::{ClassifierBackend, ClassifierHealth, HttpClassifier};
pub use generative::{
    GenerativeAnswer, GenerativeAnswerService, GenerativePromptSpec, InstructionTemplate, ResponseCheck,
    SAFE_REFUSAL,
};
pub use router::{ActionPlan, ClassificationResult, ClassifierStatus, IntentRouter, ToolInvocation};
