//! carebot-security: content policy gates for the chat pipeline.
//!
//!   pii          PII redaction for free text and structured records,
//!                prompt-injection detection
//!   summarize    PII-free digests of patient records
//!   safety       input risk cascade and output validation

pub mod pii;
pub mod safety;
pub mod summarize;

pub use pii::{
    InjectionCheck, PiiDetectionResult, PiiSanitizer, Redaction, RecordSanitizationMetadata,
    SanitizedRecord,
};
pub use safety::{OutputCheck, SafetyCheckResult, SafetyGate};
pub use summarize::summarize_medical_data;
