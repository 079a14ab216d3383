//! Trace records for generative calls.
//!
//! Only a SHA-256 digest of the output is kept so traces can be logged
//! without copying patient-facing text into log sinks.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classification::DataClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTrace {
    pub id: Uuid,
    pub model: String,
    pub purpose: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub data_class: String,
    pub redacted_spans: usize,
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

pub struct TraceInput<'a> {
    pub model: &'a str,
    pub purpose: &'a str,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub data_class: DataClass,
    pub redacted_spans: usize,
    pub output: &'a str,
    pub latency_ms: u64,
}

pub fn output_digest(output: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl GenerationTrace {
    pub fn new(input: TraceInput<'_>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: input.model.to_string(),
            purpose: input.purpose.to_string(),
            prompt_tokens: input.prompt_tokens,
            completion_tokens: input.completion_tokens,
            data_class: input.data_class.as_str().to_string(),
            redacted_spans: input.redacted_spans,
            output_hash: output_digest(input.output),
            latency_ms: input.latency_ms,
            called_at: Utc::now(),
        }
    }

    pub fn emit(&self) {
        tracing::info!(
            trace_id = %self.id,
            model = %self.model,
            purpose = %self.purpose,
            data_class = %self.data_class,
            redacted_spans = self.redacted_spans,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            latency_ms = self.latency_ms,
            output_hash = %self.output_hash,
            "Generative call completed"
        );
    }
}
