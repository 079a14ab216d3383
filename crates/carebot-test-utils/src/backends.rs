//! Scripted classifier and generative backends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use carebot_llm::{ClassifierBackend, ClassifierHealth, LlmBackend, LlmError, LlmRequest, LlmResponse, SafetyRating};
use serde_json::Value;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Classifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMode {
    /// `status=ok`, `mode=model`.
    Healthy,
    /// Reachable but running the rule-based stub.
    Degraded,
    /// Health probe errors (timeout, connection refused).
    Failing,
}

/// Classifier that answers from a script. Replies are consumed in order;
/// the last one repeats once the script runs out.
pub struct ScriptedClassifier {
    mode: Mutex<HealthMode>,
    replies: Mutex<VecDeque<Value>>,
    inputs: Mutex<Vec<String>>,
    health_calls: AtomicUsize,
    classify_calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(mode: HealthMode, replies: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            replies: Mutex::new(replies.into()),
            inputs: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
        })
    }

    pub fn healthy(reply: Value) -> Arc<Self> {
        Self::new(HealthMode::Healthy, vec![reply])
    }

    pub fn degraded() -> Arc<Self> {
        Self::new(HealthMode::Degraded, vec![replies::general_qa()])
    }

    pub fn failing() -> Arc<Self> {
        Self::new(HealthMode::Failing, vec![replies::general_qa()])
    }

    pub fn set_mode(&self, mode: HealthMode) {
        *lock(&self.mode) = mode;
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    /// Inputs passed to `classify`, in call order.
    pub fn inputs(&self) -> Vec<String> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl ClassifierBackend for ScriptedClassifier {
    async fn health(&self) -> Result<ClassifierHealth, LlmError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *lock(&self.mode);
        match mode {
            HealthMode::Healthy => Ok(ClassifierHealth {
                status: Some("ok".into()),
                mode: Some("model".into()),
                model: Some("scripted-router".into()),
            }),
            HealthMode::Degraded => Ok(ClassifierHealth {
                status: Some("ok".into()),
                mode: Some("rules".into()),
                model: None,
            }),
            HealthMode::Failing => Err(LlmError::Unavailable("classifier health check timed out".into())),
        }
    }

    async fn classify(&self, input: &str) -> Result<Value, LlmError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.inputs).push(input.to_string());
        let mut queue = lock(&self.replies);
        let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        reply.ok_or_else(|| LlmError::Unavailable("no scripted classifier reply".into()))
    }

    fn base_url(&self) -> &str {
        "scripted://classifier"
    }
}

/// Raw classifier payloads in the classifier's wire dialect.
pub mod replies {
    use serde_json::{json, Value};

    pub fn general_qa() -> Value {
        json!({ "intent": "GENERAL_MEDICAL_QA", "action": "CALL_GEMINI", "confidence": 0.86 })
    }

    pub fn generative(intent: &str, prompt: &str) -> Value {
        json!({
            "intent": intent,
            "action": "CALL_GEMINI",
            "confidence": 0.8,
            "gemini_payload_spec": {
                "is_pii_removed": false,
                "sanitized_user_prompt": prompt,
                "system_instruction_hint": "MEDICAL_CONSULTANT"
            }
        })
    }

    pub fn search_db(collection: &str, time_frame: &str) -> Value {
        json!({
            "intent": "PERSONAL_DB_QUERY",
            "action": "SEARCH_DB",
            "confidence": 0.92,
            "requires_auth": true,
            "db_query_spec": {
                "target_collection": collection,
                "time_frame": time_frame,
                "keywords": [],
                "limit": 5
            }
        })
    }

    pub fn local(content: Option<&str>) -> Value {
        json!({
            "intent": "OUT_OF_SCOPE",
            "action": "REPLY_LOCALLY",
            "confidence": 0.9,
            "local_reply_content": content
        })
    }

    pub fn admin_tool(tool_name: &str, tool_args: Value) -> Value {
        json!({
            "intent": "OPERATIONAL_ADMIN",
            "action": "CALL_ADMIN_TOOL",
            "confidence": 0.88,
            "tool_params": { "tool_name": tool_name, "tool_args": tool_args }
        })
    }

    pub fn emergency() -> Value {
        json!({ "intent": "EMERGENCY", "action": "EMERGENCY_RESPONSE", "confidence": 0.99 })
    }
}

// ── Generative model ──────────────────────────────────────────────────────────

pub const DEFAULT_ANSWER: &str =
    "Sốt là phản ứng tự nhiên của cơ thể khi bị nhiễm trùng [1]. Bạn nên tham khảo ý kiến bác sĩ nếu sốt kéo dài.";

/// Generative backend that returns scripted answers and records every
/// request. Once the script is exhausted `default_answer` is returned.
pub struct ScriptedLlm {
    answers: Mutex<VecDeque<String>>,
    default_answer: String,
    failing: bool,
    ratings: Vec<SafetyRating>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Self::with_answers(Vec::<String>::new())
    }

    pub fn with_answers<I, S>(answers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            default_answer: DEFAULT_ANSWER.to_string(),
            failing: false,
            ratings: Vec::new(),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every call fails with an upstream 500.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(VecDeque::new()),
            default_answer: String::new(),
            failing: true,
            ratings: Vec::new(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Full text of every request as sent, system and user parts joined.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|req| req.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n"))
            .collect()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        lock(&self.requests).push(req);
        if self.failing {
            return Err(LlmError::ApiError { status: 500, message: "scripted failure".into() });
        }
        let content = lock(&self.answers).pop_front().unwrap_or_else(|| self.default_answer.clone());
        Ok(LlmResponse {
            completion_tokens: content.split_whitespace().count() as u32,
            content,
            model: "scripted-gemini".into(),
            prompt_tokens: 42,
            finish_reason: Some("STOP".into()),
            safety_ratings: self.ratings.clone(),
        })
    }

    fn model_id(&self) -> &str {
        "scripted-gemini"
    }

    fn is_local(&self) -> bool {
        false
    }
}
